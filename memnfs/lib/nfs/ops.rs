//! COMPOUND arguments and results

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::xdr::{helpers, XdrDecode, XdrEncode};
use crate::NfsResult;

use super::{
    Bitmap4, ChangeInfo4, Fattr4, NfsOpcode, NfsStat4, Stateid4, MAX_COMPONENT_LEN, MAX_TAG_LEN,
    NFS4_FHSIZE, NFS4_OPAQUE_LIMIT,
};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// `open4res.rflags`: the client must confirm the open owner
pub const OPEN4_RESULT_CONFIRM: u32 = 0x2;

/// `open4res.rflags`: byte-range locking follows POSIX
pub const OPEN4_RESULT_LOCKTYPE_POSIX: u32 = 0x4;

/// `open_delegation_type4` value for no delegation
const OPEN_DELEGATE_NONE: u32 = 0;

/// Largest WRITE payload accepted off the wire.
const MAX_WRITE_PAYLOAD: usize = 16 * 1024 * 1024;

/// Largest symlink target accepted in a CREATE.
const MAX_LINK_DATA: usize = 4096;

//--------------------------------------------------------------------------------------------------
// Types: Arguments
//--------------------------------------------------------------------------------------------------

/// The fixed part of `COMPOUND4args`, decoded before the operations themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompoundHeader {
    /// Opaque tag echoed in the reply
    pub tag: Bytes,
    /// Minor version requested
    pub minor_version: u32,
    /// Number of operations that follow
    pub op_count: u32,
}

/// A complete `COMPOUND4args`, used to build requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compound4Args {
    /// Opaque tag echoed in the reply
    pub tag: Bytes,
    /// Minor version requested
    pub minor_version: u32,
    /// Operations in order
    pub ops: Vec<NfsArgOp>,
}

/// One operation of a COMPOUND with its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum NfsArgOp {
    Access(u32),
    Close {
        seqid: u32,
        stateid: Stateid4,
    },
    Commit {
        offset: u64,
        count: u32,
    },
    Create {
        kind: CreateKind,
        name: Bytes,
        attrs: Fattr4,
    },
    GetAttr(Bitmap4),
    GetFh,
    Lookup(Bytes),
    LookupP,
    NVerify(Fattr4),
    Open(OpenArgs),
    OpenConfirm {
        stateid: Stateid4,
        seqid: u32,
    },
    OpenDowngrade {
        stateid: Stateid4,
        seqid: u32,
        share_access: u32,
        share_deny: u32,
    },
    PutFh(Bytes),
    PutPubFh,
    PutRootFh,
    Read {
        stateid: Stateid4,
        offset: u64,
        count: u32,
    },
    ReadDir {
        cookie: u64,
        verifier: [u8; 8],
        dircount: u32,
        maxcount: u32,
        attr_request: Bitmap4,
    },
    Remove(Bytes),
    Renew(u64),
    RestoreFh,
    SaveFh,
    SecInfo(Bytes),
    SetAttr {
        stateid: Stateid4,
        attrs: Fattr4,
    },
    SetClientId {
        verifier: [u8; 8],
        id: Bytes,
        callback: ClientCallback,
        callback_ident: u32,
    },
    SetClientIdConfirm {
        clientid: u64,
        verifier: [u8; 8],
    },
    Verify(Fattr4),
    Write {
        stateid: Stateid4,
        offset: u64,
        stable: u32,
        data: Bytes,
    },
    ReleaseLockOwner {
        clientid: u64,
        owner: Bytes,
    },
}

/// The object type of a CREATE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateKind {
    /// `NF4DIR`
    Directory,
    /// `NF4LNK` with its target
    Symlink(Bytes),
    /// `NF4BLK` or `NF4CHR` with the device numbers
    Device {
        /// The `nfs_ftype4` value
        ftype: u32,
        /// Major number
        major: u32,
        /// Minor number
        minor: u32,
    },
    /// Any other `nfs_ftype4`, carrying no data
    Other(u32),
}

/// Callback coordinates of a SETCLIENTID. The server never calls back, but keeps them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCallback {
    /// Callback program number
    pub program: u32,
    /// Network id, such as `tcp`
    pub netid: String,
    /// Universal address
    pub addr: String,
}

/// Arguments of an OPEN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenArgs {
    /// Sequence id of the open owner
    pub seqid: u32,
    /// `OPEN4_SHARE_ACCESS_*` bits
    pub share_access: u32,
    /// `OPEN4_SHARE_DENY_*` bits
    pub share_deny: u32,
    /// Client id of the open owner
    pub clientid: u64,
    /// Opaque open owner
    pub owner: Bytes,
    /// Whether and how to create
    pub how: OpenHow,
    /// How the file is named
    pub claim: OpenClaim,
}

/// `openflag4`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenHow {
    /// Open an existing file
    NoCreate,
    /// Create if needed
    Create(CreateHow),
}

/// `createhow4`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateHow {
    /// Reuse an existing file
    Unchecked(Fattr4),
    /// Fail if the file exists
    Guarded(Fattr4),
    /// Idempotent creation keyed by a verifier
    Exclusive([u8; 8]),
}

/// `open_claim4`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenClaim {
    /// A name in the current directory
    Null(Bytes),
    /// Reclaim after a server restart
    Previous(u32),
    /// Open under a current delegation
    DelegateCur {
        /// Delegation stateid
        stateid: Stateid4,
        /// Name in the current directory
        name: Bytes,
    },
    /// Reclaim under a previous delegation
    DelegatePrev(Bytes),
}

/// Why an operation could not be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpDecodeFailure {
    /// Opcode to report in the result
    pub opcode: NfsOpcode,
    /// Status to report
    pub status: NfsStat4,
}

//--------------------------------------------------------------------------------------------------
// Types: Results
//--------------------------------------------------------------------------------------------------

/// `COMPOUND4res`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compound4Res {
    /// Status of the last operation executed
    pub status: NfsStat4,
    /// Tag copied from the request
    pub tag: Bytes,
    /// One result per operation executed
    pub results: Vec<NfsResOp>,
}

/// The result of one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NfsResOp {
    /// Operation this result answers
    pub opcode: NfsOpcode,
    /// Outcome
    pub status: NfsStat4,
    /// Result data; only encoded on success, except for SETATTR
    pub body: ResBody,
}

/// Result data of an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum ResBody {
    Empty,
    Access {
        supported: u32,
        access: u32,
    },
    Stateid(Stateid4),
    Commit([u8; 8]),
    Create {
        cinfo: ChangeInfo4,
        attrset: Bitmap4,
    },
    GetAttr(Fattr4),
    GetFh(Bytes),
    Open(OpenResult),
    Read {
        eof: bool,
        data: Bytes,
    },
    ReadDir {
        verifier: [u8; 8],
        entries: Vec<DirEntry4>,
        eof: bool,
    },
    Remove(ChangeInfo4),
    SecInfo(Vec<u32>),
    SetAttr(Bitmap4),
    SetClientId {
        clientid: u64,
        verifier: [u8; 8],
    },
    Write {
        count: u32,
        committed: u32,
        verifier: [u8; 8],
    },
}

/// Result data of a successful OPEN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenResult {
    /// Open stateid
    pub stateid: Stateid4,
    /// Change of the directory the file lives in
    pub cinfo: ChangeInfo4,
    /// `OPEN4_RESULT_*` flags
    pub rflags: u32,
    /// Attributes applied at creation
    pub attrset: Bitmap4,
}

/// One READDIR entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry4 {
    /// Resume position after this entry
    pub cookie: u64,
    /// Entry name
    pub name: String,
    /// Requested attributes of the entry
    pub attrs: Fattr4,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl NfsArgOp {
    /// Returns the opcode of the operation.
    pub fn opcode(&self) -> NfsOpcode {
        match self {
            NfsArgOp::Access(_) => NfsOpcode::Access,
            NfsArgOp::Close { .. } => NfsOpcode::Close,
            NfsArgOp::Commit { .. } => NfsOpcode::Commit,
            NfsArgOp::Create { .. } => NfsOpcode::Create,
            NfsArgOp::GetAttr(_) => NfsOpcode::GetAttr,
            NfsArgOp::GetFh => NfsOpcode::GetFh,
            NfsArgOp::Lookup(_) => NfsOpcode::Lookup,
            NfsArgOp::LookupP => NfsOpcode::LookupP,
            NfsArgOp::NVerify(_) => NfsOpcode::NVerify,
            NfsArgOp::Open(_) => NfsOpcode::Open,
            NfsArgOp::OpenConfirm { .. } => NfsOpcode::OpenConfirm,
            NfsArgOp::OpenDowngrade { .. } => NfsOpcode::OpenDowngrade,
            NfsArgOp::PutFh(_) => NfsOpcode::PutFh,
            NfsArgOp::PutPubFh => NfsOpcode::PutPubFh,
            NfsArgOp::PutRootFh => NfsOpcode::PutRootFh,
            NfsArgOp::Read { .. } => NfsOpcode::Read,
            NfsArgOp::ReadDir { .. } => NfsOpcode::ReadDir,
            NfsArgOp::Remove(_) => NfsOpcode::Remove,
            NfsArgOp::Renew(_) => NfsOpcode::Renew,
            NfsArgOp::RestoreFh => NfsOpcode::RestoreFh,
            NfsArgOp::SaveFh => NfsOpcode::SaveFh,
            NfsArgOp::SecInfo(_) => NfsOpcode::SecInfo,
            NfsArgOp::SetAttr { .. } => NfsOpcode::SetAttr,
            NfsArgOp::SetClientId { .. } => NfsOpcode::SetClientId,
            NfsArgOp::SetClientIdConfirm { .. } => NfsOpcode::SetClientIdConfirm,
            NfsArgOp::Verify(_) => NfsOpcode::Verify,
            NfsArgOp::Write { .. } => NfsOpcode::Write,
            NfsArgOp::ReleaseLockOwner { .. } => NfsOpcode::ReleaseLockOwner,
        }
    }

    /// Decodes one operation.
    ///
    /// ## Errors
    ///
    /// * `NfsStat4::OpIllegal` - For an opcode outside the protocol
    /// * `NfsStat4::NotSupp` - For an operation the server does not implement
    /// * `NfsStat4::BadXdr` - For arguments that do not decode
    pub fn decode_op<B: Buf>(buf: &mut B) -> Result<NfsArgOp, OpDecodeFailure> {
        let illegal = OpDecodeFailure {
            opcode: NfsOpcode::Illegal,
            status: NfsStat4::OpIllegal,
        };

        let raw = u32::decode(buf).map_err(|_| OpDecodeFailure {
            opcode: NfsOpcode::Illegal,
            status: NfsStat4::BadXdr,
        })?;
        let opcode = NfsOpcode::try_from(raw).map_err(|_| illegal)?;

        let args = match opcode {
            NfsOpcode::Illegal => return Err(illegal),
            NfsOpcode::DelegPurge
            | NfsOpcode::DelegReturn
            | NfsOpcode::Link
            | NfsOpcode::Lock
            | NfsOpcode::LockT
            | NfsOpcode::LockU
            | NfsOpcode::OpenAttr
            | NfsOpcode::ReadLink
            | NfsOpcode::Rename => {
                return Err(OpDecodeFailure {
                    opcode,
                    status: NfsStat4::NotSupp,
                })
            }
            _ => Self::decode_args(opcode, buf),
        };

        args.map_err(|_| OpDecodeFailure {
            opcode,
            status: NfsStat4::BadXdr,
        })
    }

    fn decode_args<B: Buf>(opcode: NfsOpcode, buf: &mut B) -> NfsResult<NfsArgOp> {
        let op = match opcode {
            NfsOpcode::Access => NfsArgOp::Access(u32::decode(buf)?),
            NfsOpcode::Close => NfsArgOp::Close {
                seqid: u32::decode(buf)?,
                stateid: Stateid4::decode(buf)?,
            },
            NfsOpcode::Commit => NfsArgOp::Commit {
                offset: u64::decode(buf)?,
                count: u32::decode(buf)?,
            },
            NfsOpcode::Create => NfsArgOp::Create {
                kind: CreateKind::decode(buf)?,
                name: decode_component(buf)?,
                attrs: Fattr4::decode(buf)?,
            },
            NfsOpcode::GetAttr => NfsArgOp::GetAttr(Bitmap4::decode(buf)?),
            NfsOpcode::GetFh => NfsArgOp::GetFh,
            NfsOpcode::Lookup => NfsArgOp::Lookup(decode_component(buf)?),
            NfsOpcode::LookupP => NfsArgOp::LookupP,
            NfsOpcode::NVerify => NfsArgOp::NVerify(Fattr4::decode(buf)?),
            NfsOpcode::Open => NfsArgOp::Open(OpenArgs::decode(buf)?),
            NfsOpcode::OpenConfirm => NfsArgOp::OpenConfirm {
                stateid: Stateid4::decode(buf)?,
                seqid: u32::decode(buf)?,
            },
            NfsOpcode::OpenDowngrade => NfsArgOp::OpenDowngrade {
                stateid: Stateid4::decode(buf)?,
                seqid: u32::decode(buf)?,
                share_access: u32::decode(buf)?,
                share_deny: u32::decode(buf)?,
            },
            NfsOpcode::PutFh => NfsArgOp::PutFh(helpers::decode_opaque(buf, NFS4_FHSIZE)?),
            NfsOpcode::PutPubFh => NfsArgOp::PutPubFh,
            NfsOpcode::PutRootFh => NfsArgOp::PutRootFh,
            NfsOpcode::Read => NfsArgOp::Read {
                stateid: Stateid4::decode(buf)?,
                offset: u64::decode(buf)?,
                count: u32::decode(buf)?,
            },
            NfsOpcode::ReadDir => NfsArgOp::ReadDir {
                cookie: u64::decode(buf)?,
                verifier: helpers::decode_fixed(buf)?,
                dircount: u32::decode(buf)?,
                maxcount: u32::decode(buf)?,
                attr_request: Bitmap4::decode(buf)?,
            },
            NfsOpcode::Remove => NfsArgOp::Remove(decode_component(buf)?),
            NfsOpcode::Renew => NfsArgOp::Renew(u64::decode(buf)?),
            NfsOpcode::RestoreFh => NfsArgOp::RestoreFh,
            NfsOpcode::SaveFh => NfsArgOp::SaveFh,
            NfsOpcode::SecInfo => NfsArgOp::SecInfo(decode_component(buf)?),
            NfsOpcode::SetAttr => NfsArgOp::SetAttr {
                stateid: Stateid4::decode(buf)?,
                attrs: Fattr4::decode(buf)?,
            },
            NfsOpcode::SetClientId => NfsArgOp::SetClientId {
                verifier: helpers::decode_fixed(buf)?,
                id: helpers::decode_opaque(buf, NFS4_OPAQUE_LIMIT)?,
                callback: ClientCallback {
                    program: u32::decode(buf)?,
                    netid: helpers::decode_string(buf, NFS4_OPAQUE_LIMIT)?,
                    addr: helpers::decode_string(buf, NFS4_OPAQUE_LIMIT)?,
                },
                callback_ident: u32::decode(buf)?,
            },
            NfsOpcode::SetClientIdConfirm => NfsArgOp::SetClientIdConfirm {
                clientid: u64::decode(buf)?,
                verifier: helpers::decode_fixed(buf)?,
            },
            NfsOpcode::Verify => NfsArgOp::Verify(Fattr4::decode(buf)?),
            NfsOpcode::Write => NfsArgOp::Write {
                stateid: Stateid4::decode(buf)?,
                offset: u64::decode(buf)?,
                stable: u32::decode(buf)?,
                data: helpers::decode_opaque(buf, MAX_WRITE_PAYLOAD)?,
            },
            NfsOpcode::ReleaseLockOwner => NfsArgOp::ReleaseLockOwner {
                clientid: u64::decode(buf)?,
                owner: helpers::decode_opaque(buf, NFS4_OPAQUE_LIMIT)?,
            },
            other => {
                return Err(crate::NfsError::Xdr(format!(
                    "no argument decoder for {other:?}"
                )))
            }
        };
        Ok(op)
    }
}

impl Compound4Args {
    /// Creates a minor version 0 COMPOUND with an empty tag.
    pub fn new(ops: Vec<NfsArgOp>) -> Self {
        Self {
            tag: Bytes::new(),
            minor_version: 0,
            ops,
        }
    }

    /// Encodes the arguments into a fresh buffer.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.encode(&mut buf);
        buf.freeze()
    }
}

impl Compound4Res {
    /// Returns the result of the last operation executed.
    pub fn last(&self) -> Option<&NfsResOp> {
        self.results.last()
    }

    /// Encodes the result into a fresh buffer.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.encode(&mut buf);
        buf.freeze()
    }
}

impl NfsResOp {
    /// Creates a successful result.
    pub fn ok(opcode: NfsOpcode, body: ResBody) -> Self {
        Self {
            opcode,
            status: NfsStat4::Ok,
            body,
        }
    }

    /// Creates a failed result without data.
    pub fn error(opcode: NfsOpcode, status: NfsStat4) -> Self {
        Self {
            opcode,
            status,
            body: ResBody::Empty,
        }
    }
}

impl DirEntry4 {
    /// Bytes this entry occupies in a READDIR reply, including its list marker.
    pub fn encoded_len(&self) -> usize {
        let mut buf = BytesMut::new();
        true.encode(&mut buf);
        self.encode(&mut buf);
        buf.len()
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

fn decode_component<B: Buf>(buf: &mut B) -> NfsResult<Bytes> {
    helpers::decode_opaque(buf, MAX_COMPONENT_LEN)
}

/// Interprets a component name as UTF-8.
///
/// ## Errors
///
/// * `NfsStat4::Inval` - For an empty name or invalid UTF-8
pub fn component_str(name: &Bytes) -> Result<&str, NfsStat4> {
    if name.is_empty() {
        return Err(NfsStat4::Inval);
    }
    std::str::from_utf8(name).map_err(|_| NfsStat4::Inval)
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl XdrDecode for CompoundHeader {
    fn decode<B: Buf>(buf: &mut B) -> NfsResult<Self> {
        Ok(CompoundHeader {
            tag: helpers::decode_opaque(buf, MAX_TAG_LEN)?,
            minor_version: u32::decode(buf)?,
            op_count: u32::decode(buf)?,
        })
    }
}

impl XdrEncode for Compound4Args {
    fn encode<B: BufMut>(&self, buf: &mut B) {
        helpers::encode_opaque(&self.tag, buf);
        self.minor_version.encode(buf);
        helpers::encode_array(&self.ops, buf);
    }
}

impl XdrDecode for CreateKind {
    fn decode<B: Buf>(buf: &mut B) -> NfsResult<Self> {
        Ok(match u32::decode(buf)? {
            2 => CreateKind::Directory,
            5 => CreateKind::Symlink(helpers::decode_opaque(buf, MAX_LINK_DATA)?),
            ftype @ (3 | 4) => CreateKind::Device {
                ftype,
                major: u32::decode(buf)?,
                minor: u32::decode(buf)?,
            },
            other => CreateKind::Other(other),
        })
    }
}

impl XdrEncode for CreateKind {
    fn encode<B: BufMut>(&self, buf: &mut B) {
        match self {
            CreateKind::Directory => 2u32.encode(buf),
            CreateKind::Symlink(target) => {
                5u32.encode(buf);
                helpers::encode_opaque(target, buf);
            }
            CreateKind::Device {
                ftype,
                major,
                minor,
            } => {
                ftype.encode(buf);
                major.encode(buf);
                minor.encode(buf);
            }
            CreateKind::Other(ftype) => ftype.encode(buf),
        }
    }
}

impl XdrDecode for OpenArgs {
    fn decode<B: Buf>(buf: &mut B) -> NfsResult<Self> {
        let seqid = u32::decode(buf)?;
        let share_access = u32::decode(buf)?;
        let share_deny = u32::decode(buf)?;
        let clientid = u64::decode(buf)?;
        let owner = helpers::decode_opaque(buf, NFS4_OPAQUE_LIMIT)?;

        let how = match u32::decode(buf)? {
            0 => OpenHow::NoCreate,
            1 => OpenHow::Create(match u32::decode(buf)? {
                0 => CreateHow::Unchecked(Fattr4::decode(buf)?),
                1 => CreateHow::Guarded(Fattr4::decode(buf)?),
                2 => CreateHow::Exclusive(helpers::decode_fixed(buf)?),
                other => return Err(crate::NfsError::Xdr(format!("bad createmode {other}"))),
            }),
            other => return Err(crate::NfsError::Xdr(format!("bad openflag {other}"))),
        };

        let claim = match u32::decode(buf)? {
            0 => OpenClaim::Null(decode_component(buf)?),
            1 => OpenClaim::Previous(u32::decode(buf)?),
            2 => OpenClaim::DelegateCur {
                stateid: Stateid4::decode(buf)?,
                name: decode_component(buf)?,
            },
            3 => OpenClaim::DelegatePrev(decode_component(buf)?),
            other => return Err(crate::NfsError::Xdr(format!("bad open claim {other}"))),
        };

        Ok(OpenArgs {
            seqid,
            share_access,
            share_deny,
            clientid,
            owner,
            how,
            claim,
        })
    }
}

impl XdrEncode for OpenArgs {
    fn encode<B: BufMut>(&self, buf: &mut B) {
        self.seqid.encode(buf);
        self.share_access.encode(buf);
        self.share_deny.encode(buf);
        self.clientid.encode(buf);
        helpers::encode_opaque(&self.owner, buf);

        match &self.how {
            OpenHow::NoCreate => 0u32.encode(buf),
            OpenHow::Create(how) => {
                1u32.encode(buf);
                match how {
                    CreateHow::Unchecked(attrs) => {
                        0u32.encode(buf);
                        attrs.encode(buf);
                    }
                    CreateHow::Guarded(attrs) => {
                        1u32.encode(buf);
                        attrs.encode(buf);
                    }
                    CreateHow::Exclusive(verifier) => {
                        2u32.encode(buf);
                        helpers::encode_fixed(verifier, buf);
                    }
                }
            }
        }

        match &self.claim {
            OpenClaim::Null(name) => {
                0u32.encode(buf);
                helpers::encode_opaque(name, buf);
            }
            OpenClaim::Previous(delegation) => {
                1u32.encode(buf);
                delegation.encode(buf);
            }
            OpenClaim::DelegateCur { stateid, name } => {
                2u32.encode(buf);
                stateid.encode(buf);
                helpers::encode_opaque(name, buf);
            }
            OpenClaim::DelegatePrev(name) => {
                3u32.encode(buf);
                helpers::encode_opaque(name, buf);
            }
        }
    }
}

impl XdrEncode for NfsArgOp {
    fn encode<B: BufMut>(&self, buf: &mut B) {
        u32::from(self.opcode()).encode(buf);
        match self {
            NfsArgOp::Access(access) => access.encode(buf),
            NfsArgOp::Close { seqid, stateid } => {
                seqid.encode(buf);
                stateid.encode(buf);
            }
            NfsArgOp::Commit { offset, count } => {
                offset.encode(buf);
                count.encode(buf);
            }
            NfsArgOp::Create { kind, name, attrs } => {
                kind.encode(buf);
                helpers::encode_opaque(name, buf);
                attrs.encode(buf);
            }
            NfsArgOp::GetAttr(mask) => mask.encode(buf),
            NfsArgOp::Lookup(name) | NfsArgOp::Remove(name) | NfsArgOp::SecInfo(name) => {
                helpers::encode_opaque(name, buf)
            }
            NfsArgOp::PutFh(handle) => helpers::encode_opaque(handle, buf),
            NfsArgOp::NVerify(attrs) | NfsArgOp::Verify(attrs) => attrs.encode(buf),
            NfsArgOp::Open(args) => args.encode(buf),
            NfsArgOp::OpenConfirm { stateid, seqid } => {
                stateid.encode(buf);
                seqid.encode(buf);
            }
            NfsArgOp::OpenDowngrade {
                stateid,
                seqid,
                share_access,
                share_deny,
            } => {
                stateid.encode(buf);
                seqid.encode(buf);
                share_access.encode(buf);
                share_deny.encode(buf);
            }
            NfsArgOp::Read {
                stateid,
                offset,
                count,
            } => {
                stateid.encode(buf);
                offset.encode(buf);
                count.encode(buf);
            }
            NfsArgOp::ReadDir {
                cookie,
                verifier,
                dircount,
                maxcount,
                attr_request,
            } => {
                cookie.encode(buf);
                helpers::encode_fixed(verifier, buf);
                dircount.encode(buf);
                maxcount.encode(buf);
                attr_request.encode(buf);
            }
            NfsArgOp::Renew(clientid) => clientid.encode(buf),
            NfsArgOp::SetAttr { stateid, attrs } => {
                stateid.encode(buf);
                attrs.encode(buf);
            }
            NfsArgOp::SetClientId {
                verifier,
                id,
                callback,
                callback_ident,
            } => {
                helpers::encode_fixed(verifier, buf);
                helpers::encode_opaque(id, buf);
                callback.program.encode(buf);
                helpers::encode_string(&callback.netid, buf);
                helpers::encode_string(&callback.addr, buf);
                callback_ident.encode(buf);
            }
            NfsArgOp::SetClientIdConfirm { clientid, verifier } => {
                clientid.encode(buf);
                helpers::encode_fixed(verifier, buf);
            }
            NfsArgOp::Write {
                stateid,
                offset,
                stable,
                data,
            } => {
                stateid.encode(buf);
                offset.encode(buf);
                stable.encode(buf);
                helpers::encode_opaque(data, buf);
            }
            NfsArgOp::ReleaseLockOwner { clientid, owner } => {
                clientid.encode(buf);
                helpers::encode_opaque(owner, buf);
            }
            NfsArgOp::GetFh
            | NfsArgOp::LookupP
            | NfsArgOp::PutPubFh
            | NfsArgOp::PutRootFh
            | NfsArgOp::RestoreFh
            | NfsArgOp::SaveFh => {}
        }
    }
}

impl XdrEncode for Compound4Res {
    fn encode<B: BufMut>(&self, buf: &mut B) {
        self.status.encode(buf);
        helpers::encode_opaque(&self.tag, buf);
        helpers::encode_array(&self.results, buf);
    }
}

impl XdrEncode for NfsResOp {
    fn encode<B: BufMut>(&self, buf: &mut B) {
        u32::from(self.opcode).encode(buf);
        self.status.encode(buf);
        if self.status == NfsStat4::Ok || matches!(self.body, ResBody::SetAttr(_)) {
            self.body.encode(buf);
        }
    }
}

impl XdrEncode for ResBody {
    fn encode<B: BufMut>(&self, buf: &mut B) {
        match self {
            ResBody::Empty => {}
            ResBody::Access { supported, access } => {
                supported.encode(buf);
                access.encode(buf);
            }
            ResBody::Stateid(stateid) => stateid.encode(buf),
            ResBody::Commit(verifier) => helpers::encode_fixed(verifier, buf),
            ResBody::Create { cinfo, attrset } => {
                cinfo.encode(buf);
                attrset.encode(buf);
            }
            ResBody::GetAttr(attrs) => attrs.encode(buf),
            ResBody::GetFh(handle) => helpers::encode_opaque(handle, buf),
            ResBody::Open(result) => {
                result.stateid.encode(buf);
                result.cinfo.encode(buf);
                result.rflags.encode(buf);
                result.attrset.encode(buf);
                OPEN_DELEGATE_NONE.encode(buf);
            }
            ResBody::Read { eof, data } => {
                eof.encode(buf);
                helpers::encode_opaque(data, buf);
            }
            ResBody::ReadDir {
                verifier,
                entries,
                eof,
            } => {
                helpers::encode_fixed(verifier, buf);
                for entry in entries {
                    true.encode(buf);
                    entry.encode(buf);
                }
                false.encode(buf);
                eof.encode(buf);
            }
            ResBody::Remove(cinfo) => cinfo.encode(buf),
            ResBody::SecInfo(flavors) => helpers::encode_array(flavors, buf),
            ResBody::SetAttr(attrsset) => attrsset.encode(buf),
            ResBody::SetClientId { clientid, verifier } => {
                clientid.encode(buf);
                helpers::encode_fixed(verifier, buf);
            }
            ResBody::Write {
                count,
                committed,
                verifier,
            } => {
                count.encode(buf);
                committed.encode(buf);
                helpers::encode_fixed(verifier, buf);
            }
        }
    }
}

impl XdrEncode for DirEntry4 {
    fn encode<B: BufMut>(&self, buf: &mut B) {
        self.cookie.encode(buf);
        helpers::encode_string(&self.name, buf);
        self.attrs.encode(buf);
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
