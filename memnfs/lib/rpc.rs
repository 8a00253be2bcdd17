//! ONC RPC version 2 messages, RFC 5531

use bytes::{Buf, BufMut, Bytes, BytesMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::xdr::{helpers, XdrDecode, XdrEncode};
use crate::{NfsError, NfsResult};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The only RPC protocol version spoken.
pub const RPC_VERSION: u32 = 2;

/// The NFS program number.
pub const NFS_PROGRAM: u32 = 100003;

/// The NFS program version served.
pub const NFS_VERSION: u32 = 4;

/// Maximum length of an opaque_auth body.
const MAX_AUTH_BYTES: usize = 400;

/// Maximum length of an AUTH_SYS machine name.
const MAX_MACHINE_NAME: usize = 255;

/// Maximum number of auxiliary groups in AUTH_SYS.
const MAX_AUX_GIDS: usize = 16;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// RPC message types
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum MessageType {
    /// RPC call message
    Call = 0,
    /// RPC reply message
    Reply = 1,
}

/// Authentication flavors
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum AuthFlavor {
    /// No authentication
    None = 0,
    /// Unix-style uid/gid credentials
    Sys = 1,
}

/// RPC authentication status
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum AuthStatus {
    /// Success
    Ok = 0,
    /// Bad credential (not authenticated)
    BadCred = 1,
    /// Bad verifier (not authenticated)
    BadVerf = 2,
    /// Invalid client credential (rejected)
    RejectedCred = 3,
    /// Invalid client verifier (rejected)
    RejectedVerf = 4,
    /// Too weak authentication (rejected)
    TooWeak = 5,
}

/// Procedures of the NFSv4 program
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum NfsProcedure {
    /// Does nothing, used to probe the server
    Null = 0,
    /// Runs a compound of NFS operations
    Compound = 1,
}

/// RPC message header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RpcHeader {
    /// Transaction ID
    pub xid: u32,
    /// Message type (call or reply)
    pub msg_type: MessageType,
}

/// RPC call body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcCall {
    /// Transaction ID
    pub xid: u32,
    /// RPC version (should be 2)
    pub rpc_version: u32,
    /// Program number (100003 for NFS)
    pub program: u32,
    /// Program version (4 for NFSv4)
    pub version: u32,
    /// Procedure number
    pub procedure: u32,
    /// Authentication credentials
    pub cred: Credentials,
    /// Authentication verifier (usually empty)
    pub verf: OpaqueAuth,
}

/// Raw authentication data: a flavor and its opaque body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpaqueAuth {
    /// Authentication flavor number
    pub flavor: u32,
    /// Flavor-specific body
    pub body: Bytes,
}

/// Credentials presented with a call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    /// AUTH_NONE
    None,
    /// AUTH_SYS, accepted and otherwise ignored
    Sys(AuthSys),
    /// Any flavor the server does not speak
    Unsupported(OpaqueAuth),
}

/// AUTH_SYS authentication (basic Unix-style)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSys {
    /// Timestamp
    pub stamp: u32,
    /// Machine name
    pub machinename: String,
    /// User ID
    pub uid: u32,
    /// Group ID
    pub gid: u32,
    /// Auxiliary group IDs
    pub gids: Vec<u32>,
}

/// RPC reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcReply {
    /// Transaction ID of the call being answered
    pub xid: u32,
    /// Outcome of the call
    pub body: ReplyBody,
}

/// Outcome of a call, covering accepted and denied replies
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyBody {
    /// The procedure ran; carries its encoded results
    Success(Bytes),
    /// The program is not served
    ProgUnavail,
    /// The program version is not served
    ProgMismatch {
        /// Lowest version served
        low: u32,
        /// Highest version served
        high: u32,
    },
    /// The procedure does not exist
    ProcUnavail,
    /// The arguments could not be decoded
    GarbageArgs,
    /// The server failed internally
    SystemErr,
    /// The RPC version is not spoken
    RpcMismatch {
        /// Lowest RPC version spoken
        low: u32,
        /// Highest RPC version spoken
        high: u32,
    },
    /// The credentials were rejected
    AuthError(AuthStatus),
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl RpcCall {
    /// Checks the call against what this server serves.
    ///
    /// ## Returns
    ///
    /// The procedure to run, or the reply that rejects the call.
    pub fn validate(&self) -> Result<NfsProcedure, ReplyBody> {
        if self.rpc_version != RPC_VERSION {
            return Err(ReplyBody::RpcMismatch {
                low: RPC_VERSION,
                high: RPC_VERSION,
            });
        }

        if let Credentials::Unsupported(_) = self.cred {
            return Err(ReplyBody::AuthError(AuthStatus::TooWeak));
        }

        if self.program != NFS_PROGRAM {
            return Err(ReplyBody::ProgUnavail);
        }

        if self.version != NFS_VERSION {
            return Err(ReplyBody::ProgMismatch {
                low: NFS_VERSION,
                high: NFS_VERSION,
            });
        }

        NfsProcedure::try_from(self.procedure).map_err(|_| ReplyBody::ProcUnavail)
    }
}

impl OpaqueAuth {
    /// The AUTH_NONE verifier.
    pub fn none() -> Self {
        Self {
            flavor: AuthFlavor::None.into(),
            body: Bytes::new(),
        }
    }
}

impl RpcReply {
    /// Creates a reply to `xid`.
    pub fn new(xid: u32, body: ReplyBody) -> Self {
        Self { xid, body }
    }

    /// Encodes the reply into a fresh buffer.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.encode(&mut buf);
        buf.freeze()
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl XdrEncode for RpcHeader {
    fn encode<B: BufMut>(&self, buf: &mut B) {
        self.xid.encode(buf);
        u32::from(self.msg_type).encode(buf);
    }
}

impl XdrDecode for RpcHeader {
    fn decode<B: Buf>(buf: &mut B) -> NfsResult<Self> {
        let xid = u32::decode(buf)?;
        let msg_type = u32::decode(buf)?;
        let msg_type = MessageType::try_from(msg_type)
            .map_err(|e| NfsError::Rpc(format!("invalid message type: {e}")))?;
        Ok(RpcHeader { xid, msg_type })
    }
}

impl XdrEncode for OpaqueAuth {
    fn encode<B: BufMut>(&self, buf: &mut B) {
        self.flavor.encode(buf);
        helpers::encode_opaque(&self.body, buf);
    }
}

impl XdrDecode for OpaqueAuth {
    fn decode<B: Buf>(buf: &mut B) -> NfsResult<Self> {
        let flavor = u32::decode(buf)?;
        let body = helpers::decode_opaque(buf, MAX_AUTH_BYTES)?;
        Ok(OpaqueAuth { flavor, body })
    }
}

impl XdrEncode for Credentials {
    fn encode<B: BufMut>(&self, buf: &mut B) {
        match self {
            Credentials::None => OpaqueAuth::none().encode(buf),
            Credentials::Sys(sys) => {
                let mut body = BytesMut::new();
                sys.encode(&mut body);
                OpaqueAuth {
                    flavor: AuthFlavor::Sys.into(),
                    body: body.freeze(),
                }
                .encode(buf);
            }
            Credentials::Unsupported(auth) => auth.encode(buf),
        }
    }
}

impl XdrDecode for Credentials {
    fn decode<B: Buf>(buf: &mut B) -> NfsResult<Self> {
        let auth = OpaqueAuth::decode(buf)?;
        match AuthFlavor::try_from(auth.flavor) {
            Ok(AuthFlavor::None) => Ok(Credentials::None),
            Ok(AuthFlavor::Sys) => Ok(Credentials::Sys(AuthSys::decode(&mut auth.body.clone())?)),
            Err(_) => Ok(Credentials::Unsupported(auth)),
        }
    }
}

impl XdrEncode for RpcCall {
    fn encode<B: BufMut>(&self, buf: &mut B) {
        RpcHeader {
            xid: self.xid,
            msg_type: MessageType::Call,
        }
        .encode(buf);
        self.rpc_version.encode(buf);
        self.program.encode(buf);
        self.version.encode(buf);
        self.procedure.encode(buf);
        self.cred.encode(buf);
        self.verf.encode(buf);
    }
}

impl XdrDecode for RpcCall {
    /// Decodes a call message, header included. The procedure arguments are left in `buf`.
    fn decode<B: Buf>(buf: &mut B) -> NfsResult<Self> {
        let header = RpcHeader::decode(buf)?;
        if header.msg_type != MessageType::Call {
            return Err(NfsError::Rpc("unexpected rpc reply".into()));
        }

        Ok(RpcCall {
            xid: header.xid,
            rpc_version: u32::decode(buf)?,
            program: u32::decode(buf)?,
            version: u32::decode(buf)?,
            procedure: u32::decode(buf)?,
            cred: Credentials::decode(buf)?,
            verf: OpaqueAuth::decode(buf)?,
        })
    }
}

impl XdrEncode for AuthSys {
    fn encode<B: BufMut>(&self, buf: &mut B) {
        self.stamp.encode(buf);
        helpers::encode_string(&self.machinename, buf);
        self.uid.encode(buf);
        self.gid.encode(buf);
        helpers::encode_array(&self.gids, buf);
    }
}

impl XdrDecode for AuthSys {
    fn decode<B: Buf>(buf: &mut B) -> NfsResult<Self> {
        Ok(AuthSys {
            stamp: u32::decode(buf)?,
            machinename: helpers::decode_string(buf, MAX_MACHINE_NAME)?,
            uid: u32::decode(buf)?,
            gid: u32::decode(buf)?,
            gids: helpers::decode_array(buf, MAX_AUX_GIDS)?,
        })
    }
}

impl XdrEncode for RpcReply {
    fn encode<B: BufMut>(&self, buf: &mut B) {
        RpcHeader {
            xid: self.xid,
            msg_type: MessageType::Reply,
        }
        .encode(buf);

        match &self.body {
            ReplyBody::RpcMismatch { low, high } => {
                1u32.encode(buf); // MSG_DENIED
                0u32.encode(buf); // RPC_MISMATCH
                low.encode(buf);
                high.encode(buf);
            }
            ReplyBody::AuthError(status) => {
                1u32.encode(buf); // MSG_DENIED
                1u32.encode(buf); // AUTH_ERROR
                u32::from(*status).encode(buf);
            }
            accepted => {
                0u32.encode(buf); // MSG_ACCEPTED
                OpaqueAuth::none().encode(buf);
                match accepted {
                    ReplyBody::Success(results) => {
                        0u32.encode(buf);
                        buf.put_slice(results);
                    }
                    ReplyBody::ProgUnavail => 1u32.encode(buf),
                    ReplyBody::ProgMismatch { low, high } => {
                        2u32.encode(buf);
                        low.encode(buf);
                        high.encode(buf);
                    }
                    ReplyBody::ProcUnavail => 3u32.encode(buf),
                    ReplyBody::GarbageArgs => 4u32.encode(buf),
                    _ => 5u32.encode(buf), // SYSTEM_ERR
                }
            }
        }
    }
}

impl XdrDecode for RpcReply {
    /// Decodes a reply. The results of a successful call are everything after the header.
    fn decode<B: Buf>(buf: &mut B) -> NfsResult<Self> {
        let header = RpcHeader::decode(buf)?;
        if header.msg_type != MessageType::Reply {
            return Err(NfsError::Rpc("expected an rpc reply".into()));
        }

        let body = match u32::decode(buf)? {
            0 => {
                OpaqueAuth::decode(buf)?;
                match u32::decode(buf)? {
                    0 => ReplyBody::Success(buf.copy_to_bytes(buf.remaining())),
                    1 => ReplyBody::ProgUnavail,
                    2 => ReplyBody::ProgMismatch {
                        low: u32::decode(buf)?,
                        high: u32::decode(buf)?,
                    },
                    3 => ReplyBody::ProcUnavail,
                    4 => ReplyBody::GarbageArgs,
                    _ => ReplyBody::SystemErr,
                }
            }
            1 => match u32::decode(buf)? {
                0 => ReplyBody::RpcMismatch {
                    low: u32::decode(buf)?,
                    high: u32::decode(buf)?,
                },
                _ => ReplyBody::AuthError(
                    AuthStatus::try_from(u32::decode(buf)?)
                        .map_err(|e| NfsError::Rpc(format!("invalid auth status: {e}")))?,
                ),
            },
            other => return Err(NfsError::Rpc(format!("invalid reply status {other}"))),
        };

        Ok(RpcReply {
            xid: header.xid,
            body,
        })
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
