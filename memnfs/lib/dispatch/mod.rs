//! Executes COMPOUND requests against the file system.

mod attrs;
mod client;
mod filehandle;
mod io;
mod namespace;

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use getset::Getters;
use memfs::{FileHandle, InodeId, MemFs};

use crate::defaults::MAX_COMPOUND_OPS;
use crate::nfs::{
    Compound4Res, CompoundHeader, NfsArgOp, NfsOpcode, NfsResOp, NfsStat4, ResBody,
};
use crate::rpc::{NfsProcedure, ReplyBody, RpcCall, RpcReply};
use crate::state::{SessionId, StateManager};
use crate::xdr::XdrDecode;
use crate::NfsResult;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Runs NFS procedures against a shared file system and state table.
///
/// Cloning is cheap; every connection holds its own clone.
#[derive(Debug, Clone, Getters)]
#[getset(get = "pub with_prefix")]
pub struct Dispatcher {
    /// The file system being served
    fs: MemFs,

    /// Client and open state
    state: Arc<StateManager>,

    /// Lease time reported to clients, in seconds
    lease_time: u32,
}

/// The per-COMPOUND evaluation state.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Connection the request arrived on
    pub session: SessionId,

    /// The current filehandle
    pub current_fh: Option<FileHandle>,

    /// The saved filehandle
    pub saved_fh: Option<FileHandle>,
}

type OpResult = Result<ResBody, NfsStat4>;

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Dispatcher {
    /// Creates a dispatcher serving `fs` with the given lease time in seconds.
    pub fn new(fs: MemFs, lease_time: u32) -> Self {
        let generation = fs.get_registry().get_generation();
        let boot = (generation ^ (generation >> 32)) as u32;
        let state = StateManager::new(boot, Duration::from_secs(u64::from(lease_time)));

        Self {
            fs,
            state: Arc::new(state),
            lease_time,
        }
    }

    /// Answers one RPC call whose arguments follow in `args`.
    pub async fn handle_call(&self, call: &RpcCall, args: Bytes, session: SessionId) -> RpcReply {
        let body = match call.validate() {
            Err(rejection) => rejection,
            Ok(NfsProcedure::Null) => ReplyBody::Success(Bytes::new()),
            Ok(NfsProcedure::Compound) => match self.compound(args, session).await {
                Ok(result) => ReplyBody::Success(result.to_bytes()),
                Err(error) => {
                    tracing::warn!(xid = call.xid, %error, "undecodable compound");
                    ReplyBody::GarbageArgs
                }
            },
        };

        RpcReply::new(call.xid, body)
    }

    /// Executes the operations of a COMPOUND in order, stopping at the first failure.
    ///
    /// ## Errors
    ///
    /// Returns an error only if the COMPOUND header does not decode. Failures of individual
    /// operations are reported in their result.
    pub async fn compound(&self, mut args: Bytes, session: SessionId) -> NfsResult<Compound4Res> {
        let header = CompoundHeader::decode(&mut args)?;
        let mut reply = Compound4Res {
            status: NfsStat4::Ok,
            tag: header.tag,
            results: Vec::new(),
        };

        if header.minor_version != 0 {
            reply.status = NfsStat4::MinorVersMismatch;
            return Ok(reply);
        }
        if header.op_count > MAX_COMPOUND_OPS {
            reply.status = NfsStat4::Resource;
            return Ok(reply);
        }

        let mut ctx = RequestContext {
            session,
            ..Default::default()
        };

        for _ in 0..header.op_count {
            let result = match NfsArgOp::decode_op(&mut args) {
                Ok(op) => self.execute(op, &mut ctx).await,
                Err(failure) => NfsResOp::error(failure.opcode, failure.status),
            };

            tracing::debug!(session, op = opcode_name(result.opcode), status = ?result.status, "executed");
            reply.status = result.status;
            reply.results.push(result);
            if reply.status != NfsStat4::Ok {
                break;
            }
        }

        Ok(reply)
    }

    /// Executes one decoded operation.
    pub async fn execute(&self, op: NfsArgOp, ctx: &mut RequestContext) -> NfsResOp {
        let opcode = op.opcode();
        let result = match op {
            NfsArgOp::PutFh(handle) => self.put_fh(&handle, ctx),
            NfsArgOp::PutRootFh | NfsArgOp::PutPubFh => self.put_root_fh(ctx),
            NfsArgOp::GetFh => self.get_fh(ctx),
            NfsArgOp::SaveFh => self.save_fh(ctx),
            NfsArgOp::RestoreFh => self.restore_fh(ctx),
            NfsArgOp::Lookup(name) => self.lookup(&name, ctx).await,
            NfsArgOp::LookupP => self.lookup_parent(ctx),
            NfsArgOp::SecInfo(name) => self.sec_info(&name, ctx).await,

            NfsArgOp::Create { kind, name, attrs } => self.create(kind, &name, &attrs, ctx).await,
            NfsArgOp::Remove(name) => self.remove(&name, ctx).await,
            NfsArgOp::ReadDir {
                cookie,
                maxcount,
                attr_request,
                ..
            } => self.read_dir(cookie, maxcount, &attr_request, ctx).await,

            NfsArgOp::Access(requested) => self.access(requested, ctx).await,
            NfsArgOp::GetAttr(mask) => self.get_attr(&mask, ctx).await,
            NfsArgOp::SetAttr { stateid, attrs } => {
                return self.set_attr(&stateid, &attrs, ctx).await;
            }
            NfsArgOp::Verify(attrs) => self.verify(&attrs, true, ctx).await,
            NfsArgOp::NVerify(attrs) => self.verify(&attrs, false, ctx).await,

            NfsArgOp::Open(args) => self.open(args, ctx).await,
            NfsArgOp::OpenConfirm { stateid, .. } => self.open_confirm(&stateid, ctx),
            NfsArgOp::OpenDowngrade {
                stateid,
                share_access,
                share_deny,
                ..
            } => self.open_downgrade(&stateid, share_access, share_deny, ctx),
            NfsArgOp::Close { stateid, .. } => self.close(&stateid, ctx),
            NfsArgOp::Read {
                stateid,
                offset,
                count,
            } => self.read(&stateid, offset, count, ctx).await,
            NfsArgOp::Write {
                stateid,
                offset,
                stable,
                data,
            } => self.write(&stateid, offset, stable, &data, ctx).await,
            NfsArgOp::Commit { offset, count } => self.commit(offset, count, ctx),

            NfsArgOp::SetClientId { verifier, id, .. } => self.set_client_id(verifier, id),
            NfsArgOp::SetClientIdConfirm { clientid, verifier } => {
                self.set_client_id_confirm(clientid, verifier)
            }
            NfsArgOp::Renew(clientid) => self.renew(clientid),
            NfsArgOp::ReleaseLockOwner { clientid, .. } => self.release_lock_owner(clientid),
        };

        match result {
            Ok(body) => NfsResOp::ok(opcode, body),
            Err(status) => NfsResOp::error(opcode, status),
        }
    }

    /// Resolves the current filehandle to a live inode.
    fn current(&self, ctx: &RequestContext) -> Result<(FileHandle, InodeId), NfsStat4> {
        let handle = ctx.current_fh.ok_or(NfsStat4::NoFileHandle)?;
        let id = self.fs.resolve(&handle)?;
        Ok((handle, id))
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Reports an opcode to the log the way the wire names it.
pub fn opcode_name(opcode: NfsOpcode) -> &'static str {
    match opcode {
        NfsOpcode::Access => "ACCESS",
        NfsOpcode::Close => "CLOSE",
        NfsOpcode::Commit => "COMMIT",
        NfsOpcode::Create => "CREATE",
        NfsOpcode::DelegPurge => "DELEGPURGE",
        NfsOpcode::DelegReturn => "DELEGRETURN",
        NfsOpcode::GetAttr => "GETATTR",
        NfsOpcode::GetFh => "GETFH",
        NfsOpcode::Link => "LINK",
        NfsOpcode::Lock => "LOCK",
        NfsOpcode::LockT => "LOCKT",
        NfsOpcode::LockU => "LOCKU",
        NfsOpcode::Lookup => "LOOKUP",
        NfsOpcode::LookupP => "LOOKUPP",
        NfsOpcode::NVerify => "NVERIFY",
        NfsOpcode::Open => "OPEN",
        NfsOpcode::OpenAttr => "OPENATTR",
        NfsOpcode::OpenConfirm => "OPEN_CONFIRM",
        NfsOpcode::OpenDowngrade => "OPEN_DOWNGRADE",
        NfsOpcode::PutFh => "PUTFH",
        NfsOpcode::PutPubFh => "PUTPUBFH",
        NfsOpcode::PutRootFh => "PUTROOTFH",
        NfsOpcode::Read => "READ",
        NfsOpcode::ReadDir => "READDIR",
        NfsOpcode::ReadLink => "READLINK",
        NfsOpcode::Remove => "REMOVE",
        NfsOpcode::Rename => "RENAME",
        NfsOpcode::Renew => "RENEW",
        NfsOpcode::RestoreFh => "RESTOREFH",
        NfsOpcode::SaveFh => "SAVEFH",
        NfsOpcode::SecInfo => "SECINFO",
        NfsOpcode::SetAttr => "SETATTR",
        NfsOpcode::SetClientId => "SETCLIENTID",
        NfsOpcode::SetClientIdConfirm => "SETCLIENTID_CONFIRM",
        NfsOpcode::Verify => "VERIFY",
        NfsOpcode::Write => "WRITE",
        NfsOpcode::ReleaseLockOwner => "RELEASE_LOCKOWNER",
        NfsOpcode::Illegal => "ILLEGAL",
    }
}
