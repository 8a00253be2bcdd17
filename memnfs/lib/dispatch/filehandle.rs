//! Operations on the current and saved filehandles.

use bytes::Bytes;
use memfs::FileHandle;

use crate::nfs::{component_str, NfsStat4, ResBody};
use crate::rpc::AuthFlavor;

use super::{Dispatcher, OpResult, RequestContext};

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Dispatcher {
    pub(super) fn put_fh(&self, handle: &Bytes, ctx: &mut RequestContext) -> OpResult {
        let handle = FileHandle::from_bytes(handle)?;
        self.fs.resolve(&handle)?;
        ctx.current_fh = Some(handle);
        Ok(ResBody::Empty)
    }

    pub(super) fn put_root_fh(&self, ctx: &mut RequestContext) -> OpResult {
        ctx.current_fh = Some(self.fs.root_handle());
        Ok(ResBody::Empty)
    }

    pub(super) fn get_fh(&self, ctx: &RequestContext) -> OpResult {
        let (handle, _) = self.current(ctx)?;
        Ok(ResBody::GetFh(Bytes::copy_from_slice(handle.as_bytes())))
    }

    pub(super) fn save_fh(&self, ctx: &mut RequestContext) -> OpResult {
        ctx.saved_fh = Some(ctx.current_fh.ok_or(NfsStat4::NoFileHandle)?);
        Ok(ResBody::Empty)
    }

    pub(super) fn restore_fh(&self, ctx: &mut RequestContext) -> OpResult {
        ctx.current_fh = Some(ctx.saved_fh.ok_or(NfsStat4::RestoreFh)?);
        Ok(ResBody::Empty)
    }

    pub(super) async fn lookup(&self, name: &Bytes, ctx: &mut RequestContext) -> OpResult {
        let (_, dir) = self.current(ctx)?;
        let name = component_str(name)?;
        let id = self.fs.get_store().lookup(dir, name).await?;
        ctx.current_fh = Some(self.fs.handle_for(id)?);
        Ok(ResBody::Empty)
    }

    pub(super) fn lookup_parent(&self, ctx: &mut RequestContext) -> OpResult {
        let (_, dir) = self.current(ctx)?;
        let parent = self.fs.get_store().parent(dir)?;
        ctx.current_fh = Some(self.fs.handle_for(parent)?);
        Ok(ResBody::Empty)
    }

    /// SECINFO leaves no current filehandle behind.
    pub(super) async fn sec_info(&self, name: &Bytes, ctx: &mut RequestContext) -> OpResult {
        let (_, dir) = self.current(ctx)?;
        let name = component_str(name)?;
        self.fs.get_store().lookup(dir, name).await?;

        ctx.current_fh = None;
        Ok(ResBody::SecInfo(vec![
            AuthFlavor::Sys.into(),
            AuthFlavor::None.into(),
        ]))
    }
}
