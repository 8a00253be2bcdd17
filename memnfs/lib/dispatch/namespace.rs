//! Operations that change or list directories.

use bytes::Bytes;

use crate::nfs::{
    component_str, decode_settable, Bitmap4, ChangeInfo4, CreateKind, DirEntry4, Fattr4,
    NfsStat4, ResBody,
};

use super::{Dispatcher, OpResult, RequestContext};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// `nfs_ftype4` of a regular file, which CREATE refuses in favour of OPEN
const NF4REG: u32 = 1;

/// Cookie verifier of every listing. Cookies stay valid for the life of their directory.
const COOKIE_VERIFIER: [u8; 8] = [0; 8];

/// Bytes of a READDIR reply outside its entries: verifier, end of list and eof.
const READDIR_OVERHEAD: usize = 8 + 4 + 4;

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Dispatcher {
    pub(super) async fn create(
        &self,
        kind: CreateKind,
        name: &Bytes,
        attrs: &Fattr4,
        ctx: &mut RequestContext,
    ) -> OpResult {
        let (_, parent) = self.current(ctx)?;
        match kind {
            CreateKind::Directory => {}
            CreateKind::Other(NF4REG) => return Err(NfsStat4::BadType),
            _ => return Err(NfsStat4::NotSupp),
        }

        let name = component_str(name)?;
        let (changes, requested) = decode_settable(attrs)?;
        if changes.size.is_some() {
            return Err(NfsStat4::Inval);
        }

        let store = self.fs.get_store();
        let (id, change) = store.create_directory(parent, name).await?;
        let attrset = if changes.is_empty() {
            Bitmap4::new()
        } else {
            store.set_attributes(id, &changes).await?;
            requested
        };

        tracing::debug!(%parent, %id, name, "created directory");
        ctx.current_fh = Some(self.fs.handle_for(id)?);
        Ok(ResBody::Create {
            cinfo: change.into(),
            attrset,
        })
    }

    pub(super) async fn remove(&self, name: &Bytes, ctx: &mut RequestContext) -> OpResult {
        let (_, parent) = self.current(ctx)?;
        let name = component_str(name)?;

        let (id, change) = self.fs.remove_entry(parent, name).await?;
        self.state.forget_inode(id)?;

        tracing::debug!(%parent, %id, name, "removed");
        Ok(ResBody::Remove(ChangeInfo4::from(change)))
    }

    /// Lists a directory from `cookie` on, stopping before the reply would exceed `maxcount`.
    ///
    /// Entries removed while the listing is built are skipped.
    pub(super) async fn read_dir(
        &self,
        cookie: u64,
        maxcount: u32,
        attr_request: &Bitmap4,
        ctx: &RequestContext,
    ) -> OpResult {
        let (_, dir) = self.current(ctx)?;
        if cookie == 1 || cookie == 2 {
            return Err(NfsStat4::BadCookie);
        }

        let candidates = self.fs.get_store().entries_after(dir, cookie).await?;
        let budget = (maxcount as usize).saturating_sub(READDIR_OVERHEAD);

        let mut used = 0;
        let mut entries = Vec::new();
        let mut eof = true;

        for candidate in candidates {
            let Ok(handle) = self.fs.handle_for(candidate.get_id()) else {
                continue;
            };
            let attrs = match self.fattr_of(candidate.get_id(), &handle, attr_request).await {
                Ok(attrs) => attrs,
                Err(NfsStat4::Stale) => continue,
                Err(status) => return Err(status),
            };

            let entry = DirEntry4 {
                cookie: candidate.get_cookie(),
                name: candidate.get_name().to_string(),
                attrs,
            };

            let len = entry.encoded_len();
            if used + len > budget {
                if entries.is_empty() {
                    return Err(NfsStat4::TooSmall);
                }
                eof = false;
                break;
            }

            used += len;
            entries.push(entry);
        }

        Ok(ResBody::ReadDir {
            verifier: COOKIE_VERIFIER,
            entries,
            eof,
        })
    }
}
