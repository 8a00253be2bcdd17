//! OPEN, CLOSE and file I/O.

use bytes::Bytes;
use memfs::{CreateMode, InodeKind, SetAttributes, StableHow};

use crate::defaults::MAX_READ;
use crate::nfs::{
    bits, component_str, decode_settable, Bitmap4, ChangeInfo4, CreateHow, NfsStat4, OpenArgs,
    OpenClaim, OpenHow, OpenResult, ResBody, Stateid4, OPEN4_RESULT_CONFIRM,
    OPEN4_RESULT_LOCKTYPE_POSIX,
};
use crate::state::OpenRequest;

use super::{Dispatcher, OpResult, RequestContext};

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Dispatcher {
    /// Opens, and possibly creates, a file named in the current directory. On success the
    /// current filehandle is the opened file.
    pub(super) async fn open(&self, args: OpenArgs, ctx: &mut RequestContext) -> OpResult {
        let (_, dir) = self.current(ctx)?;
        let name = match &args.claim {
            OpenClaim::Null(name) => name,
            OpenClaim::Previous(_) => return Err(NfsStat4::NoGrace),
            OpenClaim::DelegateCur { .. } | OpenClaim::DelegatePrev(_) => {
                return Err(NfsStat4::NotSupp)
            }
        };
        let name = component_str(name)?;

        // Refuse unknown clients before touching the tree.
        self.state.renew(args.clientid)?;

        let store = self.fs.get_store();
        let (id, cinfo, changes, attrset) = match &args.how {
            OpenHow::NoCreate => {
                let id = store.lookup(dir, name).await?;
                if store.get(id)?.get_kind() == InodeKind::Directory {
                    return Err(NfsStat4::IsDir);
                }
                let change = store.attributes_of(dir).await?.get_change();
                let cinfo = ChangeInfo4 {
                    atomic: true,
                    before: change,
                    after: change,
                };
                (id, cinfo, SetAttributes::default(), Bitmap4::new())
            }
            OpenHow::Create(how) => {
                let (mode, changes, requested) = match how {
                    CreateHow::Unchecked(attrs) => {
                        let (changes, requested) = decode_settable(attrs)?;
                        (CreateMode::Unchecked, changes, requested)
                    }
                    CreateHow::Guarded(attrs) => {
                        let (changes, requested) = decode_settable(attrs)?;
                        (CreateMode::Guarded, changes, requested)
                    }
                    CreateHow::Exclusive(verifier) => (
                        CreateMode::Exclusive(*verifier),
                        SetAttributes::default(),
                        Bitmap4::new(),
                    ),
                };

                let opened = store.open_or_create_file(dir, name, mode).await?;
                let id = opened.get_id();
                if opened.get_created() {
                    tracing::debug!(%dir, %id, name, "created file");
                }

                // An existing file only takes a new size.
                let (changes, attrset) = if opened.get_created() {
                    (changes, requested)
                } else if let Some(size) = changes.size {
                    let truncate = SetAttributes {
                        size: Some(size),
                        ..Default::default()
                    };
                    (truncate, Bitmap4::from_bits(&[bits::SIZE]))
                } else {
                    (SetAttributes::default(), Bitmap4::new())
                };

                (id, opened.get_change().into(), changes, attrset)
            }
        };

        // The share reservation is taken before any attribute changes so a denied open leaves
        // the file untouched.
        let grant = self.state.open(OpenRequest {
            session: ctx.session,
            clientid: args.clientid,
            owner: args.owner,
            inode: id,
            access: args.share_access,
            deny: args.share_deny,
        })?;

        if !changes.is_empty() {
            if let Err(error) = store.set_attributes(id, &changes).await {
                self.state.abandon_open(&grant)?;
                return Err(error.into());
            }
        }

        let mut rflags = OPEN4_RESULT_LOCKTYPE_POSIX;
        if grant.get_needs_confirm() {
            rflags |= OPEN4_RESULT_CONFIRM;
        }

        ctx.current_fh = Some(self.fs.handle_for(id)?);
        Ok(ResBody::Open(OpenResult {
            stateid: grant.get_stateid(),
            cinfo,
            rflags,
            attrset,
        }))
    }

    pub(super) fn open_confirm(&self, stateid: &Stateid4, ctx: &RequestContext) -> OpResult {
        self.current(ctx)?;
        Ok(ResBody::Stateid(self.state.confirm_open(stateid)?))
    }

    pub(super) fn open_downgrade(
        &self,
        stateid: &Stateid4,
        share_access: u32,
        share_deny: u32,
        ctx: &RequestContext,
    ) -> OpResult {
        self.current(ctx)?;
        Ok(ResBody::Stateid(
            self.state.downgrade(stateid, share_access, share_deny)?,
        ))
    }

    pub(super) fn close(&self, stateid: &Stateid4, ctx: &RequestContext) -> OpResult {
        self.current(ctx)?;
        Ok(ResBody::Stateid(self.state.close(stateid)?))
    }

    pub(super) async fn read(
        &self,
        stateid: &Stateid4,
        offset: u64,
        count: u32,
        ctx: &RequestContext,
    ) -> OpResult {
        let (_, id) = self.current(ctx)?;
        self.fs.get_store().ensure_file(id)?;
        self.state.check_io(stateid, id, false)?;

        let length = count.min(MAX_READ) as usize;
        let (data, eof) = self.fs.get_store().read(id, offset, length).await?;
        Ok(ResBody::Read {
            eof,
            data: Bytes::from(data),
        })
    }

    pub(super) async fn write(
        &self,
        stateid: &Stateid4,
        offset: u64,
        stable: u32,
        data: &Bytes,
        ctx: &RequestContext,
    ) -> OpResult {
        let (_, id) = self.current(ctx)?;
        let requested = stable_how(stable)?;
        self.fs.get_store().ensure_file(id)?;
        self.state.check_io(stateid, id, true)?;

        let outcome = self.fs.perform_write(id, offset, data, requested).await?;
        Ok(ResBody::Write {
            count: u32::try_from(outcome.get_count()).map_err(|_| NfsStat4::Inval)?,
            committed: stable_code(outcome.get_committed()),
            verifier: outcome.get_verifier(),
        })
    }

    pub(super) fn commit(&self, offset: u64, count: u32, ctx: &RequestContext) -> OpResult {
        let (_, id) = self.current(ctx)?;
        Ok(ResBody::Commit(self.fs.commit(id, offset, count)?))
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

fn stable_how(stable: u32) -> Result<StableHow, NfsStat4> {
    match stable {
        0 => Ok(StableHow::Unstable),
        1 => Ok(StableHow::DataSync),
        2 => Ok(StableHow::FileSync),
        _ => Err(NfsStat4::BadXdr),
    }
}

fn stable_code(how: StableHow) -> u32 {
    match how {
        StableHow::Unstable => 0,
        StableHow::DataSync => 1,
        StableHow::FileSync => 2,
    }
}
