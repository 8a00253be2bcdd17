//! Attribute operations.

use memfs::{FileHandle, InodeId, InodeKind};

use crate::defaults::{FILES_TOTAL, MAX_READ, MAX_WRITE, SPACE_TOTAL};
use crate::nfs::{
    bits, decode_settable, encode_attrs, supported_attrs, AttrContext, Bitmap4, Fattr4, FsStats,
    NfsOpcode, NfsResOp, NfsStat4, ResBody, Stateid4,
};

use super::{Dispatcher, OpResult, RequestContext};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

const ACCESS4_READ: u32 = 0x01;
const ACCESS4_LOOKUP: u32 = 0x02;
const ACCESS4_MODIFY: u32 = 0x04;
const ACCESS4_EXTEND: u32 = 0x08;
const ACCESS4_DELETE: u32 = 0x10;
const ACCESS4_EXECUTE: u32 = 0x20;

const FILE_ACCESS: u32 = ACCESS4_READ | ACCESS4_MODIFY | ACCESS4_EXTEND | ACCESS4_EXECUTE;

const DIR_ACCESS: u32 =
    ACCESS4_READ | ACCESS4_LOOKUP | ACCESS4_MODIFY | ACCESS4_EXTEND | ACCESS4_DELETE;

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Dispatcher {
    /// Encodes the requested attributes of an inode.
    pub(super) async fn fattr_of(
        &self,
        id: InodeId,
        handle: &FileHandle,
        mask: &Bitmap4,
    ) -> Result<Fattr4, NfsStat4> {
        let store = self.fs.get_store();
        let attrs = store.attributes_of(id).await?;
        let ctx = AttrContext {
            attrs: &attrs,
            handle,
            stats: FsStats {
                files_used: store.inode_count(),
                files_total: FILES_TOTAL,
                bytes_used: store.bytes_used(),
                bytes_total: SPACE_TOTAL,
            },
            lease_time: self.lease_time,
            max_read: u64::from(MAX_READ),
            max_write: u64::from(MAX_WRITE),
        };

        Ok(encode_attrs(mask, &ctx))
    }

    pub(super) async fn get_attr(&self, mask: &Bitmap4, ctx: &RequestContext) -> OpResult {
        let (handle, id) = self.current(ctx)?;
        Ok(ResBody::GetAttr(self.fattr_of(id, &handle, mask).await?))
    }

    /// SETATTR reports the attributes it applied even when it fails, so it builds its own result.
    pub(super) async fn set_attr(
        &self,
        stateid: &Stateid4,
        attrs: &Fattr4,
        ctx: &RequestContext,
    ) -> NfsResOp {
        let status = match self.apply_attrs(stateid, attrs, ctx).await {
            Ok(applied) => {
                return NfsResOp::ok(NfsOpcode::SetAttr, ResBody::SetAttr(applied));
            }
            Err(status) => status,
        };

        NfsResOp {
            opcode: NfsOpcode::SetAttr,
            status,
            body: ResBody::SetAttr(Bitmap4::new()),
        }
    }

    async fn apply_attrs(
        &self,
        stateid: &Stateid4,
        attrs: &Fattr4,
        ctx: &RequestContext,
    ) -> Result<Bitmap4, NfsStat4> {
        let (_, id) = self.current(ctx)?;
        let (changes, applied) = decode_settable(attrs)?;

        if changes.size.is_some() {
            self.state.check_io(stateid, id, true)?;
        }

        self.fs.get_store().set_attributes(id, &changes).await?;
        Ok(applied)
    }

    /// VERIFY when `expect_same`, NVERIFY otherwise.
    pub(super) async fn verify(
        &self,
        attrs: &Fattr4,
        expect_same: bool,
        ctx: &RequestContext,
    ) -> OpResult {
        let (handle, id) = self.current(ctx)?;

        if attrs.mask.contains(bits::RDATTR_ERROR) {
            return Err(NfsStat4::Inval);
        }
        if !attrs.mask.difference(&supported_attrs()).is_empty() {
            return Err(NfsStat4::AttrNotSupp);
        }

        let current = self.fattr_of(id, &handle, &attrs.mask).await?;
        if current.mask != attrs.mask {
            // A write-only attribute was named.
            return Err(NfsStat4::Inval);
        }

        match (current.values == attrs.values, expect_same) {
            (true, true) | (false, false) => Ok(ResBody::Empty),
            (false, true) => Err(NfsStat4::NotSame),
            (true, false) => Err(NfsStat4::Same),
        }
    }

    pub(super) async fn access(&self, requested: u32, ctx: &RequestContext) -> OpResult {
        let (_, id) = self.current(ctx)?;
        let granted = match self.fs.get_store().get(id)?.get_kind() {
            InodeKind::File => FILE_ACCESS,
            InodeKind::Directory => DIR_ACCESS,
        };

        let supported = requested & granted;
        Ok(ResBody::Access {
            supported,
            access: supported,
        })
    }
}
