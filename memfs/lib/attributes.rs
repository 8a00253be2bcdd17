use chrono::{DateTime, Utc};
use getset::{CopyGetters, Getters};

use crate::{defaults::DIRECTORY_SIZE, Entity, FsError, FsResult, InodeId, InodeKind, InodeStore};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A snapshot of the attributes of an inode, computed from the store.
#[derive(Debug, Clone, PartialEq, Eq, Getters, CopyGetters)]
pub struct Attributes {
    /// Identity of the inode, reported as its fileid
    #[getset(get_copy = "pub with_prefix")]
    id: InodeId,

    /// Whether this is a file or a directory
    #[getset(get_copy = "pub with_prefix")]
    kind: InodeKind,

    /// Size in bytes; a nominal constant for directories
    #[getset(get_copy = "pub with_prefix")]
    size: u64,

    /// Bytes of memory held by the content
    #[getset(get_copy = "pub with_prefix")]
    space_used: u64,

    /// Permission bits
    #[getset(get_copy = "pub with_prefix")]
    mode: u32,

    /// Number of names referring to the inode
    #[getset(get_copy = "pub with_prefix")]
    nlink: u32,

    /// User ID of the owner
    #[getset(get_copy = "pub with_prefix")]
    uid: u32,

    /// Group ID of the owner
    #[getset(get_copy = "pub with_prefix")]
    gid: u32,

    /// Change counter
    #[getset(get_copy = "pub with_prefix")]
    change: u64,

    /// Last access
    #[getset(get = "pub with_prefix")]
    accessed_at: DateTime<Utc>,

    /// Last content modification
    #[getset(get = "pub with_prefix")]
    modified_at: DateTime<Utc>,

    /// Last metadata change
    #[getset(get = "pub with_prefix")]
    changed_at: DateTime<Utc>,

    /// Creation
    #[getset(get = "pub with_prefix")]
    created_at: DateTime<Utc>,
}

/// A new value for a timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetTime {
    /// The server's current time
    ServerTime,

    /// A time supplied by the client
    ClientTime(DateTime<Utc>),
}

/// Attribute changes applied together by [`InodeStore::set_attributes`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetAttributes {
    /// New size of a file
    pub size: Option<u64>,

    /// New permission bits
    pub mode: Option<u32>,

    /// New owner
    pub uid: Option<u32>,

    /// New group
    pub gid: Option<u32>,

    /// New access time
    pub accessed_at: Option<SetTime>,

    /// New modification time
    pub modified_at: Option<SetTime>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl SetAttributes {
    /// Returns `true` if no attribute is changed.
    pub fn is_empty(&self) -> bool {
        *self == SetAttributes::default()
    }
}

impl SetTime {
    fn resolve(self) -> DateTime<Utc> {
        match self {
            SetTime::ServerTime => Utc::now(),
            SetTime::ClientTime(time) => time,
        }
    }
}

impl InodeStore {
    /// Computes the attributes of an inode.
    pub async fn attributes_of(&self, id: InodeId) -> FsResult<Attributes> {
        let inode = self.get(id)?;
        let state = inode.read(self.get_lock_policy()).await?;
        let metadata = state.get_metadata();

        let (size, space_used, nlink) = match state.get_entity() {
            Entity::Dir(dir) => (
                DIRECTORY_SIZE,
                DIRECTORY_SIZE,
                2 + u32::try_from(dir.subdirectory_count()).unwrap_or(u32::MAX - 2),
            ),
            Entity::File(file) => (file.len(), file.len(), 1),
        };

        Ok(Attributes {
            id,
            kind: inode.get_kind(),
            size,
            space_used,
            mode: metadata.get_mode(),
            nlink,
            uid: metadata.get_uid(),
            gid: metadata.get_gid(),
            change: metadata.get_change(),
            accessed_at: inode.get_accessed_at().get(),
            modified_at: *metadata.get_modified_at(),
            changed_at: *metadata.get_changed_at(),
            created_at: *metadata.get_created_at(),
        })
    }

    /// Applies a set of attribute changes atomically under the inode's lock.
    ///
    /// A size change truncates or zero-extends the file and bumps the modification time. Any
    /// other change bumps the metadata change time.
    ///
    /// ## Errors
    ///
    /// * `FsError::IsADirectory` - If a size is given for a directory
    /// * `FsError::StaleHandle` - If the inode was removed
    pub async fn set_attributes(&self, id: InodeId, changes: &SetAttributes) -> FsResult<()> {
        let inode = self.get(id)?;
        let mut state = inode.write(self.get_lock_policy()).await?;
        if state.is_unlinked() {
            return Err(FsError::StaleHandle(id));
        }

        if changes.size.is_some() && inode.get_kind() == InodeKind::Directory {
            return Err(FsError::IsADirectory(id));
        }

        if let Some(size) = changes.size {
            let (file, metadata) = state.as_mut_file(id)?;
            self.resize(id, file, metadata, size)?;
        }

        let metadata = state.metadata_mut();
        if let Some(mode) = changes.mode {
            metadata.set_mode(mode);
        }
        if let Some(uid) = changes.uid {
            metadata.set_uid(uid);
        }
        if let Some(gid) = changes.gid {
            metadata.set_gid(gid);
        }
        if let Some(time) = changes.modified_at {
            metadata.set_modified_at(time.resolve());
        }
        if let Some(time) = changes.accessed_at {
            inode.get_accessed_at().set(time.resolve());
        }

        if !changes.is_empty() {
            metadata.touch_changed();
        }

        Ok(())
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
