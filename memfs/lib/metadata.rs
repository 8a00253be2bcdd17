use std::sync::atomic::{AtomicI64, Ordering};

use cfg_if::cfg_if;
use chrono::{DateTime, Utc};
use getset::{CopyGetters, Getters};

use crate::InodeKind;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Permission bits given to new files (rw-r--r--).
pub const DEFAULT_FILE_MODE: u32 = 0o644;

/// Permission bits given to new directories (rwxr-xr-x).
pub const DEFAULT_DIR_MODE: u32 = 0o755;

/// Mask of the bits a client may set through the mode attribute.
pub const MODE_MASK: u32 = 0o7777;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Metadata for a file or directory in the inode store.
///
/// Every mutation goes through a method that also bumps `changed_at` and the change counter, and
/// all timestamps are clamped so that they never move backwards when the wall clock does.
#[derive(Debug, Clone, CopyGetters, Getters, PartialEq, Eq)]
pub struct Metadata {
    /// Permission bits of the inode
    #[getset(get_copy = "pub with_prefix")]
    mode: u32,

    /// Size of the file in bytes
    #[getset(get_copy = "pub with_prefix")]
    size: u64,

    /// User ID of the owner
    #[getset(get_copy = "pub with_prefix")]
    uid: u32,

    /// Group ID of the owner
    #[getset(get_copy = "pub with_prefix")]
    gid: u32,

    /// Counter bumped on every data or metadata change
    #[getset(get_copy = "pub with_prefix")]
    change: u64,

    /// When the inode was created
    #[getset(get = "pub with_prefix")]
    created_at: DateTime<Utc>,

    /// When the content was last modified
    #[getset(get = "pub with_prefix")]
    modified_at: DateTime<Utc>,

    /// When the metadata was last changed
    #[getset(get = "pub with_prefix")]
    changed_at: DateTime<Utc>,
}

/// Last access time of an inode.
///
/// Kept apart from [`Metadata`] so that readers holding a shared lock can still record an access.
#[derive(Debug)]
pub struct AccessTime(AtomicI64);

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Metadata {
    /// Creates metadata for a fresh inode of the given kind, owned by the server's user.
    pub fn new(kind: InodeKind) -> Self {
        let now = Utc::now();
        let (uid, gid) = current_owner();
        Self {
            mode: match kind {
                InodeKind::Directory => DEFAULT_DIR_MODE,
                InodeKind::File => DEFAULT_FILE_MODE,
            },
            size: 0,
            uid,
            gid,
            change: 1,
            created_at: now,
            modified_at: now,
            changed_at: now,
        }
    }

    /// Records a change of the content, bumping mtime, ctime and the change counter.
    pub fn touch_modified(&mut self) {
        let now = advance(self.modified_at.max(self.changed_at));
        self.modified_at = now;
        self.changed_at = now;
        self.change += 1;
    }

    /// Records a change of the metadata only, bumping ctime and the change counter.
    pub fn touch_changed(&mut self) {
        self.changed_at = advance(self.changed_at);
        self.change += 1;
    }

    /// Sets the size of the file.
    pub fn set_size(&mut self, size: u64) {
        self.size = size;
    }

    /// Sets the permission bits, ignoring any file type bits.
    pub fn set_mode(&mut self, mode: u32) {
        self.mode = mode & MODE_MASK;
    }

    /// Sets the user ID of the owner.
    pub fn set_uid(&mut self, uid: u32) {
        self.uid = uid;
    }

    /// Sets the group ID of the owner.
    pub fn set_gid(&mut self, gid: u32) {
        self.gid = gid;
    }

    /// Sets the modification time to an explicit value.
    pub fn set_modified_at(&mut self, time: DateTime<Utc>) {
        self.modified_at = time;
    }
}

impl AccessTime {
    /// Creates an access time set to now.
    pub fn now() -> Self {
        Self(AtomicI64::new(to_nanos(Utc::now())))
    }

    /// Returns the recorded access time.
    pub fn get(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_nanos(self.0.load(Ordering::Acquire))
    }

    /// Records an access at the current time. The stored value never decreases.
    pub fn touch(&self) {
        self.0.fetch_max(to_nanos(Utc::now()), Ordering::AcqRel);
    }

    /// Overwrites the access time with an explicit value.
    pub fn set(&self, time: DateTime<Utc>) {
        self.0.store(to_nanos(time), Ordering::Release);
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Returns the current time, or `previous` if the clock went backwards.
fn advance(previous: DateTime<Utc>) -> DateTime<Utc> {
    previous.max(Utc::now())
}

fn to_nanos(time: DateTime<Utc>) -> i64 {
    time.timestamp_nanos_opt().unwrap_or(i64::MAX)
}

fn current_owner() -> (u32, u32) {
    cfg_if! {
        if #[cfg(unix)] {
            (uzers::get_current_uid(), uzers::get_current_gid())
        } else {
            (0, 0)
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
