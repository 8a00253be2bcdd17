use thiserror::Error;

use crate::InodeId;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The result of a file system operation.
pub type FsResult<T> = Result<T, FsError>;

/// An error that occurred during a file system operation.
#[derive(pretty_error_debug::Debug, Error, PartialEq, Eq, Clone)]
pub enum FsError {
    /// The name does not exist in the directory
    #[error("name does not exist: {0}")]
    NotFound(String),

    /// The name already exists in the directory
    #[error("name already exists: {0}")]
    AlreadyExists(String),

    /// The inode is not a directory
    #[error("inode is not a directory: {0}")]
    NotADirectory(InodeId),

    /// The inode is a directory
    #[error("inode is a directory: {0}")]
    IsADirectory(InodeId),

    /// The directory is not empty
    #[error("directory is not empty: {0}")]
    NotEmpty(String),

    /// The inode no longer exists
    #[error("stale inode: {0}")]
    StaleHandle(InodeId),

    /// The handle bytes are not a handle this server issues
    #[error("malformed file handle of {0} bytes")]
    BadHandle(usize),

    /// Invalid offset for read/write operation
    #[error("invalid offset {offset} for inode: {id}")]
    InvalidOffset {
        /// The inode being accessed
        id: InodeId,

        /// The offset that is invalid
        offset: u64,
    },

    /// An argument is out of range
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A readdir cookie that was never issued for the directory
    #[error("bad readdir cookie {cookie} for directory: {id}")]
    BadCookie {
        /// The directory being listed
        id: InodeId,

        /// The cookie supplied by the caller
        cookie: u64,
    },

    /// Empty path segment
    #[error("empty path segment")]
    EmptyPathSegment,

    /// Invalid path component (e.g. ".", "..", "a/b")
    #[error("invalid path component: {0:?}")]
    InvalidPathComponent(String),

    /// The name exceeds the maximum name length
    #[error("name is {0} bytes long")]
    NameTooLong(usize),

    /// An inode lock could not be acquired in time
    #[error("inode is busy: {0}")]
    ResourceBusy(InodeId),

    /// A shared table lock was poisoned by a panicking writer
    #[error("lock poisoned: {0}")]
    LockPoisoned(&'static str),
}
