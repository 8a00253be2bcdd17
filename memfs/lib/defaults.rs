use std::time::Duration;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// How long a single attempt at an inode lock may wait.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(2);

/// How many times a timed-out inode lock is retried before the operation reports busy.
pub const DEFAULT_LOCK_RETRIES: u32 = 3;

/// The size reported for every directory.
pub const DIRECTORY_SIZE: u64 = 4096;

/// Largest size a file may grow to, in bytes.
pub const MAX_FILE_SIZE: u64 = 1 << 40;
