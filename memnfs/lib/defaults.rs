//! Default values of the server configuration.

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Default address the server binds to
pub const DEFAULT_NFS_HOST: &str = "127.0.0.1";

/// Default port, the registered NFS port
pub const DEFAULT_NFS_PORT: u16 = 2049;

/// Default lease time in seconds
pub const DEFAULT_LEASE_TIME: u32 = 60;

/// Default limit on a reassembled RPC record
pub const DEFAULT_MAX_RECORD_SIZE: usize = 4 * 1024 * 1024;

/// Largest READ served
pub const MAX_READ: u32 = 1024 * 1024;

/// Largest WRITE accepted
pub const MAX_WRITE: u32 = 1024 * 1024;

/// Most operations accepted in one COMPOUND
pub const MAX_COMPOUND_OPS: u32 = 128;

/// Inodes reported as the capacity of the file system
pub const FILES_TOTAL: u64 = u32::MAX as u64;

/// Bytes reported as the capacity of the file system
pub const SPACE_TOTAL: u64 = 1 << 40;
