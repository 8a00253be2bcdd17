//! Error types for the NFSv4.0 server

use thiserror::Error;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The result of a transport, codec or configuration step.
pub type NfsResult<T> = Result<T, NfsError>;

/// An error that occurred outside a single NFS operation.
///
/// Failures of individual operations are reported to the client as `NfsStat4` values and never
/// become an `NfsError`.
#[derive(pretty_error_debug::Debug, Error)]
pub enum NfsError {
    /// I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// XDR encoding/decoding error
    #[error("xdr error: {0}")]
    Xdr(String),

    /// RPC protocol error
    #[error("rpc error: {0}")]
    Rpc(String),

    /// A record larger than the configured limit
    #[error("record of {size} bytes exceeds the limit of {limit} bytes")]
    RecordTooLarge {
        /// Size the record would reach
        size: usize,

        /// The configured limit
        limit: usize,
    },

    /// The configuration document could not be parsed
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_yaml::Error),

    /// Seeding the tree failed
    #[error("file system error: {0}")]
    Fs(#[from] memfs::FsError),
}
