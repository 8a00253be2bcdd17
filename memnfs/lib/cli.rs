//! Command line of the `memnfs` binary.

use std::path::PathBuf;

use clap::Parser;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// memnfs serves an in-memory file system over NFSv4.0
#[derive(Debug, Parser)]
#[command(name = "memnfs", author, version)]
pub struct MemnfsArgs {
    /// Path to the YAML startup configuration
    pub config: PathBuf,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(long)]
    pub debug: bool,
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
