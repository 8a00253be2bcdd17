//! `memnfs` serves an in-memory file system to NFSv4.0 clients over TCP.
//!
//! Requests arrive as ONC RPC records, are decoded into COMPOUND operations and run by the
//! [`Dispatcher`] against a shared [`memfs::MemFs`]. Each connection is a session whose open state
//! is released when it closes.

#![warn(missing_docs)]

pub mod cli;
pub mod codec;
pub mod config;
pub mod defaults;
pub mod dispatch;
mod error;
pub mod nfs;
pub mod rpc;
pub mod server;
pub mod state;
pub mod xdr;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use config::{SeedNode, ServerConfig};
pub use dispatch::Dispatcher;
pub use error::*;
pub use server::NfsServer;
