//! `memfs` is an in-memory inode store addressed through stable file handles.
//!
//! The tree lives in an arena of inodes indexed by identity. Each inode carries its own lock, so
//! unrelated operations never contend, and directories refer to children by identity only.
//! On top of the store sit a handle registry that maps opaque handles to identities, an attribute
//! engine, and a controller that keeps the books on unstable writes.

#![warn(missing_docs)]
#![allow(clippy::module_inception)]

mod attributes;
pub mod defaults;
mod error;
mod filesystem;
mod handle;
mod inode;
mod metadata;
mod segment;
mod stability;
mod store;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use attributes::*;
pub use error::*;
pub use filesystem::*;
pub use handle::*;
pub use inode::*;
pub use metadata::*;
pub use segment::*;
pub use stability::*;
pub use store::*;
