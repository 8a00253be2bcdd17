use std::{
    collections::HashMap,
    fmt::{self, Debug, Display},
    sync::RwLock,
};

use getset::CopyGetters;

use crate::{FsError, FsResult, InodeId};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The length of every handle issued by the registry.
pub const FILE_HANDLE_LEN: usize = 16;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// An opaque token naming an inode: the registry generation followed by the inode identity,
/// both big-endian.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileHandle([u8; FILE_HANDLE_LEN]);

/// Issues handles for inodes and resolves them back.
///
/// The registry is guarded by its own lock and never touches the inode store, so resolving a
/// handle does not contend with tree mutations.
#[derive(Debug, CopyGetters)]
pub struct HandleRegistry {
    /// Generation stamped into every handle, unique to this server instance
    #[getset(get_copy = "pub with_prefix")]
    generation: u64,

    /// Handle of the root directory
    #[getset(get_copy = "pub with_prefix")]
    root: FileHandle,

    table: RwLock<HandleTable>,
}

#[derive(Debug, Default)]
struct HandleTable {
    by_handle: HashMap<FileHandle, InodeId>,
    by_inode: HashMap<InodeId, FileHandle>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl FileHandle {
    fn new(generation: u64, id: InodeId) -> Self {
        let mut bytes = [0; FILE_HANDLE_LEN];
        bytes[..8].copy_from_slice(&generation.to_be_bytes());
        bytes[8..].copy_from_slice(&id.as_u64().to_be_bytes());
        Self(bytes)
    }

    /// Parses handle bytes received from a client.
    ///
    /// ## Errors
    ///
    /// * `FsError::BadHandle` - If the bytes do not have the length of an issued handle
    pub fn from_bytes(bytes: &[u8]) -> FsResult<Self> {
        let bytes: [u8; FILE_HANDLE_LEN] = bytes
            .try_into()
            .map_err(|_| FsError::BadHandle(bytes.len()))?;
        Ok(Self(bytes))
    }

    /// Returns the raw bytes of the handle.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns the generation the handle was issued under.
    pub fn generation(&self) -> u64 {
        let mut bytes = [0; 8];
        bytes.copy_from_slice(&self.0[..8]);
        u64::from_be_bytes(bytes)
    }

    fn inode_bits(&self) -> u64 {
        let mut bytes = [0; 8];
        bytes.copy_from_slice(&self.0[8..]);
        u64::from_be_bytes(bytes)
    }
}

impl HandleRegistry {
    /// Creates a registry for the given generation and issues the root handle.
    pub fn new(generation: u64, root: InodeId) -> Self {
        let root_handle = FileHandle::new(generation, root);
        let mut table = HandleTable::default();
        table.by_handle.insert(root_handle, root);
        table.by_inode.insert(root, root_handle);

        Self {
            generation,
            root: root_handle,
            table: RwLock::new(table),
        }
    }

    /// Returns the handle of an inode, issuing one on first use.
    ///
    /// Issuing is idempotent: a live inode always gets the same handle back.
    pub fn issue(&self, id: InodeId) -> FsResult<FileHandle> {
        if let Some(handle) = self.read_table()?.by_inode.get(&id) {
            return Ok(*handle);
        }

        let mut table = self
            .table
            .write()
            .map_err(|_| FsError::LockPoisoned("handle table"))?;
        let handle = *table
            .by_inode
            .entry(id)
            .or_insert_with(|| FileHandle::new(self.generation, id));
        table.by_handle.insert(handle, id);
        Ok(handle)
    }

    /// Resolves a handle to the inode it names.
    ///
    /// ## Errors
    ///
    /// * `FsError::StaleHandle` - If the handle is from another generation or its inode was
    ///   invalidated
    pub fn resolve(&self, handle: &FileHandle) -> FsResult<InodeId> {
        let stale = || FsError::StaleHandle(InodeId::from_u64(handle.inode_bits()));
        if handle.generation() != self.generation {
            return Err(stale());
        }

        self.read_table()?
            .by_handle
            .get(handle)
            .copied()
            .ok_or_else(stale)
    }

    /// Forgets the handle of a removed inode. Later resolutions fail with `StaleHandle`.
    pub fn invalidate(&self, id: InodeId) -> FsResult<()> {
        let mut table = self
            .table
            .write()
            .map_err(|_| FsError::LockPoisoned("handle table"))?;
        if let Some(handle) = table.by_inode.remove(&id) {
            table.by_handle.remove(&handle);
        }
        Ok(())
    }

    /// Returns the number of live handles.
    pub fn len(&self) -> usize {
        self.read_table().map(|t| t.by_handle.len()).unwrap_or(0)
    }

    /// Returns `true` if no handle is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read_table(&self) -> FsResult<std::sync::RwLockReadGuard<'_, HandleTable>> {
        self.table
            .read()
            .map_err(|_| FsError::LockPoisoned("handle table"))
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Debug for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileHandle({})", hex::encode(self.0))
    }
}

impl Display for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_registry_root_is_issued() {
        let registry = HandleRegistry::new(7, InodeId::ROOT);
        let root = registry.get_root();
        assert_eq!(registry.resolve(&root).unwrap(), InodeId::ROOT);
        assert_eq!(registry.issue(InodeId::ROOT).unwrap(), root);
        assert_eq!(root.generation(), 7);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_handle_registry_issue_is_idempotent() {
        let registry = HandleRegistry::new(7, InodeId::ROOT);
        let id = InodeId::from_u64(42);

        let first = registry.issue(id).unwrap();
        let second = registry.issue(id).unwrap();
        assert_eq!(first, second);
        assert_eq!(registry.resolve(&first).unwrap(), id);
    }

    #[test]
    fn test_handle_registry_invalidate_makes_stale() {
        let registry = HandleRegistry::new(7, InodeId::ROOT);
        let id = InodeId::from_u64(42);
        let handle = registry.issue(id).unwrap();

        registry.invalidate(id).unwrap();
        assert_eq!(registry.resolve(&handle), Err(FsError::StaleHandle(id)));
    }

    #[test]
    fn test_handle_registry_rejects_foreign_generation() {
        let old = HandleRegistry::new(1, InodeId::ROOT);
        let new = HandleRegistry::new(2, InodeId::ROOT);

        assert!(matches!(
            new.resolve(&old.get_root()),
            Err(FsError::StaleHandle(_))
        ));
    }

    #[test]
    fn test_handle_from_bytes() {
        let registry = HandleRegistry::new(7, InodeId::ROOT);
        let root = registry.get_root();

        let parsed = FileHandle::from_bytes(root.as_bytes()).unwrap();
        assert_eq!(parsed, root);

        assert_eq!(FileHandle::from_bytes(&[1, 2, 3]), Err(FsError::BadHandle(3)));
        assert_eq!(FileHandle::from_bytes(&[]), Err(FsError::BadHandle(0)));
    }
}
