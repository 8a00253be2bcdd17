use std::sync::Arc;

use chrono::Utc;
use getset::Getters;

use crate::{
    Attributes, DirChange, Entry, FileHandle, FsError, FsResult, HandleRegistry, InodeId,
    InodeStore, LockPolicy, StabilityController, StableHow, WriteOutcome, WriteVerifier,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// An in-memory file system addressed by file handles.
///
/// Combines the inode store, the handle registry and the stability controller. Cloning is cheap
/// and every clone shares the same tree, so one instance can be handed to every connection.
#[derive(Debug, Clone, Getters)]
#[getset(get = "pub with_prefix")]
pub struct MemFs {
    /// The inode arena
    store: Arc<InodeStore>,

    /// Handles issued for the inodes
    registry: Arc<HandleRegistry>,

    /// Bookkeeping of unstable writes
    stability: Arc<StabilityController>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl MemFs {
    /// Creates a file system holding an empty root directory.
    ///
    /// The handle generation and the write verifier both derive from the current time, so they
    /// differ between server instances.
    pub fn new() -> Self {
        Self::with_store(InodeStore::new())
    }

    /// Creates a file system whose inode locks use the given bounds.
    pub fn with_lock_policy(lock_policy: LockPolicy) -> Self {
        Self::with_store(InodeStore::with_lock_policy(lock_policy))
    }

    fn with_store(store: InodeStore) -> Self {
        let epoch = Utc::now()
            .timestamp_nanos_opt()
            .map(|nanos| nanos as u64)
            .unwrap_or_default();

        Self {
            registry: Arc::new(HandleRegistry::new(epoch, store.get_root())),
            stability: Arc::new(StabilityController::new(epoch.to_be_bytes())),
            store: Arc::new(store),
        }
    }

    /// Returns the handle of the root directory.
    pub fn root_handle(&self) -> FileHandle {
        self.registry.get_root()
    }

    /// Resolves a handle to a live inode.
    ///
    /// ## Errors
    ///
    /// * `FsError::StaleHandle` - If the handle is foreign or its inode was removed
    pub fn resolve(&self, handle: &FileHandle) -> FsResult<InodeId> {
        let id = self.registry.resolve(handle)?;
        self.store.get(id)?;
        Ok(id)
    }

    /// Returns the handle of an inode, issuing one if needed.
    ///
    /// ## Errors
    ///
    /// * `FsError::StaleHandle` - If the inode is no longer in the store
    pub fn handle_for(&self, id: InodeId) -> FsResult<FileHandle> {
        if !self.store.contains(id) {
            return Err(FsError::StaleHandle(id));
        }

        let handle = self.registry.issue(id)?;

        // A removal racing the issue may have invalidated before the insert.
        if !self.store.contains(id) {
            self.registry.invalidate(id)?;
            return Err(FsError::StaleHandle(id));
        }

        Ok(handle)
    }

    /// Creates a directory and returns its handle.
    pub async fn create_directory(&self, parent: &FileHandle, name: &str) -> FsResult<FileHandle> {
        let parent = self.resolve(parent)?;
        let (id, _) = self.store.create_directory(parent, name).await?;
        self.registry.issue(id)
    }

    /// Creates an empty file and returns its handle.
    pub async fn create_file(&self, parent: &FileHandle, name: &str) -> FsResult<FileHandle> {
        let parent = self.resolve(parent)?;
        let (id, _) = self.store.create_file(parent, name).await?;
        self.registry.issue(id)
    }

    /// Looks up a name in a directory and returns the handle of the child.
    pub async fn lookup(&self, parent: &FileHandle, name: &str) -> FsResult<FileHandle> {
        let parent = self.resolve(parent)?;
        let id = self.store.lookup(parent, name).await?;
        self.registry.issue(id)
    }

    /// Lists a directory ordered by name.
    pub async fn list(&self, dir: &FileHandle) -> FsResult<Vec<Entry>> {
        self.store.list(self.resolve(dir)?).await
    }

    /// Removes a name from a directory.
    pub async fn remove(&self, parent: &FileHandle, name: &str) -> FsResult<()> {
        self.remove_entry(self.resolve(parent)?, name).await?;
        Ok(())
    }

    /// Removes a name from a directory by identity.
    ///
    /// The removed inode's handle is invalidated and its unstable-write bookkeeping dropped.
    pub async fn remove_entry(&self, parent: InodeId, name: &str) -> FsResult<(InodeId, DirChange)> {
        let (id, change) = self.store.remove(parent, name).await?;
        self.registry.invalidate(id)?;
        self.stability.forget(id);
        Ok((id, change))
    }

    /// Reads up to `length` bytes of a file starting at `offset`.
    pub async fn read(&self, file: &FileHandle, offset: u64, length: usize) -> FsResult<Vec<u8>> {
        let (data, _) = self.store.read(self.resolve(file)?, offset, length).await?;
        Ok(data)
    }

    /// Writes bytes to a file with full stability.
    pub async fn write(&self, file: &FileHandle, offset: u64, data: &[u8]) -> FsResult<usize> {
        let outcome = self
            .perform_write(self.resolve(file)?, offset, data, StableHow::FileSync)
            .await?;
        Ok(outcome.get_count())
    }

    /// Writes bytes to a file, reporting the requested stability.
    pub async fn perform_write(
        &self,
        file: InodeId,
        offset: u64,
        data: &[u8],
        requested: StableHow,
    ) -> FsResult<WriteOutcome> {
        self.stability
            .perform_write(&self.store, file, offset, data, requested)
            .await
    }

    /// Commits earlier unstable writes to a file.
    pub fn commit(&self, file: InodeId, offset: u64, count: u32) -> FsResult<WriteVerifier> {
        self.stability.commit(&self.store, file, offset, count)
    }

    /// Computes the attributes of the inode behind a handle.
    pub async fn attributes_of(&self, handle: &FileHandle) -> FsResult<Attributes> {
        self.store.attributes_of(self.resolve(handle)?).await
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Default for MemFs {
    fn default() -> Self {
        Self::new()
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
