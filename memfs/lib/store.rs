use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, RwLock,
    },
};

use getset::CopyGetters;

use crate::{
    defaults::{DEFAULT_LOCK_RETRIES, DEFAULT_LOCK_TIMEOUT},
    Entry, FsError, FsResult, Inode, InodeId, InodeKind, LockPolicy, PathSegment,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The arena that owns every inode of the tree.
///
/// Directories refer to children by identity, so the arena map is the only owner of an inode.
/// The map itself is guarded by a briefly held lock; the content of each inode is guarded by the
/// inode's own lock. Structural mutations lock the parent directory before the child and no other
/// nesting ever happens, which keeps the store free of lock-order cycles.
#[derive(Debug, CopyGetters)]
pub struct InodeStore {
    inodes: RwLock<HashMap<InodeId, Arc<Inode>>>,
    next_id: AtomicU64,
    bytes_used: AtomicU64,

    /// Identity of the root directory
    #[getset(get_copy = "pub with_prefix")]
    root: InodeId,

    /// Bounds on inode lock waits
    #[getset(get_copy = "pub with_prefix")]
    lock_policy: LockPolicy,
}

/// Change counters of a directory sampled under its lock, before and after a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, CopyGetters)]
#[getset(get_copy = "pub with_prefix")]
pub struct DirChange {
    /// Change counter before the mutation
    before: u64,

    /// Change counter after the mutation
    after: u64,
}

/// How a file is created when opening by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateMode {
    /// Reuse an existing file with the same name
    Unchecked,

    /// Fail if the name exists
    Guarded,

    /// Fail if the name exists, unless it is a file created with the same verifier
    Exclusive([u8; 8]),
}

/// The outcome of [`InodeStore::open_or_create_file`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, CopyGetters)]
#[getset(get_copy = "pub with_prefix")]
pub struct OpenedFile {
    /// Identity of the file
    id: InodeId,

    /// Change of the parent directory
    change: DirChange,

    /// Whether the file was created by this call
    created: bool,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl InodeStore {
    /// Creates a store holding only an empty root directory.
    pub fn new() -> Self {
        Self::with_lock_policy(LockPolicy {
            timeout: DEFAULT_LOCK_TIMEOUT,
            retries: DEFAULT_LOCK_RETRIES,
        })
    }

    /// Creates a store holding only an empty root directory, with the given lock bounds.
    pub fn with_lock_policy(lock_policy: LockPolicy) -> Self {
        let root = InodeId::ROOT;
        let mut inodes = HashMap::new();
        inodes.insert(
            root,
            Arc::new(Inode::new(root, InodeKind::Directory, None)),
        );

        Self {
            inodes: RwLock::new(inodes),
            next_id: AtomicU64::new(root.as_u64() + 1),
            bytes_used: AtomicU64::new(0),
            root,
            lock_policy,
        }
    }

    /// Returns the inode with the given identity.
    ///
    /// ## Errors
    ///
    /// * `FsError::StaleHandle` - If the inode no longer exists
    pub fn get(&self, id: InodeId) -> FsResult<Arc<Inode>> {
        self.inodes
            .read()
            .map_err(|_| FsError::LockPoisoned("inode table"))?
            .get(&id)
            .cloned()
            .ok_or(FsError::StaleHandle(id))
    }

    /// Returns `true` if the inode exists.
    pub fn contains(&self, id: InodeId) -> bool {
        self.inodes
            .read()
            .map(|inodes| inodes.contains_key(&id))
            .unwrap_or(false)
    }

    /// Returns the number of live inodes.
    pub fn inode_count(&self) -> u64 {
        self.inodes
            .read()
            .map(|inodes| inodes.len() as u64)
            .unwrap_or(0)
    }

    /// Returns the total number of content bytes held by all files.
    pub fn bytes_used(&self) -> u64 {
        self.bytes_used.load(Ordering::Relaxed)
    }

    /// Creates a directory named `name` in `parent`.
    ///
    /// ## Errors
    ///
    /// * `FsError::AlreadyExists` - If the name is taken
    /// * `FsError::NotADirectory` - If `parent` is a file
    /// * `FsError::StaleHandle` - If `parent` no longer exists
    pub async fn create_directory(
        &self,
        parent: InodeId,
        name: &str,
    ) -> FsResult<(InodeId, DirChange)> {
        self.create(parent, name, InodeKind::Directory).await
    }

    /// Creates an empty file named `name` in `parent`. An existing name is never overwritten.
    ///
    /// ## Errors
    ///
    /// * `FsError::AlreadyExists` - If the name is taken
    /// * `FsError::NotADirectory` - If `parent` is a file
    /// * `FsError::StaleHandle` - If `parent` no longer exists
    pub async fn create_file(&self, parent: InodeId, name: &str) -> FsResult<(InodeId, DirChange)> {
        self.create(parent, name, InodeKind::File).await
    }

    /// Creates an empty file recording an exclusive-create verifier.
    ///
    /// Retrying the create with the same verifier finds the file it created and succeeds again.
    pub async fn create_file_exclusive(
        &self,
        parent: InodeId,
        name: &str,
        verifier: [u8; 8],
    ) -> FsResult<OpenedFile> {
        self.open_or_create_file(parent, name, CreateMode::Exclusive(verifier))
            .await
    }

    /// Resolves `name` in `parent` to a file, creating it according to `mode`.
    ///
    /// ## Errors
    ///
    /// * `FsError::AlreadyExists` - If the mode forbids reusing the existing name
    /// * `FsError::IsADirectory` - If the name refers to a directory
    pub async fn open_or_create_file(
        &self,
        parent: InodeId,
        name: &str,
        mode: CreateMode,
    ) -> FsResult<OpenedFile> {
        let name = PathSegment::try_from(name)?;
        let parent_inode = self.get(parent)?;
        let mut state = parent_inode.write(self.lock_policy).await?;
        if state.is_unlinked() {
            return Err(FsError::StaleHandle(parent));
        }

        let (dir, metadata) = state.as_mut_dir(parent)?;
        let unchanged = DirChange {
            before: metadata.get_change(),
            after: metadata.get_change(),
        };

        if let Some(existing) = dir.get(name.as_str()).copied() {
            if existing.get_kind() == InodeKind::Directory {
                return match mode {
                    CreateMode::Unchecked => Err(FsError::IsADirectory(existing.get_id())),
                    _ => Err(FsError::AlreadyExists(name.into())),
                };
            }

            let reusable = match mode {
                CreateMode::Unchecked => true,
                CreateMode::Guarded => false,
                CreateMode::Exclusive(verifier) => {
                    let child = self.get(existing.get_id())?;
                    let child_state = child.read(self.lock_policy).await?;
                    child_state.as_file(existing.get_id())?.get_verifier() == Some(verifier)
                }
            };

            return if reusable {
                Ok(OpenedFile {
                    id: existing.get_id(),
                    change: unchanged,
                    created: false,
                })
            } else {
                Err(FsError::AlreadyExists(name.into()))
            };
        }

        let id = self.allocate(parent, InodeKind::File)?;
        if let CreateMode::Exclusive(verifier) = mode {
            let child = self.get(id)?;
            let mut child_state = child.write(self.lock_policy).await?;
            if let Ok((file, _)) = child_state.as_mut_file(id) {
                file.set_verifier(verifier);
            }
        }

        dir.put(name, id, InodeKind::File)?;
        metadata.touch_modified();

        Ok(OpenedFile {
            id,
            change: DirChange {
                before: unchanged.before,
                after: metadata.get_change(),
            },
            created: true,
        })
    }

    async fn create(
        &self,
        parent: InodeId,
        name: &str,
        kind: InodeKind,
    ) -> FsResult<(InodeId, DirChange)> {
        let name = PathSegment::try_from(name)?;
        let parent_inode = self.get(parent)?;
        let mut state = parent_inode.write(self.lock_policy).await?;
        if state.is_unlinked() {
            return Err(FsError::StaleHandle(parent));
        }

        let (dir, metadata) = state.as_mut_dir(parent)?;
        if dir.get(name.as_str()).is_some() {
            return Err(FsError::AlreadyExists(name.into()));
        }

        let before = metadata.get_change();
        let id = self.allocate(parent, kind)?;
        dir.put(name, id, kind)?;
        metadata.touch_modified();

        tracing::trace!(%parent, %id, ?kind, "created inode");
        Ok((
            id,
            DirChange {
                before,
                after: metadata.get_change(),
            },
        ))
    }

    /// Registers a fresh inode in the arena. The caller holds the parent's write lock.
    fn allocate(&self, parent: InodeId, kind: InodeKind) -> FsResult<InodeId> {
        let id = InodeId::from_u64(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.inodes
            .write()
            .map_err(|_| FsError::LockPoisoned("inode table"))?
            .insert(id, Arc::new(Inode::new(id, kind, Some(parent))));
        Ok(id)
    }

    /// Removes the entry `name` from `parent`. Directories must be empty.
    ///
    /// ## Returns
    ///
    /// The identity of the removed inode and the change of the parent directory.
    ///
    /// ## Errors
    ///
    /// * `FsError::NotFound` - If the name does not exist
    /// * `FsError::NotEmpty` - If the name refers to a non-empty directory
    pub async fn remove(&self, parent: InodeId, name: &str) -> FsResult<(InodeId, DirChange)> {
        let name = PathSegment::try_from(name)?;
        let parent_inode = self.get(parent)?;
        let mut state = parent_inode.write(self.lock_policy).await?;
        let (dir, metadata) = state.as_mut_dir(parent)?;

        let entry = dir
            .get(name.as_str())
            .copied()
            .ok_or_else(|| FsError::NotFound(name.to_string()))?;

        let child = self.get(entry.get_id())?;
        let mut child_state = child.write(self.lock_policy).await?;
        if let Ok(child_dir) = child_state.as_dir(entry.get_id()) {
            if !child_dir.is_empty() {
                return Err(FsError::NotEmpty(name.to_string()));
            }
        }

        let freed = child_state
            .as_file(entry.get_id())
            .map(|file| file.len())
            .unwrap_or(0);
        child_state.mark_unlinked();
        drop(child_state);

        let before = metadata.get_change();
        dir.remove(name.as_str());
        metadata.touch_modified();

        self.inodes
            .write()
            .map_err(|_| FsError::LockPoisoned("inode table"))?
            .remove(&entry.get_id());
        self.bytes_used.fetch_sub(freed, Ordering::Relaxed);

        tracing::trace!(%parent, id = %entry.get_id(), "removed inode");
        Ok((
            entry.get_id(),
            DirChange {
                before,
                after: metadata.get_change(),
            },
        ))
    }

    /// Resolves `name` in the directory `parent`.
    ///
    /// ## Errors
    ///
    /// * `FsError::NotFound` - If the name does not exist
    /// * `FsError::NotADirectory` - If `parent` is a file
    pub async fn lookup(&self, parent: InodeId, name: &str) -> FsResult<InodeId> {
        let name = PathSegment::try_from(name)?;
        let parent_inode = self.get(parent)?;
        let state = parent_inode.read(self.lock_policy).await?;
        state
            .as_dir(parent)?
            .get(name.as_str())
            .map(|entry| entry.get_id())
            .ok_or_else(|| FsError::NotFound(name.into()))
    }

    /// Returns the parent of a directory.
    ///
    /// ## Errors
    ///
    /// * `FsError::NotFound` - If `id` is the root
    /// * `FsError::NotADirectory` - If `id` is a file
    pub fn parent(&self, id: InodeId) -> FsResult<InodeId> {
        let inode = self.get(id)?;
        if inode.get_kind() != InodeKind::Directory {
            return Err(FsError::NotADirectory(id));
        }

        inode
            .get_parent()
            .ok_or_else(|| FsError::NotFound("..".to_string()))
    }

    /// Lists the entries of a directory ordered by name.
    pub async fn list(&self, dir: InodeId) -> FsResult<Vec<Entry>> {
        let inode = self.get(dir)?;
        let state = inode.read(self.lock_policy).await?;
        Ok(state.as_dir(dir)?.list())
    }

    /// Lists the entries of a directory created after the entry with the given cookie.
    ///
    /// ## Errors
    ///
    /// * `FsError::BadCookie` - If the directory never issued `cookie`
    pub async fn entries_after(&self, dir: InodeId, cookie: u64) -> FsResult<Vec<Entry>> {
        let inode = self.get(dir)?;
        let state = inode.read(self.lock_policy).await?;
        let directory = state.as_dir(dir)?;
        if !directory.is_valid_cookie(cookie) {
            return Err(FsError::BadCookie { id: dir, cookie });
        }

        Ok(directory.entries_after(cookie))
    }

    /// Reads up to `length` bytes from a file starting at `offset`.
    ///
    /// ## Returns
    ///
    /// The bytes read, short only at the end of the file, and whether the end was reached.
    pub async fn read(&self, file: InodeId, offset: u64, length: usize) -> FsResult<(Vec<u8>, bool)> {
        let inode = self.get(file)?;
        let state = inode.read(self.lock_policy).await?;
        let result = state.as_file(file)?.read(offset, length);
        inode.get_accessed_at().touch();
        Ok(result)
    }

    /// Writes `data` at `offset`, extending the file and zero-filling any gap.
    ///
    /// The whole range is written under the file's exclusive lock.
    ///
    /// ## Returns
    ///
    /// The number of bytes written, always `data.len()`.
    pub async fn write(&self, file: InodeId, offset: u64, data: &[u8]) -> FsResult<usize> {
        let inode = self.get(file)?;
        let mut state = inode.write(self.lock_policy).await?;
        if state.is_unlinked() {
            return Err(FsError::StaleHandle(file));
        }

        let (content, metadata) = state.as_mut_file(file)?;
        let old_len = content.len();
        let written = content.write(file, offset, data)?;
        let new_len = content.len();

        metadata.set_size(new_len);
        metadata.touch_modified();
        self.bytes_used.fetch_add(new_len - old_len, Ordering::Relaxed);

        Ok(written)
    }

    /// Sets the size of a file, truncating or zero-extending its content.
    ///
    /// ## Errors
    ///
    /// * `FsError::StaleHandle` - If the file was removed
    /// * `FsError::InvalidOffset` - If `size` is past
    ///   [`MAX_FILE_SIZE`](crate::defaults::MAX_FILE_SIZE)
    pub async fn truncate(&self, file: InodeId, size: u64) -> FsResult<()> {
        let inode = self.get(file)?;
        let mut state = inode.write(self.lock_policy).await?;
        if state.is_unlinked() {
            return Err(FsError::StaleHandle(file));
        }

        let (content, metadata) = state.as_mut_file(file)?;
        self.resize(file, content, metadata, size)
    }

    pub(crate) fn resize(
        &self,
        file: InodeId,
        content: &mut crate::File,
        metadata: &mut crate::Metadata,
        size: u64,
    ) -> FsResult<()> {
        let old_len = content.len();
        content.truncate(file, size)?;

        if size >= old_len {
            self.bytes_used.fetch_add(size - old_len, Ordering::Relaxed);
        } else {
            self.bytes_used.fetch_sub(old_len - size, Ordering::Relaxed);
        }

        metadata.set_size(size);
        metadata.touch_modified();
        Ok(())
    }

    /// Fails unless `id` is a live file.
    pub fn ensure_file(&self, id: InodeId) -> FsResult<()> {
        match self.get(id)?.get_kind() {
            InodeKind::File => Ok(()),
            InodeKind::Directory => Err(FsError::IsADirectory(id)),
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Default for InodeStore {
    fn default() -> Self {
        Self::new()
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::{collections::HashSet, time::Duration};

    use super::*;
    use crate::SetAttributes;

    #[tokio::test]
    async fn test_store_create_file_then_lookup() {
        let store = InodeStore::new();
        let root = store.get_root();

        let (id, change) = store.create_file(root, "test.txt").await.unwrap();
        assert_eq!(store.lookup(root, "test.txt").await.unwrap(), id);
        assert!(change.get_after() > change.get_before());

        let inode = store.get(id).unwrap();
        assert_eq!(inode.get_kind(), InodeKind::File);
        assert_eq!(inode.get_parent(), Some(root));
        let state = inode.read(store.get_lock_policy()).await.unwrap();
        assert_eq!(state.get_metadata().get_size(), 0);
    }

    #[tokio::test]
    async fn test_store_create_never_overwrites() {
        let store = InodeStore::new();
        let root = store.get_root();

        let (id, _) = store.create_file(root, "a").await.unwrap();
        store.write(id, 0, b"keep").await.unwrap();

        assert!(matches!(
            store.create_file(root, "a").await,
            Err(FsError::AlreadyExists(_))
        ));
        assert!(matches!(
            store.create_directory(root, "a").await,
            Err(FsError::AlreadyExists(_))
        ));

        let (data, _) = store.read(id, 0, 10).await.unwrap();
        assert_eq!(data, b"keep");
    }

    #[tokio::test]
    async fn test_store_create_in_file_or_missing_parent() {
        let store = InodeStore::new();
        let root = store.get_root();
        let (file, _) = store.create_file(root, "f").await.unwrap();

        assert!(matches!(
            store.create_file(file, "x").await,
            Err(FsError::NotADirectory(id)) if id == file
        ));
        assert!(matches!(
            store.create_directory(InodeId::from_u64(999), "x").await,
            Err(FsError::StaleHandle(_))
        ));
        for invalid in ["", ".", "..", "a/b"] {
            assert!(store.create_file(root, invalid).await.is_err());
        }
    }

    #[tokio::test]
    async fn test_store_identities_are_never_reused() {
        let store = InodeStore::new();
        let root = store.get_root();

        let (first, _) = store.create_file(root, "a").await.unwrap();
        store.remove(root, "a").await.unwrap();
        let (second, _) = store.create_file(root, "a").await.unwrap();

        assert_ne!(first, second);
        assert!(matches!(store.get(first), Err(FsError::StaleHandle(_))));
    }

    #[tokio::test]
    async fn test_store_remove() {
        let store = InodeStore::new();
        let root = store.get_root();

        let (dir, _) = store.create_directory(root, "dir").await.unwrap();
        store.create_file(dir, "inner").await.unwrap();

        assert!(matches!(
            store.remove(root, "dir").await,
            Err(FsError::NotEmpty(_))
        ));

        store.remove(dir, "inner").await.unwrap();
        let (removed, _) = store.remove(root, "dir").await.unwrap();
        assert_eq!(removed, dir);
        assert!(store.list(root).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_store_remove_missing_leaves_entries_unchanged() {
        let store = InodeStore::new();
        let root = store.get_root();
        store.create_file(root, "kept").await.unwrap();

        assert!(matches!(
            store.remove(root, "missing").await,
            Err(FsError::NotFound(name)) if name == "missing"
        ));

        let names: Vec<String> = store
            .list(root)
            .await
            .unwrap()
            .iter()
            .map(|e| e.get_name().to_string())
            .collect();
        assert_eq!(names, vec!["kept"]);
    }

    #[tokio::test]
    async fn test_store_create_in_removed_directory_is_stale() {
        let store = InodeStore::new();
        let root = store.get_root();
        let (dir, _) = store.create_directory(root, "gone").await.unwrap();
        store.remove(root, "gone").await.unwrap();

        assert!(matches!(
            store.create_file(dir, "orphan").await,
            Err(FsError::StaleHandle(_))
        ));
    }

    #[tokio::test]
    async fn test_store_parent() {
        let store = InodeStore::new();
        let root = store.get_root();
        let (dir, _) = store.create_directory(root, "d").await.unwrap();
        let (file, _) = store.create_file(dir, "f").await.unwrap();

        assert_eq!(store.parent(dir).unwrap(), root);
        assert!(matches!(store.parent(root), Err(FsError::NotFound(_))));
        assert!(matches!(store.parent(file), Err(FsError::NotADirectory(_))));
    }

    #[tokio::test]
    async fn test_store_write_then_read_large_file() {
        let store = InodeStore::new();
        let root = store.get_root();
        let (dir, _) = store.create_directory(root, "big").await.unwrap();
        let (file, _) = store.create_file(dir, "data").await.unwrap();

        let data: Vec<u8> = (0..10_000_000u32).map(|i| (i % 251) as u8).collect();
        assert_eq!(store.write(file, 0, &data).await.unwrap(), 10_000_000);

        let state = store.get(file).unwrap();
        let size = state
            .read(store.get_lock_policy())
            .await
            .unwrap()
            .get_metadata()
            .get_size();
        assert_eq!(size, 10_000_000);
        assert_eq!(size / 1_048_576, 9);

        let (read, eof) = store.read(file, 0, 10_000_000).await.unwrap();
        assert!(eof);
        assert!(read == data);
        assert_eq!(store.bytes_used(), 10_000_000);
    }

    #[tokio::test]
    async fn test_store_write_to_directory_fails() {
        let store = InodeStore::new();
        let root = store.get_root();
        assert!(matches!(
            store.write(root, 0, b"x").await,
            Err(FsError::IsADirectory(_))
        ));
        assert!(matches!(
            store.read(root, 0, 1).await,
            Err(FsError::IsADirectory(_))
        ));
    }

    #[tokio::test]
    async fn test_store_truncate_tracks_bytes_used() {
        let store = InodeStore::new();
        let root = store.get_root();
        let (file, _) = store.create_file(root, "f").await.unwrap();

        store.write(file, 0, b"Hello world").await.unwrap();
        store.truncate(file, 5).await.unwrap();
        assert_eq!(store.bytes_used(), 5);

        let (data, eof) = store.read(file, 0, 100).await.unwrap();
        assert_eq!(data, b"Hello");
        assert!(eof);

        store.remove(root, "f").await.unwrap();
        assert_eq!(store.bytes_used(), 0);
    }

    #[tokio::test]
    async fn test_store_rejects_sizes_past_the_limit() {
        let store = InodeStore::new();
        let root = store.get_root();
        let (file, _) = store.create_file(root, "f").await.unwrap();
        store.write(file, 0, b"Hello").await.unwrap();

        assert!(matches!(
            store.write(file, i64::MAX as u64, b"x").await,
            Err(FsError::InvalidOffset { .. })
        ));
        assert!(matches!(
            store.truncate(file, i64::MAX as u64).await,
            Err(FsError::InvalidOffset { .. })
        ));
        assert!(matches!(
            store
                .set_attributes(
                    file,
                    &SetAttributes {
                        size: Some(crate::defaults::MAX_FILE_SIZE + 1),
                        ..Default::default()
                    },
                )
                .await,
            Err(FsError::InvalidOffset { .. })
        ));

        assert_eq!(store.bytes_used(), 5);
        let (data, _) = store.read(file, 0, 100).await.unwrap();
        assert_eq!(data, b"Hello");
    }

    #[tokio::test]
    async fn test_store_resize_of_unlinked_file_is_stale() {
        let store = InodeStore::new();
        let root = store.get_root();
        let (file, _) = store.create_file(root, "f").await.unwrap();
        store.write(file, 0, b"Hello").await.unwrap();

        // A resize that lost the race against a remove finds the inode already unlinked.
        let inode = store.get(file).unwrap();
        inode
            .write(store.get_lock_policy())
            .await
            .unwrap()
            .mark_unlinked();

        assert!(matches!(
            store.truncate(file, 100).await,
            Err(FsError::StaleHandle(id)) if id == file
        ));
        assert!(matches!(
            store
                .set_attributes(
                    file,
                    &SetAttributes {
                        size: Some(100),
                        ..Default::default()
                    },
                )
                .await,
            Err(FsError::StaleHandle(id)) if id == file
        ));
        assert_eq!(store.bytes_used(), 5);
    }

    #[tokio::test]
    async fn test_store_open_or_create_modes() {
        let store = InodeStore::new();
        let root = store.get_root();

        let opened = store
            .open_or_create_file(root, "f", CreateMode::Unchecked)
            .await
            .unwrap();
        assert!(opened.get_created());

        let again = store
            .open_or_create_file(root, "f", CreateMode::Unchecked)
            .await
            .unwrap();
        assert!(!again.get_created());
        assert_eq!(again.get_id(), opened.get_id());

        assert!(matches!(
            store.open_or_create_file(root, "f", CreateMode::Guarded).await,
            Err(FsError::AlreadyExists(_))
        ));

        store.create_directory(root, "d").await.unwrap();
        assert!(matches!(
            store.open_or_create_file(root, "d", CreateMode::Unchecked).await,
            Err(FsError::IsADirectory(_))
        ));
    }

    #[tokio::test]
    async fn test_store_exclusive_create_replay() {
        let store = InodeStore::new();
        let root = store.get_root();

        let first = store
            .create_file_exclusive(root, "x", *b"verifier")
            .await
            .unwrap();
        assert!(first.get_created());

        let replay = store
            .create_file_exclusive(root, "x", *b"verifier")
            .await
            .unwrap();
        assert!(!replay.get_created());
        assert_eq!(replay.get_id(), first.get_id());

        assert!(matches!(
            store.create_file_exclusive(root, "x", *b"other!!!").await,
            Err(FsError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn test_store_entries_after_rejects_unknown_cookies() {
        let store = InodeStore::new();
        let root = store.get_root();
        store.create_file(root, "a").await.unwrap();

        assert_eq!(store.entries_after(root, 0).await.unwrap().len(), 1);
        assert!(matches!(
            store.entries_after(root, 2).await,
            Err(FsError::BadCookie { cookie: 2, .. })
        ));
        assert!(matches!(
            store.entries_after(root, 77).await,
            Err(FsError::BadCookie { cookie: 77, .. })
        ));
    }

    #[tokio::test]
    async fn test_store_busy_lock_surfaces_resource_busy() {
        let store = InodeStore::with_lock_policy(LockPolicy {
            timeout: Duration::from_millis(10),
            retries: 2,
        });
        let root = store.get_root();
        let (file, _) = store.create_file(root, "locked").await.unwrap();

        let inode = store.get(file).unwrap();
        let _guard = inode.write(store.get_lock_policy()).await.unwrap();

        assert!(matches!(
            store.read(file, 0, 1).await,
            Err(FsError::ResourceBusy(id)) if id == file
        ));
    }

    #[tokio::test]
    async fn test_store_concurrent_distinct_creates_all_succeed() {
        let store = Arc::new(InodeStore::new());
        let root = store.get_root();

        let tasks: Vec<_> = (0..32)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move { store.create_file(root, &format!("file{i}")).await })
            })
            .collect();

        let ids: HashSet<InodeId> = futures::future::join_all(tasks)
            .await
            .into_iter()
            .map(|r| r.unwrap().unwrap().0)
            .collect();
        assert_eq!(ids.len(), 32);
        assert_eq!(store.list(root).await.unwrap().len(), 32);
    }

    #[tokio::test]
    async fn test_store_concurrent_same_name_creates_one_wins() {
        let store = Arc::new(InodeStore::new());
        let root = store.get_root();

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    if i % 2 == 0 {
                        store.create_file(root, "contended").await
                    } else {
                        store.create_directory(root, "contended").await
                    }
                })
            })
            .collect();

        let results: Vec<_> = futures::future::join_all(tasks)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(
            results
                .iter()
                .filter(|r| matches!(r, Err(FsError::AlreadyExists(_))))
                .count(),
            15
        );
        assert_eq!(store.list(root).await.unwrap().len(), 1);
    }
}
