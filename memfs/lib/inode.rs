use std::{
    collections::BTreeMap,
    fmt::{self, Display},
    time::Duration,
};

use getset::{CopyGetters, Getters};
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::{defaults::MAX_FILE_SIZE, AccessTime, FsError, FsResult, Metadata, PathSegment};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// First cookie handed out to a directory entry. Cookies 0, 1 and 2 are reserved by NFSv4.
pub const FIRST_COOKIE: u64 = 3;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The server-assigned identity of an inode. Identities are never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InodeId(u64);

/// The type of an inode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InodeKind {
    /// A directory of named children
    Directory,

    /// A regular file
    File,
}

/// How long a single attempt at an inode lock may wait, and how many attempts are made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockPolicy {
    /// Upper bound on one wait for an inode lock
    pub timeout: Duration,

    /// Number of additional attempts after the first one times out
    pub retries: u32,
}

/// A node of the tree, shared by the store through an `Arc`.
///
/// The identity, kind and parent never change. Everything mutable sits behind the inode's own lock.
#[derive(Debug, Getters, CopyGetters)]
pub struct Inode {
    /// Identity of the inode
    #[getset(get_copy = "pub with_prefix")]
    id: InodeId,

    /// Whether this is a file or a directory
    #[getset(get_copy = "pub with_prefix")]
    kind: InodeKind,

    /// Identity of the parent directory, `None` for the root
    #[getset(get_copy = "pub with_prefix")]
    parent: Option<InodeId>,

    /// Last access time, updated by readers under a shared lock
    #[getset(get = "pub with_prefix")]
    accessed_at: AccessTime,

    state: RwLock<InodeState>,
}

/// The lock-protected part of an inode.
#[derive(Debug, Getters)]
pub struct InodeState {
    /// Metadata of the inode
    #[getset(get = "pub with_prefix")]
    metadata: Metadata,

    /// Directory entries or file content
    #[getset(get = "pub with_prefix")]
    entity: Entity,

    /// Set once the inode has been unlinked from its parent
    unlinked: bool,
}

/// The content of an inode.
#[derive(Debug, Clone)]
pub enum Entity {
    /// A directory containing other inodes
    Dir(Dir),

    /// A file containing data
    File(File),
}

/// Represents a directory in the inode store.
///
/// Entries refer to children by identity and are kept ordered by name.
#[derive(Debug, Clone, Getters)]
pub struct Dir {
    /// Map of names to directory entries
    #[getset(get = "pub with_prefix")]
    entries: BTreeMap<PathSegment, DirEntry>,

    next_cookie: u64,
}

/// Represents a file in the inode store.
#[derive(Debug, Clone, Default, Getters, CopyGetters)]
pub struct File {
    /// Content of the file as a byte vector
    #[getset(get = "pub with_prefix")]
    content: Vec<u8>,

    /// Verifier recorded by an exclusive create
    #[getset(get_copy = "pub with_prefix")]
    verifier: Option<[u8; 8]>,
}

/// A child reference held by a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, CopyGetters)]
#[getset(get_copy = "pub with_prefix")]
pub struct DirEntry {
    /// Identity of the child
    id: InodeId,

    /// Kind of the child
    kind: InodeKind,

    /// Readdir cookie of the entry, unique within the directory
    cookie: u64,
}

/// A named directory entry as returned by listings.
#[derive(Debug, Clone, PartialEq, Eq, Getters, CopyGetters)]
pub struct Entry {
    /// Name of the entry
    #[getset(get = "pub with_prefix")]
    name: PathSegment,

    /// Identity of the child
    #[getset(get_copy = "pub with_prefix")]
    id: InodeId,

    /// Kind of the child
    #[getset(get_copy = "pub with_prefix")]
    kind: InodeKind,

    /// Readdir cookie of the entry
    #[getset(get_copy = "pub with_prefix")]
    cookie: u64,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl InodeId {
    /// The identity of the root directory.
    pub const ROOT: InodeId = InodeId(1);

    /// Wraps a raw identity.
    pub const fn from_u64(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw identity, used as the NFS fileid.
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl Inode {
    pub(crate) fn new(id: InodeId, kind: InodeKind, parent: Option<InodeId>) -> Self {
        let entity = match kind {
            InodeKind::Directory => Entity::Dir(Dir::new()),
            InodeKind::File => Entity::File(File::default()),
        };

        Self {
            id,
            kind,
            parent,
            accessed_at: AccessTime::now(),
            state: RwLock::new(InodeState {
                metadata: Metadata::new(kind),
                entity,
                unlinked: false,
            }),
        }
    }

    /// Acquires the inode lock for reading, failing with `ResourceBusy` once every attempt has
    /// timed out.
    pub async fn read(&self, policy: LockPolicy) -> FsResult<RwLockReadGuard<'_, InodeState>> {
        for attempt in 0..=policy.retries {
            match tokio::time::timeout(policy.timeout, self.state.read()).await {
                Ok(guard) => return Ok(guard),
                Err(_) => tracing::warn!(id = %self.id, attempt, "timed out waiting for read lock"),
            }
        }

        Err(FsError::ResourceBusy(self.id))
    }

    /// Acquires the inode lock for writing, failing with `ResourceBusy` once every attempt has
    /// timed out.
    pub async fn write(&self, policy: LockPolicy) -> FsResult<RwLockWriteGuard<'_, InodeState>> {
        for attempt in 0..=policy.retries {
            match tokio::time::timeout(policy.timeout, self.state.write()).await {
                Ok(guard) => return Ok(guard),
                Err(_) => tracing::warn!(id = %self.id, attempt, "timed out waiting for write lock"),
            }
        }

        Err(FsError::ResourceBusy(self.id))
    }
}

impl InodeState {
    /// Returns a mutable reference to the metadata.
    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    /// Returns `true` once the inode has been removed from its parent.
    pub fn is_unlinked(&self) -> bool {
        self.unlinked
    }

    pub(crate) fn mark_unlinked(&mut self) {
        self.unlinked = true;
    }

    /// Returns the directory content, or `NotADirectory`.
    pub fn as_dir(&self, id: InodeId) -> FsResult<&Dir> {
        match &self.entity {
            Entity::Dir(dir) => Ok(dir),
            Entity::File(_) => Err(FsError::NotADirectory(id)),
        }
    }

    /// Returns the directory content mutably together with the metadata, or `NotADirectory`.
    pub fn as_mut_dir(&mut self, id: InodeId) -> FsResult<(&mut Dir, &mut Metadata)> {
        match &mut self.entity {
            Entity::Dir(dir) => Ok((dir, &mut self.metadata)),
            Entity::File(_) => Err(FsError::NotADirectory(id)),
        }
    }

    /// Returns the file content, or `IsADirectory`.
    pub fn as_file(&self, id: InodeId) -> FsResult<&File> {
        match &self.entity {
            Entity::File(file) => Ok(file),
            Entity::Dir(_) => Err(FsError::IsADirectory(id)),
        }
    }

    /// Returns the file content mutably together with the metadata, or `IsADirectory`.
    pub fn as_mut_file(&mut self, id: InodeId) -> FsResult<(&mut File, &mut Metadata)> {
        match &mut self.entity {
            Entity::File(file) => Ok((file, &mut self.metadata)),
            Entity::Dir(_) => Err(FsError::IsADirectory(id)),
        }
    }
}

impl Dir {
    /// Creates a new empty directory.
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            next_cookie: FIRST_COOKIE,
        }
    }

    /// Retrieves the entry stored under `name`.
    pub fn get(&self, name: &str) -> Option<&DirEntry> {
        self.entries.get(name)
    }

    /// Adds a new entry, assigning it the next cookie.
    ///
    /// ## Errors
    ///
    /// * `FsError::AlreadyExists` - If an entry already exists with the given name
    pub fn put(&mut self, name: PathSegment, id: InodeId, kind: InodeKind) -> FsResult<DirEntry> {
        if self.entries.contains_key(&name) {
            return Err(FsError::AlreadyExists(name.into()));
        }

        let entry = DirEntry {
            id,
            kind,
            cookie: self.next_cookie,
        };
        self.next_cookie += 1;
        self.entries.insert(name, entry);
        Ok(entry)
    }

    /// Removes and returns the entry stored under `name`.
    pub fn remove(&mut self, name: &str) -> Option<DirEntry> {
        self.entries.remove(name)
    }

    /// Returns `true` if the directory has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns the number of child directories.
    pub fn subdirectory_count(&self) -> usize {
        self.entries
            .values()
            .filter(|entry| entry.kind == InodeKind::Directory)
            .count()
    }

    /// Returns `true` if `cookie` could have been handed out by this directory.
    pub fn is_valid_cookie(&self, cookie: u64) -> bool {
        cookie == 0 || (FIRST_COOKIE..self.next_cookie).contains(&cookie)
    }

    /// Returns all entries ordered by name.
    pub fn list(&self) -> Vec<Entry> {
        self.entries
            .iter()
            .map(|(name, entry)| Entry::new(name.clone(), *entry))
            .collect()
    }

    /// Returns the entries whose cookie is greater than `cookie`, in cookie order.
    ///
    /// Cookie order is creation order, so a listing resumed after a concurrent create or remove
    /// neither repeats nor skips the entries that survived.
    pub fn entries_after(&self, cookie: u64) -> Vec<Entry> {
        let mut entries: Vec<Entry> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.cookie > cookie)
            .map(|(name, entry)| Entry::new(name.clone(), *entry))
            .collect();
        entries.sort_by_key(|entry| entry.cookie);
        entries
    }
}

impl File {
    /// Creates a new file with the given content.
    pub fn with_content(content: Vec<u8>) -> Self {
        Self {
            content,
            verifier: None,
        }
    }

    /// Returns the length of the content.
    pub fn len(&self) -> u64 {
        self.content.len() as u64
    }

    /// Returns `true` if the file has no content.
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Records the verifier of an exclusive create.
    pub fn set_verifier(&mut self, verifier: [u8; 8]) {
        self.verifier = Some(verifier);
    }

    /// Copies up to `length` bytes starting at `offset`.
    ///
    /// ## Returns
    ///
    /// The bytes read and whether the read reached the end of the file. The data is only shorter
    /// than `length` when the end of the file is reached.
    pub fn read(&self, offset: u64, length: usize) -> (Vec<u8>, bool) {
        let len = self.content.len();
        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(len);
        let end = start.saturating_add(length).min(len);
        (self.content[start..end].to_vec(), end == len)
    }

    /// Writes `data` at `offset`, zero-filling any gap past the current end.
    ///
    /// ## Errors
    ///
    /// * `FsError::InvalidOffset` - If the write would end past [`MAX_FILE_SIZE`]
    pub fn write(&mut self, id: InodeId, offset: u64, data: &[u8]) -> FsResult<usize> {
        let end = offset
            .checked_add(data.len() as u64)
            .filter(|end| *end <= MAX_FILE_SIZE)
            .ok_or(FsError::InvalidOffset { id, offset })?;
        let start = usize::try_from(offset).map_err(|_| FsError::InvalidOffset { id, offset })?;
        let end = usize::try_from(end).map_err(|_| FsError::InvalidOffset { id, offset })?;

        if end > self.content.len() {
            self.content.resize(end, 0);
        }

        self.content[start..end].copy_from_slice(data);
        Ok(data.len())
    }

    /// Truncates or zero-extends the content to `size` bytes.
    ///
    /// ## Errors
    ///
    /// * `FsError::InvalidOffset` - If `size` is beyond [`MAX_FILE_SIZE`]
    pub fn truncate(&mut self, id: InodeId, size: u64) -> FsResult<()> {
        let invalid = FsError::InvalidOffset { id, offset: size };
        if size > MAX_FILE_SIZE {
            return Err(invalid);
        }
        let size = usize::try_from(size).map_err(|_| invalid)?;
        self.content.resize(size, 0);
        Ok(())
    }
}

impl Entry {
    fn new(name: PathSegment, entry: DirEntry) -> Self {
        Self {
            name,
            id: entry.id,
            kind: entry.kind,
            cookie: entry.cookie,
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Display for InodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl Default for Dir {
    fn default() -> Self {
        Self::new()
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(name: &str) -> PathSegment {
        PathSegment::try_from(name).unwrap()
    }

    #[test]
    fn test_inode_dir_put_and_get() {
        let mut dir = Dir::new();
        let entry = dir
            .put(segment("a"), InodeId::from_u64(10), InodeKind::File)
            .unwrap();
        assert_eq!(entry.get_cookie(), FIRST_COOKIE);

        let got = dir.get("a").unwrap();
        assert_eq!(got.get_id(), InodeId::from_u64(10));
        assert!(dir.get("b").is_none());

        assert!(matches!(
            dir.put(segment("a"), InodeId::from_u64(11), InodeKind::File),
            Err(FsError::AlreadyExists(name)) if name == "a"
        ));
        assert_eq!(dir.len(), 1);
    }

    #[test]
    fn test_inode_dir_cookies_resume_after_removal() {
        let mut dir = Dir::new();
        for (i, name) in ["c", "a", "b", "d"].iter().enumerate() {
            dir.put(segment(name), InodeId::from_u64(i as u64 + 2), InodeKind::File)
                .unwrap();
        }

        let first: Vec<String> = dir
            .entries_after(0)
            .iter()
            .map(|e| e.get_name().to_string())
            .collect();
        assert_eq!(first, vec!["c", "a", "b", "d"]);

        let resume_from = dir.get("a").unwrap().get_cookie();
        dir.remove("b");
        dir.put(segment("e"), InodeId::from_u64(20), InodeKind::File)
            .unwrap();

        let rest: Vec<String> = dir
            .entries_after(resume_from)
            .iter()
            .map(|e| e.get_name().to_string())
            .collect();
        assert_eq!(rest, vec!["d", "e"]);

        assert!(dir.is_valid_cookie(0));
        assert!(dir.is_valid_cookie(resume_from));
        assert!(!dir.is_valid_cookie(1));
        assert!(!dir.is_valid_cookie(1000));
    }

    #[test]
    fn test_inode_dir_list_is_name_ordered() {
        let mut dir = Dir::new();
        for name in ["mydir2", ".mydir2", "_+-*mydir3"] {
            dir.put(segment(name), InodeId::from_u64(5), InodeKind::Directory)
                .unwrap();
        }

        let names: Vec<String> = dir.list().iter().map(|e| e.get_name().to_string()).collect();
        assert_eq!(names, vec![".mydir2", "_+-*mydir3", "mydir2"]);
        assert_eq!(dir.subdirectory_count(), 3);
    }

    #[test]
    fn test_inode_file_write_zero_fills_gap() {
        let id = InodeId::from_u64(2);
        let mut file = File::default();
        assert_eq!(file.write(id, 4, b"abc").unwrap(), 3);
        assert_eq!(file.get_content(), b"\0\0\0\0abc");

        file.write(id, 1, b"XY").unwrap();
        assert_eq!(file.get_content(), b"\0XY\0abc");
    }

    #[test]
    fn test_inode_file_read_reports_eof() {
        let file = File::with_content(b"Hello world".to_vec());

        let (data, eof) = file.read(0, 5);
        assert_eq!(data, b"Hello");
        assert!(!eof);

        let (data, eof) = file.read(6, 100);
        assert_eq!(data, b"world");
        assert!(eof);

        let (data, eof) = file.read(50, 10);
        assert!(data.is_empty());
        assert!(eof);
    }

    #[test]
    fn test_inode_file_truncate() {
        let id = InodeId::from_u64(2);
        let mut file = File::with_content(b"Hello world".to_vec());
        file.truncate(id, 5).unwrap();
        assert_eq!(file.get_content(), b"Hello");

        file.truncate(id, 7).unwrap();
        assert_eq!(file.get_content(), b"Hello\0\0");
    }

    #[test]
    fn test_inode_file_rejects_sizes_past_the_limit() {
        let id = InodeId::from_u64(2);
        let mut file = File::with_content(b"Hello".to_vec());

        assert!(matches!(
            file.write(id, i64::MAX as u64, b"x"),
            Err(FsError::InvalidOffset { .. })
        ));
        assert!(matches!(
            file.write(id, u64::MAX, b"x"),
            Err(FsError::InvalidOffset { .. })
        ));
        assert!(matches!(
            file.write(id, MAX_FILE_SIZE, b"x"),
            Err(FsError::InvalidOffset { .. })
        ));
        assert!(matches!(
            file.truncate(id, i64::MAX as u64),
            Err(FsError::InvalidOffset { .. })
        ));
        assert!(matches!(
            file.truncate(id, MAX_FILE_SIZE + 1),
            Err(FsError::InvalidOffset { .. })
        ));
        assert_eq!(file.get_content(), b"Hello");
    }
}
