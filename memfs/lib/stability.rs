use std::{collections::HashMap, ops::Range, sync::Mutex};

use getset::CopyGetters;

use crate::{FsError, FsResult, InodeId, InodeStore};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The stability a client asks of a write, weakest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StableHow {
    /// The data may be lost until a later commit
    Unstable,

    /// The data is stable, file metadata may not be
    DataSync,

    /// Data and metadata are stable
    FileSync,
}

/// An 8-byte token that changes only when the server instance changes.
pub type WriteVerifier = [u8; 8];

/// What a write reports back to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, CopyGetters)]
#[getset(get_copy = "pub with_prefix")]
pub struct WriteOutcome {
    /// Number of bytes written
    count: usize,

    /// Stability actually provided, never weaker than requested
    committed: StableHow,

    /// The server's write verifier
    verifier: WriteVerifier,
}

/// Tracks unstable writes and answers commits.
///
/// The store is memory-resident, so every write is as stable as it will ever be the moment it
/// returns. The controller still reports the stability that was asked for and keeps the ranges
/// written unstably so that a commit has something to settle.
#[derive(Debug)]
pub struct StabilityController {
    verifier: WriteVerifier,
    pending: Mutex<HashMap<InodeId, Vec<Range<u64>>>>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl StabilityController {
    /// Creates a controller with a verifier that stays fixed for its lifetime.
    pub fn new(verifier: WriteVerifier) -> Self {
        Self {
            verifier,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the write verifier.
    pub fn verifier(&self) -> WriteVerifier {
        self.verifier
    }

    /// Writes through the store and reports the requested stability.
    ///
    /// ## Arguments
    ///
    /// * `store` - The store holding the file
    /// * `id` - The file to write
    /// * `offset` - Where the data goes
    /// * `data` - The bytes to write
    /// * `requested` - The stability the client asked for
    pub async fn perform_write(
        &self,
        store: &InodeStore,
        id: InodeId,
        offset: u64,
        data: &[u8],
        requested: StableHow,
    ) -> FsResult<WriteOutcome> {
        let count = store.write(id, offset, data).await?;

        if requested == StableHow::Unstable && count > 0 {
            self.record(id, offset..offset.saturating_add(count as u64))?;
        }

        Ok(WriteOutcome {
            count,
            committed: requested,
            verifier: self.verifier,
        })
    }

    /// Commits a range of a file. A `count` of zero means through the end of the file.
    ///
    /// ## Errors
    ///
    /// * `FsError::IsADirectory` - If `id` is a directory
    /// * `FsError::StaleHandle` - If the file no longer exists
    /// * `FsError::InvalidArgument` - If the range overflows
    pub fn commit(
        &self,
        store: &InodeStore,
        id: InodeId,
        offset: u64,
        count: u32,
    ) -> FsResult<WriteVerifier> {
        store.ensure_file(id)?;

        let end = if count == 0 {
            u64::MAX
        } else {
            offset.checked_add(u64::from(count)).ok_or_else(|| {
                FsError::InvalidArgument(format!("commit range {offset}+{count} overflows"))
            })?
        };

        let mut pending = self.lock_pending()?;
        if let Some(ranges) = pending.get_mut(&id) {
            *ranges = subtract(ranges, offset..end);
            if ranges.is_empty() {
                pending.remove(&id);
            }
        }

        Ok(self.verifier)
    }

    /// Returns the ranges of a file written unstably and not yet committed.
    pub fn pending(&self, id: InodeId) -> Vec<Range<u64>> {
        self.lock_pending()
            .ok()
            .and_then(|pending| pending.get(&id).cloned())
            .unwrap_or_default()
    }

    /// Drops the bookkeeping of a removed file.
    pub fn forget(&self, id: InodeId) {
        if let Ok(mut pending) = self.lock_pending() {
            pending.remove(&id);
        }
    }

    fn record(&self, id: InodeId, range: Range<u64>) -> FsResult<()> {
        let mut pending = self.lock_pending()?;
        let ranges = pending.entry(id).or_default();
        ranges.push(range);
        *ranges = merge(std::mem::take(ranges));
        Ok(())
    }

    fn lock_pending(&self) -> FsResult<std::sync::MutexGuard<'_, HashMap<InodeId, Vec<Range<u64>>>>> {
        self.pending
            .lock()
            .map_err(|_| FsError::LockPoisoned("stability table"))
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Sorts ranges and coalesces the ones that overlap or touch.
fn merge(mut ranges: Vec<Range<u64>>) -> Vec<Range<u64>> {
    ranges.sort_by_key(|r| r.start);
    let mut merged: Vec<Range<u64>> = Vec::with_capacity(ranges.len());
    for range in ranges {
        match merged.last_mut() {
            Some(last) if range.start <= last.end => last.end = last.end.max(range.end),
            _ => merged.push(range),
        }
    }
    merged
}

/// Removes `cut` from every range, splitting ranges that straddle it.
fn subtract(ranges: &[Range<u64>], cut: Range<u64>) -> Vec<Range<u64>> {
    let mut result = Vec::with_capacity(ranges.len() + 1);
    for range in ranges {
        if range.end <= cut.start || range.start >= cut.end {
            result.push(range.clone());
            continue;
        }
        if range.start < cut.start {
            result.push(range.start..cut.start);
        }
        if range.end > cut.end {
            result.push(cut.end..range.end);
        }
    }
    result
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stability_merge_and_subtract() {
        assert_eq!(merge(vec![10..20, 0..5, 5..8, 15..30]), vec![0..8, 10..30]);
        assert_eq!(subtract(&[0..100], 20..30), vec![0..20, 30..100]);
        assert_eq!(subtract(&[0..10, 20..30], 5..25), vec![0..5, 25..30]);
        assert!(subtract(&[0..10], 0..u64::MAX).is_empty());
    }

    #[tokio::test]
    async fn test_stability_reports_requested_level() {
        let store = InodeStore::new();
        let controller = StabilityController::new(*b"verifier");
        let (file, _) = store.create_file(store.get_root(), "f").await.unwrap();

        for requested in [StableHow::Unstable, StableHow::DataSync, StableHow::FileSync] {
            let outcome = controller
                .perform_write(&store, file, 0, b"abc", requested)
                .await
                .unwrap();
            assert_eq!(outcome.get_committed(), requested);
            assert!(outcome.get_committed() >= requested);
            assert_eq!(outcome.get_count(), 3);
            assert_eq!(outcome.get_verifier(), *b"verifier");
        }
    }

    #[tokio::test]
    async fn test_stability_commit_clears_unstable_ranges() {
        let store = InodeStore::new();
        let controller = StabilityController::new(*b"verifier");
        let (file, _) = store.create_file(store.get_root(), "f").await.unwrap();

        controller
            .perform_write(&store, file, 0, &[1; 100], StableHow::Unstable)
            .await
            .unwrap();
        controller
            .perform_write(&store, file, 100, &[2; 100], StableHow::Unstable)
            .await
            .unwrap();
        assert_eq!(controller.pending(file), vec![0..200]);

        let verifier = controller.commit(&store, file, 50, 100).unwrap();
        assert_eq!(verifier, *b"verifier");
        assert_eq!(controller.pending(file), vec![0..50, 150..200]);

        controller.commit(&store, file, 0, 0).unwrap();
        assert!(controller.pending(file).is_empty());
    }

    #[tokio::test]
    async fn test_stability_stable_writes_leave_nothing_pending() {
        let store = InodeStore::new();
        let controller = StabilityController::new(*b"verifier");
        let (file, _) = store.create_file(store.get_root(), "f").await.unwrap();

        controller
            .perform_write(&store, file, 0, b"data", StableHow::FileSync)
            .await
            .unwrap();
        assert!(controller.pending(file).is_empty());
    }

    #[tokio::test]
    async fn test_stability_commit_errors() {
        let store = InodeStore::new();
        let controller = StabilityController::new(*b"verifier");
        let root = store.get_root();
        let (file, _) = store.create_file(root, "f").await.unwrap();

        assert!(matches!(
            controller.commit(&store, root, 0, 0),
            Err(FsError::IsADirectory(_))
        ));
        assert!(matches!(
            controller.commit(&store, file, u64::MAX, 10),
            Err(FsError::InvalidArgument(_))
        ));

        controller
            .perform_write(&store, file, 0, b"data", StableHow::Unstable)
            .await
            .unwrap();
        store.remove(root, "f").await.unwrap();
        controller.forget(file);
        assert!(controller.pending(file).is_empty());
        assert!(matches!(
            controller.commit(&store, file, 0, 0),
            Err(FsError::StaleHandle(_))
        ));
    }
}
