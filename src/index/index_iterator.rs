use std::sync::Arc;

use crate::buffer::{BufferPoolManager, PageReadGuard};
use crate::common::{Result, Rid, StorageError};
use crate::storage::page::LeafPageRef;

use super::generic_key::GenericKey;

/// Forward iterator over the leaf chain. Holds exactly one pinned,
/// read-latched leaf at a time; stepping to the next leaf latches it before
/// the current one is released, so the chain cannot be merged out from
/// under the cursor mid-step.
pub struct IndexIterator<const N: usize> {
    bpm: Arc<BufferPoolManager>,
    leaf: Option<PageReadGuard>,
    index: usize,
}

impl<const N: usize> IndexIterator<N> {
    pub(crate) fn new(bpm: Arc<BufferPoolManager>, leaf: Option<PageReadGuard>, index: usize) -> Self {
        Self { bpm, leaf, index }
    }

    /// True once the iterator has moved past the last entry of the
    /// rightmost leaf (or was constructed as `end()`).
    pub fn is_end(&self) -> bool {
        match &self.leaf {
            None => true,
            Some(guard) => {
                let leaf = LeafPageRef::<N>::new(guard.data());
                self.index >= leaf.size() && !leaf.next_page_id().is_valid()
            }
        }
    }

    fn release_current(&mut self) {
        if let Some(guard) = self.leaf.take() {
            let page_id = guard.page_id();
            drop(guard);
            self.bpm.unpin_page(page_id, false);
        }
    }

    /// Yields the next (key, rid) pair, following `next_page_id` across
    /// leaf boundaries.
    pub fn next_entry(&mut self) -> Result<Option<(GenericKey<N>, Rid)>> {
        loop {
            let Some(guard) = &self.leaf else {
                return Ok(None);
            };

            let (size, next_id) = {
                let leaf = LeafPageRef::<N>::new(guard.data());
                (leaf.size(), leaf.next_page_id())
            };

            if self.index < size {
                let leaf = LeafPageRef::<N>::new(guard.data());
                let item = (leaf.key_at(self.index), leaf.value_at(self.index));
                self.index += 1;
                return Ok(Some(item));
            }

            if !next_id.is_valid() {
                self.release_current();
                return Ok(None);
            }

            let next_frame = self
                .bpm
                .fetch_page(next_id)?
                .ok_or(StorageError::BufferPoolFull)?;
            // Latch the successor before letting go of the current leaf
            let next_guard = PageReadGuard::latch(next_frame);
            self.release_current();
            self.leaf = Some(next_guard);
            self.index = 0;
        }
    }
}

impl<const N: usize> Iterator for IndexIterator<N> {
    type Item = Result<(GenericKey<N>, Rid)>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_entry() {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

impl<const N: usize> Drop for IndexIterator<N> {
    fn drop(&mut self) {
        self.release_current();
    }
}
