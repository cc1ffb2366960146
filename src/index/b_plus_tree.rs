use std::cmp::Ordering;
use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;

use crate::buffer::{BufferPoolManager, Frame, PageReadGuard, PageWriteGuard};
use crate::common::{PageId, Result, Rid, StorageError, HEADER_PAGE_ID, INVALID_PAGE_ID};
use crate::concurrency::{PageLatch, Transaction};
use crate::storage::page::{
    internal_page_capacity, leaf_page_capacity, BTreePage, BTreePageRef, HeaderPage,
    HeaderPageRef, InternalPage, InternalPageRef, LeafPage, LeafPageRef,
};

use super::generic_key::GenericKey;
use super::index_iterator::IndexIterator;
use super::key_comparator::KeyComparator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Read,
    Insert,
    Delete,
}

/// Concurrent B+tree index over fixed-width keys.
///
/// Pages are addressed by id through the buffer pool and never referenced
/// across an unpin. Traversals crab from root to leaf: a child is latched
/// before its parent is released, and for mutating operations ancestors stay
/// latched until the child is known to be safe. The only tree-level lock is
/// a mutex around `root_page_id`, held just long enough to read or swap it.
pub struct BPlusTree<const N: usize, C: KeyComparator> {
    index_name: String,
    root_page_id: Mutex<PageId>,
    bpm: Arc<BufferPoolManager>,
    comparator: C,
    leaf_max_size: usize,
    internal_max_size: usize,
}

impl<const N: usize, C: KeyComparator> BPlusTree<N, C> {
    pub fn new(
        index_name: impl Into<String>,
        bpm: Arc<BufferPoolManager>,
        comparator: C,
        leaf_max_size: usize,
        internal_max_size: usize,
    ) -> Self {
        assert!(
            (3..=leaf_page_capacity::<N>()).contains(&leaf_max_size),
            "leaf_max_size out of range"
        );
        assert!(
            (3..=internal_page_capacity::<N>()).contains(&internal_max_size),
            "internal_max_size out of range"
        );

        Self {
            index_name: index_name.into(),
            root_page_id: Mutex::new(INVALID_PAGE_ID),
            bpm,
            comparator,
            leaf_max_size,
            internal_max_size,
        }
    }

    /// Opens an index whose root was registered in the header page by an
    /// earlier incarnation.
    pub fn open(
        index_name: impl Into<String>,
        bpm: Arc<BufferPoolManager>,
        comparator: C,
        leaf_max_size: usize,
        internal_max_size: usize,
    ) -> Result<Self> {
        let tree = Self::new(index_name, bpm, comparator, leaf_max_size, internal_max_size);

        let frame = tree
            .bpm
            .fetch_page(HEADER_PAGE_ID)?
            .ok_or(StorageError::BufferPoolFull)?;
        let root = {
            let data = frame.read_data();
            HeaderPageRef::new(&data[..]).get_root_id(&tree.index_name)
        };
        tree.bpm.unpin_page(HEADER_PAGE_ID, false);

        if let Some(root_id) = root {
            *tree.root_page_id.lock() = root_id;
        }
        Ok(tree)
    }

    pub fn is_empty(&self) -> bool {
        !self.root_page_id.lock().is_valid()
    }

    pub fn root_page_id(&self) -> PageId {
        *self.root_page_id.lock()
    }

    pub fn buffer_pool(&self) -> &Arc<BufferPoolManager> {
        &self.bpm
    }

    /// Point lookup. Returns the rid stored under `key`, if any.
    pub fn get_value(
        &self,
        key: &GenericKey<N>,
        transaction: Option<&mut Transaction>,
    ) -> Result<Option<Rid>> {
        let mut local = Transaction::new();
        let txn = transaction.unwrap_or(&mut local);

        if !self.find_leaf(key, Operation::Read, txn)? {
            return Ok(None);
        }

        let result = {
            let Some(latch) = txn.page_set().last() else {
                return Ok(None);
            };
            let leaf = LeafPageRef::<N>::new(latch.data());
            let index = leaf.key_index(key, &self.comparator);
            if index < leaf.size()
                && self
                    .comparator
                    .compare(leaf.key_at(index).as_bytes(), key.as_bytes())
                    == Ordering::Equal
            {
                Some(leaf.value_at(index))
            } else {
                None
            }
        };

        self.release_all(txn, Operation::Read)?;
        Ok(result)
    }

    /// Inserts a unique key. Returns false (leaving the tree unchanged) if
    /// the key is already present.
    pub fn insert(
        &self,
        key: &GenericKey<N>,
        value: Rid,
        transaction: Option<&mut Transaction>,
    ) -> Result<bool> {
        let mut local = Transaction::new();
        let txn = transaction.unwrap_or(&mut local);

        while !self.find_leaf(key, Operation::Insert, txn)? {
            self.start_new_tree()?;
        }

        enum LeafOutcome {
            Duplicate,
            Inserted { split: bool },
        }

        let outcome = {
            let latch = txn
                .page_set_mut()
                .last_mut()
                .expect("find_leaf left no latched leaf");
            let mut leaf = LeafPage::<N>::new(latch.data_mut());
            let index = leaf.key_index(key, &self.comparator);
            if index < leaf.size()
                && self
                    .comparator
                    .compare(leaf.key_at(index).as_bytes(), key.as_bytes())
                    == Ordering::Equal
            {
                LeafOutcome::Duplicate
            } else {
                leaf.insert_at(index, key, value);
                LeafOutcome::Inserted {
                    split: leaf.size() == self.leaf_max_size,
                }
            }
        };

        match outcome {
            LeafOutcome::Duplicate => {
                self.release_all(txn, Operation::Insert)?;
                Ok(false)
            }
            LeafOutcome::Inserted { split } => {
                if split {
                    self.split_leaf(txn)?;
                }
                self.release_all(txn, Operation::Insert)?;
                Ok(true)
            }
        }
    }

    /// Removes `key` if present. Underflowing nodes are repaired by merging
    /// with or borrowing from a sibling; an emptied root collapses the tree.
    pub fn remove(
        &self,
        key: &GenericKey<N>,
        transaction: Option<&mut Transaction>,
    ) -> Result<()> {
        let mut local = Transaction::new();
        let txn = transaction.unwrap_or(&mut local);

        if !self.find_leaf(key, Operation::Delete, txn)? {
            return Ok(());
        }
        self.delete_entry(txn, *key)?;
        self.release_all(txn, Operation::Delete)
    }

    /// Iterator positioned at the smallest key.
    pub fn begin(&self) -> Result<IndexIterator<N>> {
        match self.latch_leftmost_leaf()? {
            Some(guard) => Ok(IndexIterator::new(Arc::clone(&self.bpm), Some(guard), 0)),
            None => Ok(self.end()),
        }
    }

    /// Iterator positioned at the first key >= `key`.
    pub fn begin_from(&self, key: &GenericKey<N>) -> Result<IndexIterator<N>> {
        let mut txn = Transaction::new();
        if !self.find_leaf(key, Operation::Read, &mut txn)? {
            return Ok(self.end());
        }

        let latch = txn
            .page_set_mut()
            .pop()
            .expect("find_leaf left no latched leaf");
        let PageLatch::Read(guard) = latch else {
            unreachable!("read traversal holds read latches");
        };
        let index = LeafPageRef::<N>::new(guard.data()).key_index(key, &self.comparator);
        // The pin travels with the iterator
        Ok(IndexIterator::new(Arc::clone(&self.bpm), Some(guard), index))
    }

    /// The exhausted iterator.
    pub fn end(&self) -> IndexIterator<N> {
        IndexIterator::new(Arc::clone(&self.bpm), None, 0)
    }

    /// Registers the current root in the header page: `insert_record` for a
    /// brand-new index, update otherwise. Must be called without the tree
    /// latch held.
    pub fn update_root_page_id(&self, insert_record: bool) -> Result<()> {
        let frame = self
            .bpm
            .fetch_page(HEADER_PAGE_ID)?
            .ok_or(StorageError::BufferPoolFull)?;
        {
            let mut data = frame.write_data();
            let mut header = HeaderPage::new(&mut data[..]);
            let root = *self.root_page_id.lock();
            if insert_record {
                if !header.insert_record(&self.index_name, root) {
                    header.update_record(&self.index_name, root);
                }
            } else if !header.update_record(&self.index_name, root) {
                header.insert_record(&self.index_name, root);
            }
        }
        self.bpm.unpin_page(HEADER_PAGE_ID, true);
        Ok(())
    }

    /// Descends to the leaf responsible for `key`, latching per the crabbing
    /// protocol and collecting latches in the transaction's page set. The
    /// leaf ends up as the last entry. Returns false on an empty tree.
    fn find_leaf(&self, key: &GenericKey<N>, op: Operation, txn: &mut Transaction) -> Result<bool> {
        // The root page id can change between reading it and latching the
        // page, so latch first and recheck.
        loop {
            let root_id = *self.root_page_id.lock();
            if !root_id.is_valid() {
                return Ok(false);
            }
            let frame = self
                .bpm
                .fetch_page(root_id)?
                .ok_or(StorageError::BufferPoolFull)?;
            let latch = match op {
                Operation::Read => PageLatch::Read(PageReadGuard::latch(frame)),
                _ => PageLatch::Write(PageWriteGuard::latch(frame)),
            };
            txn.add_into_page_set(latch);
            if *self.root_page_id.lock() == root_id {
                break;
            }
            self.release_page_set(txn, op);
        }

        loop {
            let (reached_leaf, child_id) = {
                let latch = txn.page_set().last().expect("traversal lost its page set");
                let header = BTreePageRef::new(latch.data());
                if header.is_leaf() {
                    (true, INVALID_PAGE_ID)
                } else {
                    let internal = InternalPageRef::<N>::new(latch.data());
                    (false, internal.lookup(key, &self.comparator))
                }
            };
            if reached_leaf {
                return Ok(true);
            }

            let child_frame = self
                .bpm
                .fetch_page(child_id)?
                .ok_or(StorageError::BufferPoolFull)?;
            match op {
                Operation::Read => {
                    // Readers release the parent as soon as the child is held
                    let guard = PageReadGuard::latch(child_frame);
                    self.release_page_set(txn, op);
                    txn.add_into_page_set(PageLatch::Read(guard));
                }
                Operation::Insert | Operation::Delete => {
                    // Writers release ancestors only once the child cannot
                    // propagate a split or merge past it
                    let guard = PageWriteGuard::latch(child_frame);
                    if self.is_safe(guard.data(), op) {
                        self.release_page_set(txn, op);
                    }
                    txn.add_into_page_set(PageLatch::Write(guard));
                }
            }
        }
    }

    /// Whether an operation on this node can no longer affect its ancestors.
    fn is_safe(&self, data: &[u8], op: Operation) -> bool {
        let page = BTreePageRef::new(data);
        match op {
            Operation::Read => true,
            Operation::Insert => {
                let max = if page.is_leaf() {
                    self.leaf_max_size - 1
                } else {
                    self.internal_max_size
                };
                page.size() < max
            }
            Operation::Delete => {
                if page.is_root() {
                    if page.is_leaf() {
                        true
                    } else {
                        page.size() > 2
                    }
                } else {
                    page.size() > page.min_size()
                }
            }
        }
    }

    /// Creates a root leaf for an empty tree. Racing inserters both arrive
    /// here; whoever takes the tree latch second finds the root already set.
    fn start_new_tree(&self) -> Result<()> {
        let created = {
            let mut root = self.root_page_id.lock();
            if root.is_valid() {
                false
            } else {
                let (page_id, frame) = self
                    .bpm
                    .new_page()?
                    .ok_or(StorageError::BufferPoolFull)?;
                {
                    let mut data = frame.write_data();
                    let mut leaf = LeafPage::<N>::new(&mut data[..]);
                    leaf.init(page_id, INVALID_PAGE_ID, self.leaf_max_size);
                }
                *root = page_id;
                self.bpm.unpin_page(page_id, true);
                debug!("started new tree at {}", page_id);
                true
            }
        };
        if created {
            self.update_root_page_id(true)?;
        }
        Ok(())
    }

    /// Splits the (full) leaf at the back of the page set and threads the
    /// new sibling into the leaf chain and the parent.
    fn split_leaf(&self, txn: &mut Transaction) -> Result<()> {
        let node_index = txn.page_set().len() - 1;

        let (old_page_id, old_next, moved) = {
            let latch = &mut txn.page_set_mut()[node_index];
            let mut leaf = LeafPage::<N>::new(latch.data_mut());
            let next = leaf.next_page_id();
            let page_id = leaf.page_id();
            (page_id, next, leaf.split_off())
        };

        let (new_page_id, new_frame) = self
            .bpm
            .new_page()?
            .ok_or(StorageError::BufferPoolFull)?;
        {
            let mut data = new_frame.write_data();
            let mut sibling = LeafPage::<N>::new(&mut data[..]);
            sibling.init(new_page_id, INVALID_PAGE_ID, self.leaf_max_size);
            sibling.append(&moved);
            sibling.set_next_page_id(old_next);
        }
        {
            let latch = &mut txn.page_set_mut()[node_index];
            LeafPage::<N>::new(latch.data_mut()).set_next_page_id(new_page_id);
        }
        debug!("split leaf {} into {}", old_page_id, new_page_id);

        let separator = moved[0].0;
        self.insert_into_parent(txn, node_index, separator, new_page_id, &new_frame)?;
        self.bpm.unpin_page(new_page_id, true);
        Ok(())
    }

    /// Hooks `new_child` (the right half of a split) into the parent of the
    /// node at `node_index`, splitting upward as long as parents overflow.
    fn insert_into_parent(
        &self,
        txn: &mut Transaction,
        node_index: usize,
        separator: GenericKey<N>,
        new_child_id: PageId,
        new_child_frame: &Arc<Frame>,
    ) -> Result<()> {
        let (node_page_id, parent_page_id) = {
            let latch = &txn.page_set()[node_index];
            let header = BTreePageRef::new(latch.data());
            (header.page_id(), header.parent_page_id())
        };

        if !parent_page_id.is_valid() {
            // The split node was the root: grow the tree by one level
            let (root_id, root_frame) = self
                .bpm
                .new_page()?
                .ok_or(StorageError::BufferPoolFull)?;
            {
                let mut data = root_frame.write_data();
                let mut root = InternalPage::<N>::new(&mut data[..]);
                root.init(root_id, INVALID_PAGE_ID, self.internal_max_size);
                root.populate_new_root(node_page_id, &separator, new_child_id);
            }
            {
                let latch = &mut txn.page_set_mut()[node_index];
                BTreePage::new(latch.data_mut()).set_parent_page_id(root_id);
            }
            {
                let mut data = new_child_frame.write_data();
                BTreePage::new(&mut data[..]).set_parent_page_id(root_id);
            }
            *self.root_page_id.lock() = root_id;
            self.bpm.unpin_page(root_id, true);
            self.update_root_page_id(false)?;
            debug!("grew new root {}", root_id);
            return Ok(());
        }

        // The node was unsafe, so crabbing kept its parent latched right
        // above it in the page set.
        debug_assert!(node_index > 0, "unsafe node must have a latched parent");
        let parent_index = node_index - 1;

        let parent_has_room = {
            let latch = &txn.page_set()[parent_index];
            BTreePageRef::new(latch.data()).size() < self.internal_max_size
        };

        if parent_has_room {
            {
                let latch = &mut txn.page_set_mut()[parent_index];
                let mut parent = InternalPage::<N>::new(latch.data_mut());
                parent.insert(&separator, new_child_id, &self.comparator);
            }
            let mut data = new_child_frame.write_data();
            BTreePage::new(&mut data[..]).set_parent_page_id(parent_page_id);
            return Ok(());
        }

        // Parent is full: order its entries plus the incoming one in a
        // scratch array of max_size + 1 and split around the midpoint.
        let mut entries = {
            let latch = &txn.page_set()[parent_index];
            InternalPageRef::<N>::new(latch.data()).entries()
        };
        let mut pos = 1;
        while pos < entries.len()
            && self
                .comparator
                .compare(entries[pos].0.as_bytes(), separator.as_bytes())
                != Ordering::Greater
        {
            pos += 1;
        }
        entries.insert(pos, (separator, new_child_id));

        let mid = (self.internal_max_size + 1) / 2;
        let right = entries.split_off(mid);

        {
            let latch = &mut txn.page_set_mut()[parent_index];
            InternalPage::<N>::new(latch.data_mut()).set_entries(&entries);
        }

        let (sibling_id, sibling_frame) = self
            .bpm
            .new_page()?
            .ok_or(StorageError::BufferPoolFull)?;
        {
            let mut data = sibling_frame.write_data();
            let mut sibling = InternalPage::<N>::new(&mut data[..]);
            sibling.init(sibling_id, INVALID_PAGE_ID, self.internal_max_size);
            // The first right entry's key doubles as the promoted separator;
            // it rides along in the sibling's unused slot 0.
            sibling.set_entries(&right);
        }
        debug!("split internal {} into {}", parent_page_id, sibling_id);

        {
            let mut data = new_child_frame.write_data();
            BTreePage::new(&mut data[..]).set_parent_page_id(parent_page_id);
        }
        for (_, child_id) in &right {
            if *child_id == node_page_id {
                // We already hold this child's write latch; go through it
                let latch = &mut txn.page_set_mut()[node_index];
                BTreePage::new(latch.data_mut()).set_parent_page_id(sibling_id);
            } else if *child_id == new_child_id {
                let mut data = new_child_frame.write_data();
                BTreePage::new(&mut data[..]).set_parent_page_id(sibling_id);
            } else {
                let frame = self
                    .bpm
                    .fetch_page(*child_id)?
                    .ok_or(StorageError::BufferPoolFull)?;
                {
                    let mut data = frame.write_data();
                    BTreePage::new(&mut data[..]).set_parent_page_id(sibling_id);
                }
                self.bpm.unpin_page(*child_id, true);
            }
        }

        let promoted = right[0].0;
        self.insert_into_parent(txn, parent_index, promoted, sibling_id, &sibling_frame)?;
        self.bpm.unpin_page(sibling_id, true);
        Ok(())
    }

    /// Removes `key` from the node at the back of the page set, repairing
    /// underflow bottom-up. Consumes (releases) that node's latch on every
    /// path.
    fn delete_entry(&self, txn: &mut Transaction, key: GenericKey<N>) -> Result<()> {
        let mut entry = match txn.page_set_mut().pop() {
            Some(entry) => entry,
            None => return Ok(()),
        };

        let (node_page_id, is_leaf) = {
            let header = BTreePageRef::new(entry.data());
            (header.page_id(), header.is_leaf())
        };

        let removed = if is_leaf {
            LeafPage::<N>::new(entry.data_mut()).remove(&key, &self.comparator)
        } else {
            InternalPage::<N>::new(entry.data_mut()).remove(&key, &self.comparator)
        };
        if !removed {
            self.release_latch(entry);
            return Ok(());
        }

        if *self.root_page_id.lock() == node_page_id {
            let size = BTreePageRef::new(entry.data()).size();
            if is_leaf && size == 0 {
                // Last key gone: the tree is empty again
                *self.root_page_id.lock() = INVALID_PAGE_ID;
                self.release_latch(entry);
                txn.add_into_deleted_page_set(node_page_id);
                self.update_root_page_id(false)?;
                debug!("root {} emptied; tree collapsed", node_page_id);
                return Ok(());
            }
            if !is_leaf && size == 1 {
                // An internal root with a single child hands the root over
                let child_id = InternalPageRef::<N>::new(entry.data()).value_at(0);
                *self.root_page_id.lock() = child_id;
                let child_frame = self
                    .bpm
                    .fetch_page(child_id)?
                    .ok_or(StorageError::BufferPoolFull)?;
                {
                    let mut data = child_frame.write_data();
                    BTreePage::new(&mut data[..]).set_parent_page_id(INVALID_PAGE_ID);
                }
                self.bpm.unpin_page(child_id, true);
                self.release_latch(entry);
                txn.add_into_deleted_page_set(node_page_id);
                self.update_root_page_id(false)?;
                debug!("root collapsed into child {}", child_id);
                return Ok(());
            }
            self.release_latch(entry);
            return Ok(());
        }

        let (size, min_size) = {
            let header = BTreePageRef::new(entry.data());
            (header.size(), header.min_size())
        };
        if size >= min_size {
            self.release_latch(entry);
            return Ok(());
        }

        // Underflow: repair with a sibling fetched through the parent,
        // preferring the left one.
        let (sibling_id, parent_key, sibling_is_left) = {
            let parent_latch = txn
                .page_set()
                .last()
                .expect("underflowed non-root must have a latched parent");
            let parent = InternalPageRef::<N>::new(parent_latch.data());
            let child_pos = parent
                .child_index_of(node_page_id)
                .expect("parent no longer references child");
            if child_pos > 0 {
                (
                    parent.value_at(child_pos - 1),
                    parent.key_at(child_pos),
                    true,
                )
            } else {
                (
                    parent.value_at(child_pos + 1),
                    parent.key_at(child_pos + 1),
                    false,
                )
            }
        };

        let sibling_frame = self
            .bpm
            .fetch_page(sibling_id)?
            .ok_or(StorageError::BufferPoolFull)?;
        let sibling_guard = PageWriteGuard::latch(sibling_frame);
        let sibling_size = BTreePageRef::new(sibling_guard.data()).size();

        let max_merged = if is_leaf {
            self.leaf_max_size - 1
        } else {
            self.internal_max_size
        };

        if sibling_size + size <= max_merged {
            self.merge(txn, entry, sibling_guard, &parent_key, sibling_is_left, is_leaf)?;
            // The separator between the merged pair leaves the parent, which
            // may now underflow in turn.
            self.delete_entry(txn, parent_key)
        } else {
            self.redistribute(txn, entry, sibling_guard, &parent_key, sibling_is_left, is_leaf)
        }
    }

    /// Folds the right node of a (node, sibling) pair into the left and
    /// schedules the emptied right page for deletion.
    fn merge(
        &self,
        txn: &mut Transaction,
        node_entry: PageLatch,
        sibling_guard: PageWriteGuard,
        parent_key: &GenericKey<N>,
        sibling_is_left: bool,
        is_leaf: bool,
    ) -> Result<()> {
        let PageLatch::Write(node_guard) = node_entry else {
            unreachable!("delete traversal holds write latches");
        };
        let (mut left, mut right) = if sibling_is_left {
            (sibling_guard, node_guard)
        } else {
            (node_guard, sibling_guard)
        };

        let left_id = BTreePageRef::new(left.data()).page_id();
        let right_id = BTreePageRef::new(right.data()).page_id();

        if is_leaf {
            let (pairs, right_next) = {
                let mut right_leaf = LeafPage::<N>::new(right.data_mut());
                let next = right_leaf.next_page_id();
                (right_leaf.drain_all(), next)
            };
            let mut left_leaf = LeafPage::<N>::new(left.data_mut());
            left_leaf.append(&pairs);
            left_leaf.set_next_page_id(right_next);
        } else {
            let mut entries = InternalPage::<N>::new(right.data_mut()).drain_entries();
            // The parent separator becomes the key over the right node's
            // leftmost child.
            entries[0].0 = *parent_key;
            InternalPage::<N>::new(left.data_mut()).append_entries(&entries);

            for (_, child_id) in &entries {
                let frame = self
                    .bpm
                    .fetch_page(*child_id)?
                    .ok_or(StorageError::BufferPoolFull)?;
                {
                    let mut data = frame.write_data();
                    BTreePage::new(&mut data[..]).set_parent_page_id(left_id);
                }
                self.bpm.unpin_page(*child_id, true);
            }
        }
        debug!("merged {} into {}", right_id, left_id);

        // Deletion waits until the page is unlatched and unpinned
        drop(right);
        self.bpm.unpin_page(right_id, true);
        txn.add_into_deleted_page_set(right_id);

        drop(left);
        self.bpm.unpin_page(left_id, true);
        Ok(())
    }

    /// Borrows one entry from the adjacent end of the sibling and patches
    /// the parent's separator to the new boundary.
    fn redistribute(
        &self,
        txn: &mut Transaction,
        node_entry: PageLatch,
        mut sibling_guard: PageWriteGuard,
        parent_key: &GenericKey<N>,
        sibling_is_left: bool,
        is_leaf: bool,
    ) -> Result<()> {
        let PageLatch::Write(mut node_guard) = node_entry else {
            unreachable!("delete traversal holds write latches");
        };
        let node_id = BTreePageRef::new(node_guard.data()).page_id();

        let new_separator = if sibling_is_left {
            if is_leaf {
                let (key, value) = LeafPage::<N>::new(sibling_guard.data_mut()).remove_last();
                LeafPage::<N>::new(node_guard.data_mut()).insert_first(&key, value);
                key
            } else {
                let (last_key, last_child) =
                    InternalPage::<N>::new(sibling_guard.data_mut()).remove_last();
                // The borrowed child enters under the old separator; its key
                // moves up to the parent.
                InternalPage::<N>::new(node_guard.data_mut()).insert_first(parent_key, last_child);
                self.reparent(last_child, node_id)?;
                last_key
            }
        } else if is_leaf {
            let (key, value) = LeafPage::<N>::new(sibling_guard.data_mut()).remove_first();
            LeafPage::<N>::new(node_guard.data_mut()).insert_last(&key, value);
            LeafPageRef::<N>::new(sibling_guard.data()).key_at(0)
        } else {
            let (first_child, first_key) = {
                let sibling = InternalPageRef::<N>::new(sibling_guard.data());
                (sibling.value_at(0), sibling.key_at(1))
            };
            InternalPage::<N>::new(sibling_guard.data_mut()).delete_first();
            InternalPage::<N>::new(node_guard.data_mut()).push_last(parent_key, first_child);
            self.reparent(first_child, node_id)?;
            first_key
        };

        {
            let parent_latch = txn
                .page_set_mut()
                .last_mut()
                .expect("redistribute requires a latched parent");
            let mut parent = InternalPage::<N>::new(parent_latch.data_mut());
            let index = parent.key_index(parent_key, &self.comparator);
            parent.set_key_at(index, &new_separator);
        }

        let sibling_id = BTreePageRef::new(sibling_guard.data()).page_id();
        drop(sibling_guard);
        self.bpm.unpin_page(sibling_id, true);
        drop(node_guard);
        self.bpm.unpin_page(node_id, true);
        Ok(())
    }

    /// Repoints a child's parent id. The child is not latched by this
    /// operation's page set, so taking its data latch here cannot deadlock.
    fn reparent(&self, child_id: PageId, parent_id: PageId) -> Result<()> {
        let frame = self
            .bpm
            .fetch_page(child_id)?
            .ok_or(StorageError::BufferPoolFull)?;
        {
            let mut data = frame.write_data();
            BTreePage::new(&mut data[..]).set_parent_page_id(parent_id);
        }
        self.bpm.unpin_page(child_id, true);
        Ok(())
    }

    /// Read-crabs to the leftmost leaf and returns its read guard, pinned.
    fn latch_leftmost_leaf(&self) -> Result<Option<PageReadGuard>> {
        let mut guard = loop {
            let root_id = *self.root_page_id.lock();
            if !root_id.is_valid() {
                return Ok(None);
            }
            let frame = self
                .bpm
                .fetch_page(root_id)?
                .ok_or(StorageError::BufferPoolFull)?;
            let guard = PageReadGuard::latch(frame);
            if *self.root_page_id.lock() == root_id {
                break guard;
            }
            let page_id = guard.page_id();
            drop(guard);
            self.bpm.unpin_page(page_id, false);
        };

        loop {
            let (reached_leaf, child_id) = {
                let header = BTreePageRef::new(guard.data());
                if header.is_leaf() {
                    (true, INVALID_PAGE_ID)
                } else {
                    (false, InternalPageRef::<N>::new(guard.data()).value_at(0))
                }
            };
            if reached_leaf {
                return Ok(Some(guard));
            }
            let child_frame = self
                .bpm
                .fetch_page(child_id)?
                .ok_or(StorageError::BufferPoolFull)?;
            let child_guard = PageReadGuard::latch(child_frame);
            let page_id = guard.page_id();
            drop(guard);
            self.bpm.unpin_page(page_id, false);
            guard = child_guard;
        }
    }

    /// Unlatches and unpins every page in the set, root first. Writer
    /// operations unpin dirty.
    fn release_page_set(&self, txn: &mut Transaction, op: Operation) {
        let dirty = op != Operation::Read;
        for latch in txn.page_set_mut().drain(..) {
            let page_id = latch.page_id();
            drop(latch);
            self.bpm.unpin_page(page_id, dirty);
        }
    }

    /// Bulk release at the end of an operation: page set first, then every
    /// page scheduled for deletion.
    fn release_all(&self, txn: &mut Transaction, op: Operation) -> Result<()> {
        self.release_page_set(txn, op);
        let deleted: Vec<PageId> = txn.deleted_page_set_mut().drain(..).collect();
        for page_id in deleted {
            self.bpm.delete_page(page_id)?;
        }
        Ok(())
    }

    /// Unlatches and unpins a single write-latched page.
    fn release_latch(&self, latch: PageLatch) {
        let page_id = latch.page_id();
        drop(latch);
        self.bpm.unpin_page(page_id, true);
    }
}
