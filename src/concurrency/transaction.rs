use crate::buffer::{PageReadGuard, PageWriteGuard};
use crate::common::PageId;

/// A latch held on a pinned page during an index operation.
pub enum PageLatch {
    Read(PageReadGuard),
    Write(PageWriteGuard),
}

impl PageLatch {
    pub fn page_id(&self) -> PageId {
        match self {
            PageLatch::Read(guard) => guard.page_id(),
            PageLatch::Write(guard) => guard.page_id(),
        }
    }

    pub fn data(&self) -> &[u8] {
        match self {
            PageLatch::Read(guard) => guard.data(),
            PageLatch::Write(guard) => guard.data(),
        }
    }

    /// Mutable page contents. Panics on a read latch; crabbing only ever
    /// stores write latches for mutating operations.
    pub fn data_mut(&mut self) -> &mut [u8] {
        match self {
            PageLatch::Write(guard) => guard.data_mut(),
            PageLatch::Read(_) => panic!("attempted to write through a read latch"),
        }
    }
}

/// Per-operation bookkeeping the index threads through its traversal: the
/// pages currently latched (root-to-leaf order) and the pages scheduled for
/// deletion once everything is unlatched and unpinned.
#[derive(Default)]
pub struct Transaction {
    page_set: Vec<PageLatch>,
    deleted_page_set: Vec<PageId>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_into_page_set(&mut self, latch: PageLatch) {
        self.page_set.push(latch);
    }

    pub fn page_set(&self) -> &Vec<PageLatch> {
        &self.page_set
    }

    pub fn page_set_mut(&mut self) -> &mut Vec<PageLatch> {
        &mut self.page_set
    }

    pub fn add_into_deleted_page_set(&mut self, page_id: PageId) {
        self.deleted_page_set.push(page_id);
    }

    pub fn deleted_page_set_mut(&mut self) -> &mut Vec<PageId> {
        &mut self.deleted_page_set
    }
}
