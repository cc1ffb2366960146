use std::collections::VecDeque;
use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;

use crate::common::{FrameId, PageId, Result, StorageError, PAGE_SIZE, PAGE_TABLE_BUCKET_SIZE};
use crate::container::ExtendibleHashTable;
use crate::storage::disk::DiskManager;

use super::{Frame, LruKReplacer};

/// BufferPoolManager caches disk pages in a fixed set of frames. Frames are
/// handed out from the free list first, then by evicting the LRU-K victim;
/// dirty victims are written back before reuse. All metadata transitions
/// (page table, replacer, free list, pin counts) happen under one mutex;
/// page contents are protected separately by each frame's latch.
pub struct BufferPoolManager {
    pool_size: usize,
    frames: Vec<Arc<Frame>>,
    /// Free frames, most recently freed at the front; doubles as the pool
    /// metadata mutex
    free_list: Mutex<VecDeque<FrameId>>,
    /// Maps resident page ids to their frames
    page_table: ExtendibleHashTable<PageId, FrameId>,
    replacer: LruKReplacer,
    disk_manager: Arc<DiskManager>,
}

impl BufferPoolManager {
    pub fn new(pool_size: usize, replacer_k: usize, disk_manager: Arc<DiskManager>) -> Self {
        let mut frames = Vec::with_capacity(pool_size);
        let mut free_list = VecDeque::with_capacity(pool_size);

        for i in 0..pool_size {
            let frame_id = FrameId::new(i as u32);
            frames.push(Arc::new(Frame::new(frame_id)));
            free_list.push_back(frame_id);
        }

        Self {
            pool_size,
            frames,
            free_list: Mutex::new(free_list),
            page_table: ExtendibleHashTable::new(PAGE_TABLE_BUCKET_SIZE),
            replacer: LruKReplacer::new(pool_size, replacer_k),
            disk_manager,
        }
    }

    /// Allocates a fresh page pinned into a frame. Returns `Ok(None)` when
    /// every frame is pinned.
    pub fn new_page(&self) -> Result<Option<(PageId, Arc<Frame>)>> {
        let mut free_list = self.free_list.lock();

        let frame_id = match self.acquire_frame(&mut free_list)? {
            Some(frame_id) => frame_id,
            None => return Ok(None),
        };
        let frame = &self.frames[frame_id.as_usize()];

        let page_id = self.disk_manager.allocate_page()?;

        frame.set_page_id(page_id);
        frame.pin();

        self.page_table.insert(page_id, frame_id);
        self.replacer.record_access(frame_id);
        self.replacer.set_evictable(frame_id, false);

        Ok(Some((page_id, Arc::clone(frame))))
    }

    /// Pins the frame holding `page_id`, reading it from disk on a miss.
    /// Returns `Ok(None)` when the page is absent and no frame can be freed.
    pub fn fetch_page(&self, page_id: PageId) -> Result<Option<Arc<Frame>>> {
        if !page_id.is_valid() {
            return Err(StorageError::InvalidPageId(page_id));
        }
        let mut free_list = self.free_list.lock();

        if let Some(frame_id) = self.page_table.find(&page_id) {
            let frame = &self.frames[frame_id.as_usize()];
            frame.pin();
            self.replacer.record_access(frame_id);
            self.replacer.set_evictable(frame_id, false);
            return Ok(Some(Arc::clone(frame)));
        }

        let frame_id = match self.acquire_frame(&mut free_list)? {
            Some(frame_id) => frame_id,
            None => return Ok(None),
        };
        let frame = &self.frames[frame_id.as_usize()];

        let mut data = [0u8; PAGE_SIZE];
        self.disk_manager.read_page(page_id, &mut data)?;
        frame.copy_from(&data);
        frame.set_page_id(page_id);
        frame.set_dirty(false);
        frame.pin();

        self.page_table.insert(page_id, frame_id);
        self.replacer.record_access(frame_id);
        self.replacer.set_evictable(frame_id, false);

        Ok(Some(Arc::clone(frame)))
    }

    /// Releases one pin. Once the count reaches zero the frame becomes an
    /// eviction candidate. Returns false if the page is not resident or was
    /// not pinned.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let _free_list = self.free_list.lock();

        let frame_id = match self.page_table.find(&page_id) {
            Some(frame_id) if page_id.is_valid() => frame_id,
            _ => return false,
        };
        let frame = &self.frames[frame_id.as_usize()];

        if frame.pin_count() == 0 {
            return false;
        }
        if is_dirty {
            frame.set_dirty(true);
        }
        if let Some(0) = frame.unpin() {
            self.replacer.set_evictable(frame_id, true);
        }
        true
    }

    /// Writes the page back regardless of its dirty state and clears the
    /// dirty flag. Returns false if the page is not resident.
    ///
    /// The frame is pinned under the pool mutex but latched outside it, so
    /// flushing a page some other thread has write-latched cannot wedge the
    /// pool.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        if !page_id.is_valid() {
            return Ok(false);
        }

        let frame = {
            let _free_list = self.free_list.lock();
            match self.page_table.find(&page_id) {
                Some(frame_id) => {
                    let frame = &self.frames[frame_id.as_usize()];
                    frame.pin();
                    self.replacer.set_evictable(frame_id, false);
                    Arc::clone(frame)
                }
                None => return Ok(false),
            }
        };

        let mut data = [0u8; PAGE_SIZE];
        frame.copy_to(&mut data);
        let write_result = self.disk_manager.write_page(page_id, &data);
        if write_result.is_ok() {
            frame.set_dirty(false);
        }

        self.unpin_page(page_id, false);
        write_result?;
        Ok(true)
    }

    /// Flushes every resident page.
    pub fn flush_all_pages(&self) -> Result<()> {
        let resident: Vec<PageId> = {
            let _free_list = self.free_list.lock();
            self.frames
                .iter()
                .map(|frame| frame.page_id())
                .filter(|page_id| page_id.is_valid())
                .collect()
        };
        for page_id in resident {
            self.flush_page(page_id)?;
        }
        Ok(())
    }

    /// Evicts `page_id` from the pool and returns it to the disk manager.
    /// Idempotent: deleting a non-resident page succeeds. Returns false only
    /// when the page is still pinned.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        let mut free_list = self.free_list.lock();

        let frame_id = match self.page_table.find(&page_id) {
            Some(frame_id) if page_id.is_valid() => frame_id,
            _ => return Ok(true),
        };
        let frame = &self.frames[frame_id.as_usize()];

        if frame.pin_count() > 0 {
            return Ok(false);
        }

        debug!("deleting {} from frame {}", page_id, frame_id);
        self.replacer.remove(frame_id);
        frame.reset();
        free_list.push_front(frame_id);
        self.page_table.remove(&page_id);
        self.disk_manager.deallocate_page(page_id)?;
        Ok(true)
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn free_frame_count(&self) -> usize {
        self.free_list.lock().len()
    }

    /// Pin count of a resident page, `None` if absent.
    pub fn get_pin_count(&self, page_id: PageId) -> Option<u32> {
        let _free_list = self.free_list.lock();
        self.page_table
            .find(&page_id)
            .map(|frame_id| self.frames[frame_id.as_usize()].pin_count())
    }

    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        &self.disk_manager
    }

    /// Takes a frame from the free-list tail, or evicts a victim: dirty
    /// victims are written back, the buffer is zeroed, and the stale page
    /// table entry removed.
    fn acquire_frame(&self, free_list: &mut VecDeque<FrameId>) -> Result<Option<FrameId>> {
        if let Some(frame_id) = free_list.pop_back() {
            return Ok(Some(frame_id));
        }

        let frame_id = match self.replacer.evict() {
            Some(frame_id) => frame_id,
            None => return Ok(None),
        };
        let frame = &self.frames[frame_id.as_usize()];
        let old_page_id = frame.page_id();

        if frame.is_dirty() {
            debug!("evicting dirty {} from frame {}", old_page_id, frame_id);
            let mut data = [0u8; PAGE_SIZE];
            frame.copy_to(&mut data);
            self.disk_manager.write_page(old_page_id, &data)?;
        }

        frame.reset();
        self.page_table.remove(&old_page_id);
        Ok(Some(frame_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn create_bpm(pool_size: usize) -> (BufferPoolManager, NamedTempFile) {
        let temp_file = NamedTempFile::new().unwrap();
        let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
        (BufferPoolManager::new(pool_size, 2, dm), temp_file)
    }

    #[test]
    fn test_new_page_pins() {
        let (bpm, _temp) = create_bpm(10);

        let (page_id, frame) = bpm.new_page().unwrap().unwrap();
        assert_eq!(frame.pin_count(), 1);
        assert_eq!(bpm.get_pin_count(page_id), Some(1));
        assert_eq!(bpm.free_frame_count(), 9);
    }

    #[test]
    fn test_fetch_increments_pin() {
        let (bpm, _temp) = create_bpm(10);

        let (page_id, _frame) = bpm.new_page().unwrap().unwrap();
        let _again = bpm.fetch_page(page_id).unwrap().unwrap();
        assert_eq!(bpm.get_pin_count(page_id), Some(2));

        assert!(bpm.unpin_page(page_id, false));
        assert!(bpm.unpin_page(page_id, false));
        assert!(!bpm.unpin_page(page_id, false));
        assert_eq!(bpm.get_pin_count(page_id), Some(0));
    }

    #[test]
    fn test_unpin_absent_page() {
        let (bpm, _temp) = create_bpm(10);
        assert!(!bpm.unpin_page(PageId::new(42), false));
    }

    #[test]
    fn test_write_survives_eviction() {
        let (bpm, _temp) = create_bpm(3);

        let (page_id, frame) = bpm.new_page().unwrap().unwrap();
        frame.write_data()[0] = 0xAB;
        assert!(bpm.unpin_page(page_id, true));

        // Force the page out by filling the pool
        for _ in 0..3 {
            let (pid, _f) = bpm.new_page().unwrap().unwrap();
            bpm.unpin_page(pid, false);
        }

        let frame = bpm.fetch_page(page_id).unwrap().unwrap();
        assert_eq!(frame.read_data()[0], 0xAB);
        bpm.unpin_page(page_id, false);
    }

    #[test]
    fn test_delete_page() {
        let (bpm, _temp) = create_bpm(10);

        let (page_id, _frame) = bpm.new_page().unwrap().unwrap();

        // Pinned pages cannot be deleted
        assert!(!bpm.delete_page(page_id).unwrap());

        bpm.unpin_page(page_id, false);
        assert!(bpm.delete_page(page_id).unwrap());
        assert_eq!(bpm.get_pin_count(page_id), None);
        assert_eq!(bpm.free_frame_count(), 10);

        // Deleting again is fine
        assert!(bpm.delete_page(page_id).unwrap());
    }

    #[test]
    fn test_pool_exhaustion() {
        let (bpm, _temp) = create_bpm(2);

        let (_p1, _f1) = bpm.new_page().unwrap().unwrap();
        let (_p2, _f2) = bpm.new_page().unwrap().unwrap();

        assert!(bpm.new_page().unwrap().is_none());
    }

    #[test]
    fn test_flush_clears_dirty() {
        let (bpm, _temp) = create_bpm(10);

        let (page_id, frame) = bpm.new_page().unwrap().unwrap();
        frame.write_data()[10] = 9;
        bpm.unpin_page(page_id, true);

        assert!(frame.is_dirty());
        assert!(bpm.flush_page(page_id).unwrap());
        assert!(!frame.is_dirty());

        assert!(!bpm.flush_page(PageId::new(999)).unwrap());
    }
}
