use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};

use parking_lot::Mutex;

use crate::common::{PageId, Result, PAGE_SIZE};

/// DiskManager reads and writes fixed-size pages at page-aligned offsets in a
/// single database file. Page 0 is reserved for the header directory when the
/// file is created; data pages are handed out monotonically after it.
pub struct DiskManager {
    /// Database file, cursor guarded by the mutex
    file: Mutex<File>,
    /// Path of the database file
    db_path: PathBuf,
    /// Next page id to hand out
    next_page_id: AtomicI32,
    /// Number of page reads performed
    num_reads: AtomicU32,
    /// Number of page writes performed
    num_writes: AtomicU32,
}

impl DiskManager {
    /// Opens (or creates) the database file at the given path. A fresh file
    /// gets a zeroed page 0 so the header directory always exists.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&db_path)?;

        let num_pages = (file.metadata()?.len() / PAGE_SIZE as u64) as i32;

        let dm = Self {
            file: Mutex::new(file),
            db_path,
            next_page_id: AtomicI32::new(num_pages.max(1)),
            num_reads: AtomicU32::new(0),
            num_writes: AtomicU32::new(0),
        };

        if num_pages == 0 {
            let zeros = [0u8; PAGE_SIZE];
            dm.write_page(PageId::new(0), &zeros)?;
        }

        Ok(dm)
    }

    /// Reads a page from disk into the provided buffer. A read past the
    /// current end of file yields zeroed bytes.
    pub fn read_page(&self, page_id: PageId, data: &mut [u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "Buffer must be PAGE_SIZE bytes");
        assert!(page_id.is_valid(), "read_page on {}", page_id);

        let offset = (page_id.as_i32() as u64) * (PAGE_SIZE as u64);

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;

        let bytes_read = file.read(data)?;
        if bytes_read < PAGE_SIZE {
            data[bytes_read..].fill(0);
        }

        self.num_reads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Writes a page to disk from the provided buffer.
    pub fn write_page(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "Buffer must be PAGE_SIZE bytes");
        assert!(page_id.is_valid(), "write_page on {}", page_id);

        let offset = (page_id.as_i32() as u64) * (PAGE_SIZE as u64);

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;
        file.flush()?;

        self.num_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Allocates a new page and returns its id. The page region is zeroed so
    /// the file always covers every allocated page.
    pub fn allocate_page(&self) -> Result<PageId> {
        let page_id = PageId::new(self.next_page_id.fetch_add(1, Ordering::SeqCst));

        let zeros = [0u8; PAGE_SIZE];
        self.write_page(page_id, &zeros)?;

        Ok(page_id)
    }

    /// Returns a page to the disk manager. There is no free-space map; the
    /// region stays in the file until it is reused.
    pub fn deallocate_page(&self, _page_id: PageId) -> Result<()> {
        Ok(())
    }

    /// Number of pages the file currently covers.
    pub fn num_pages(&self) -> i32 {
        self.next_page_id.load(Ordering::Relaxed)
    }

    pub fn num_reads(&self) -> u32 {
        self.num_reads.load(Ordering::Relaxed)
    }

    pub fn num_writes(&self) -> u32 {
        self.num_writes.load(Ordering::Relaxed)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Forces everything down to the OS.
    pub fn sync(&self) -> Result<()> {
        self.file.lock().sync_all()?;
        Ok(())
    }
}

impl Drop for DiskManager {
    fn drop(&mut self) {
        let _ = self.file.get_mut().sync_all();
    }
}
