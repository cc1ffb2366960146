use super::types::PageId;

/// Size of a page in bytes (4 KB)
pub const PAGE_SIZE: usize = 4096;

/// Sentinel meaning "no page"
pub const INVALID_PAGE_ID: PageId = PageId(-1);

/// Page 0 holds the (index name -> root page id) directory
pub const HEADER_PAGE_ID: PageId = PageId(0);

/// Default K for the LRU-K replacement policy
pub const DEFAULT_REPLACER_K: usize = 2;

/// Default buffer pool size (number of frames)
pub const DEFAULT_BUFFER_POOL_SIZE: usize = 10;

/// Bucket capacity of the buffer pool's page table
pub const PAGE_TABLE_BUCKET_SIZE: usize = 8;
