use crate::common::{PageId, PAGE_SIZE};

const RECORD_COUNT_OFFSET: usize = 0;
const RECORDS_OFFSET: usize = 4;

const NAME_SIZE: usize = 32;
const RECORD_SIZE: usize = NAME_SIZE + 4; // name + root page id
const MAX_RECORDS: usize = (PAGE_SIZE - RECORDS_OFFSET) / RECORD_SIZE;

/// Mutable view over the reserved header page (page 0). It stores
/// `(index_name, root_page_id)` records so indexes can find their root after
/// a restart.
pub struct HeaderPage<'a> {
    data: &'a mut [u8],
}

impl<'a> HeaderPage<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    pub fn init(&mut self) {
        self.data.fill(0);
        self.set_record_count(0);
    }

    pub fn record_count(&self) -> usize {
        u32::from_le_bytes(
            self.data[RECORD_COUNT_OFFSET..RECORD_COUNT_OFFSET + 4]
                .try_into()
                .unwrap(),
        ) as usize
    }

    fn set_record_count(&mut self, count: usize) {
        self.data[RECORD_COUNT_OFFSET..RECORD_COUNT_OFFSET + 4]
            .copy_from_slice(&(count as u32).to_le_bytes());
    }

    fn record_offset(index: usize) -> usize {
        RECORDS_OFFSET + index * RECORD_SIZE
    }

    fn name_at(&self, index: usize) -> &str {
        let offset = Self::record_offset(index);
        let raw = &self.data[offset..offset + NAME_SIZE];
        let len = raw.iter().position(|&b| b == 0).unwrap_or(NAME_SIZE);
        std::str::from_utf8(&raw[..len]).unwrap_or("")
    }

    fn root_at(&self, index: usize) -> PageId {
        let offset = Self::record_offset(index) + NAME_SIZE;
        PageId::new(i32::from_le_bytes(
            self.data[offset..offset + 4].try_into().unwrap(),
        ))
    }

    fn write_record(&mut self, index: usize, name: &str, root_page_id: PageId) {
        let offset = Self::record_offset(index);
        self.data[offset..offset + NAME_SIZE].fill(0);
        self.data[offset..offset + name.len()].copy_from_slice(name.as_bytes());
        self.data[offset + NAME_SIZE..offset + NAME_SIZE + 4]
            .copy_from_slice(&root_page_id.as_i32().to_le_bytes());
    }

    fn find_record(&self, name: &str) -> Option<usize> {
        (0..self.record_count()).find(|&i| self.name_at(i) == name)
    }

    /// Adds a record. Returns false if the name already exists or the page is
    /// full.
    pub fn insert_record(&mut self, name: &str, root_page_id: PageId) -> bool {
        assert!(name.len() <= NAME_SIZE, "index name too long");

        if self.find_record(name).is_some() {
            return false;
        }
        let count = self.record_count();
        if count >= MAX_RECORDS {
            return false;
        }

        self.write_record(count, name, root_page_id);
        self.set_record_count(count + 1);
        true
    }

    /// Overwrites the root page id of an existing record. Returns false if
    /// the name is unknown.
    pub fn update_record(&mut self, name: &str, root_page_id: PageId) -> bool {
        assert!(name.len() <= NAME_SIZE, "index name too long");

        match self.find_record(name) {
            Some(index) => {
                let offset = Self::record_offset(index) + NAME_SIZE;
                self.data[offset..offset + 4]
                    .copy_from_slice(&root_page_id.as_i32().to_le_bytes());
                true
            }
            None => false,
        }
    }

    /// Removes a record by swapping the last one into its slot.
    pub fn delete_record(&mut self, name: &str) -> bool {
        let count = self.record_count();
        match self.find_record(name) {
            Some(index) => {
                if index < count - 1 {
                    let last_name = self.name_at(count - 1).to_owned();
                    let last_root = self.root_at(count - 1);
                    self.write_record(index, &last_name, last_root);
                }
                self.set_record_count(count - 1);
                true
            }
            None => false,
        }
    }

    pub fn get_root_id(&self, name: &str) -> Option<PageId> {
        self.find_record(name).map(|i| self.root_at(i))
    }
}

/// Read-only view over the header page.
pub struct HeaderPageRef<'a> {
    data: &'a [u8],
}

impl<'a> HeaderPageRef<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    pub fn record_count(&self) -> usize {
        u32::from_le_bytes(
            self.data[RECORD_COUNT_OFFSET..RECORD_COUNT_OFFSET + 4]
                .try_into()
                .unwrap(),
        ) as usize
    }

    pub fn get_root_id(&self, name: &str) -> Option<PageId> {
        for i in 0..self.record_count() {
            let offset = RECORDS_OFFSET + i * RECORD_SIZE;
            let raw = &self.data[offset..offset + NAME_SIZE];
            let len = raw.iter().position(|&b| b == 0).unwrap_or(NAME_SIZE);
            if std::str::from_utf8(&raw[..len]).unwrap_or("") == name {
                let root = i32::from_le_bytes(
                    self.data[offset + NAME_SIZE..offset + NAME_SIZE + 4]
                        .try_into()
                        .unwrap(),
                );
                return Some(PageId::new(root));
            }
        }
        None
    }
}
