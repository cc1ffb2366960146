mod btree_internal_page;
mod btree_leaf_page;
mod btree_page;
mod header_page;

pub use btree_internal_page::{internal_page_capacity, InternalPage, InternalPageRef};
pub use btree_leaf_page::{leaf_page_capacity, LeafPage, LeafPageRef};
pub use btree_page::{BTreePage, BTreePageRef, IndexPageType};
pub use header_page::{HeaderPage, HeaderPageRef};
