pub mod b_plus_tree;
pub mod generic_key;
pub mod index_iterator;
pub mod key_comparator;

pub use b_plus_tree::BPlusTree;
pub use generic_key::GenericKey;
pub use index_iterator::IndexIterator;
pub use key_comparator::{BytewiseComparator, IntegerComparator, KeyComparator};
