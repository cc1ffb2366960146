mod transaction;

pub use transaction::{PageLatch, Transaction};
