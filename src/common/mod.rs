pub mod config;
pub mod error;
pub mod types;

pub use config::*;
pub use error::{Result, StorageError};
pub use types::{FrameId, PageId, Rid};
