use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use crate::common::{PageId, PAGE_SIZE};

use super::Frame;

/// RAII holder of a frame's reader latch. Latching is deliberately separate
/// from pinning: the buffer pool pins on fetch and the caller unpins
/// explicitly, so a guard can be stored in an operation's page set and
/// dropped top-down during crabbing.
pub struct PageReadGuard {
    frame: Arc<Frame>,
    guard: Option<RwLockReadGuard<'static, Box<[u8; PAGE_SIZE]>>>,
}

impl PageReadGuard {
    /// Blocks until the frame's reader latch is available.
    pub fn latch(frame: Arc<Frame>) -> Self {
        let guard = frame.data.read();
        // Safety: the guard borrows from the RwLock inside `frame`, whose
        // heap allocation is kept alive by the Arc stored alongside it and
        // is never moved. The guard is dropped before the Arc in `drop`.
        let guard: RwLockReadGuard<'static, Box<[u8; PAGE_SIZE]>> =
            unsafe { std::mem::transmute(guard) };
        Self {
            frame,
            guard: Some(guard),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.frame.page_id()
    }

    pub fn frame(&self) -> &Arc<Frame> {
        &self.frame
    }

    pub fn data(&self) -> &[u8] {
        &self.guard.as_ref().unwrap()[..]
    }
}

impl Deref for PageReadGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl Drop for PageReadGuard {
    fn drop(&mut self) {
        self.guard.take();
    }
}

/// RAII holder of a frame's writer latch. Excludes all readers for its
/// lifetime; dirty-flag bookkeeping stays with the explicit unpin.
pub struct PageWriteGuard {
    frame: Arc<Frame>,
    guard: Option<RwLockWriteGuard<'static, Box<[u8; PAGE_SIZE]>>>,
}

impl PageWriteGuard {
    /// Blocks until the frame's writer latch is available.
    pub fn latch(frame: Arc<Frame>) -> Self {
        let guard = frame.data.write();
        // Safety: same argument as PageReadGuard::latch.
        let guard: RwLockWriteGuard<'static, Box<[u8; PAGE_SIZE]>> =
            unsafe { std::mem::transmute(guard) };
        Self {
            frame,
            guard: Some(guard),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.frame.page_id()
    }

    pub fn frame(&self) -> &Arc<Frame> {
        &self.frame
    }

    pub fn data(&self) -> &[u8] {
        &self.guard.as_ref().unwrap()[..]
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.guard.as_mut().unwrap()[..]
    }
}

impl Deref for PageWriteGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl DerefMut for PageWriteGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.data_mut()
    }
}

impl Drop for PageWriteGuard {
    fn drop(&mut self) {
        self.guard.take();
    }
}
