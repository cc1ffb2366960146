use std::collections::HashMap;

use hashlink::LinkedHashMap;
use parking_lot::Mutex;

use crate::common::FrameId;

#[derive(Default)]
struct FrameInfo {
    access_count: usize,
    is_evictable: bool,
}

struct ReplacerState {
    /// Per-frame access count and evictability flag
    frames: HashMap<FrameId, FrameInfo>,
    /// Frames with fewer than k accesses, oldest first
    history_list: LinkedHashMap<FrameId, ()>,
    /// Frames with at least k accesses, ordered by recency (front = LRU)
    cache_list: LinkedHashMap<FrameId, ()>,
    /// Number of evictable frames across both lists
    curr_size: usize,
}

/// LRU-K replacement policy.
///
/// Frames with fewer than `k` recorded accesses have infinite backward
/// k-distance and live on the history list; once a frame reaches `k`
/// accesses it moves to the cache list and is refreshed on every further
/// access. Eviction scans the history list LRU-first, then the cache list,
/// so infrequently used frames are the preferred victims.
pub struct LruKReplacer {
    k: usize,
    /// Largest frame id the replacer will accept, exclusive
    replacer_size: usize,
    state: Mutex<ReplacerState>,
}

impl LruKReplacer {
    pub fn new(num_frames: usize, k: usize) -> Self {
        assert!(k > 0, "k must be positive");
        Self {
            k,
            replacer_size: num_frames,
            state: Mutex::new(ReplacerState {
                frames: HashMap::new(),
                history_list: LinkedHashMap::new(),
                cache_list: LinkedHashMap::new(),
                curr_size: 0,
            }),
        }
    }

    fn check_frame(&self, frame_id: FrameId) {
        assert!(
            frame_id.as_usize() < self.replacer_size,
            "{} out of range for replacer of size {}",
            frame_id,
            self.replacer_size
        );
    }

    /// Evicts the evictable frame with the largest backward k-distance:
    /// the LRU entry of the history list if any, otherwise the LRU entry
    /// of the cache list. Returns `None` when nothing is evictable.
    pub fn evict(&self) -> Option<FrameId> {
        let mut state = self.state.lock();
        if state.curr_size == 0 {
            return None;
        }

        let pick = |list: &LinkedHashMap<FrameId, ()>, frames: &HashMap<FrameId, FrameInfo>| {
            list.iter()
                .map(|(frame_id, _)| *frame_id)
                .find(|frame_id| frames[frame_id].is_evictable)
        };

        let victim = pick(&state.history_list, &state.frames)
            .or_else(|| pick(&state.cache_list, &state.frames))?;

        state.history_list.remove(&victim);
        state.cache_list.remove(&victim);
        state.frames.remove(&victim);
        state.curr_size -= 1;
        Some(victim)
    }

    /// Records an access. On the k-th access the frame graduates from the
    /// history list to the cache list; past that, each access refreshes its
    /// position at the MRU end of the cache list.
    pub fn record_access(&self, frame_id: FrameId) {
        self.check_frame(frame_id);
        let mut state = self.state.lock();

        let count = {
            let info = state.frames.entry(frame_id).or_default();
            info.access_count += 1;
            info.access_count
        };

        if count == self.k {
            state.history_list.remove(&frame_id);
            state.cache_list.insert(frame_id, ());
        } else if count > self.k {
            state.cache_list.remove(&frame_id);
            state.cache_list.insert(frame_id, ());
        } else if !state.history_list.contains_key(&frame_id) {
            state.history_list.insert(frame_id, ());
        }
    }

    /// Flips a frame's evictability. No-op for frames with no recorded
    /// access.
    pub fn set_evictable(&self, frame_id: FrameId, evictable: bool) {
        self.check_frame(frame_id);
        let mut state = self.state.lock();

        let transition = match state.frames.get_mut(&frame_id) {
            Some(info) if info.access_count > 0 => {
                let changed = info.is_evictable != evictable;
                info.is_evictable = evictable;
                changed
            }
            _ => false,
        };

        if transition {
            if evictable {
                state.curr_size += 1;
            } else {
                state.curr_size -= 1;
            }
        }
    }

    /// Drops a frame the caller has reclaimed, regardless of its position.
    /// No-op for frames the replacer has never seen.
    pub fn remove(&self, frame_id: FrameId) {
        self.check_frame(frame_id);
        let mut state = self.state.lock();

        if let Some(info) = state.frames.remove(&frame_id) {
            state.history_list.remove(&frame_id);
            state.cache_list.remove(&frame_id);
            if info.is_evictable {
                state.curr_size -= 1;
            }
        }
    }

    /// Number of evictable frames.
    pub fn size(&self) -> usize {
        self.state.lock().curr_size
    }

    pub fn k(&self) -> usize {
        self.k
    }
}
