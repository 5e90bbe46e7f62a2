// LRU-K Replacement Policy
//
// Picks the evictable frame with the largest backward k-distance: the time
// between now and the k-th most recent access. Frames with fewer than k
// recorded accesses have infinite distance; ties among those are broken by
// the oldest overall access (classic LRU).

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

use crate::common::types::FrameId;
use crate::storage::buffer::error::BufferPoolError;

#[derive(Default)]
struct LruKNode {
    /// Access timestamps, newest first, bounded to k entries
    history: VecDeque<u64>,
    is_evictable: bool,
}

impl LruKNode {
    /// Oldest recorded access
    fn oldest(&self) -> u64 {
        *self.history.back().unwrap_or(&0)
    }
}

struct LruKState {
    node_store: HashMap<FrameId, LruKNode>,
    current_timestamp: u64,
    evictable_count: usize,
}

pub struct LruKReplacer {
    state: Mutex<LruKState>,
    num_frames: usize,
    k: usize,
}

impl LruKReplacer {
    pub fn new(num_frames: usize, k: usize) -> Self {
        Self {
            state: Mutex::new(LruKState {
                node_store: HashMap::new(),
                current_timestamp: 0,
                evictable_count: 0,
            }),
            num_frames,
            k: k.max(1),
        }
    }

    /// Record an access to the frame at the current logical time. Frame ids
    /// outside the pool are silently ignored to keep the interface total.
    pub fn record_access(&self, frame_id: FrameId) {
        if frame_id as usize >= self.num_frames {
            return;
        }
        let mut state = self.state.lock();
        let now = state.current_timestamp;
        state.current_timestamp += 1;
        let node = state.node_store.entry(frame_id).or_default();
        if node.history.len() == self.k {
            node.history.pop_back();
        }
        node.history.push_front(now);
    }

    /// Flip a frame's evictability, adjusting the evictable count.
    pub fn set_evictable(&self, frame_id: FrameId, evictable: bool) {
        if frame_id as usize >= self.num_frames {
            return;
        }
        let mut state = self.state.lock();
        let state = &mut *state;
        if let Some(node) = state.node_store.get_mut(&frame_id) {
            if evictable && !node.is_evictable {
                node.is_evictable = true;
                state.evictable_count += 1;
            } else if !evictable && node.is_evictable {
                node.is_evictable = false;
                state.evictable_count -= 1;
            }
        }
    }

    /// Choose and remove the eviction victim, if any frame is evictable.
    pub fn evict(&self) -> Option<FrameId> {
        let mut state = self.state.lock();
        if state.evictable_count == 0 {
            return None;
        }
        let now = state.current_timestamp;

        let mut victim: Option<FrameId> = None;
        // (is_infinite, distance, oldest access) of the current best pick
        let mut best: Option<(bool, u64, u64)> = None;
        for (&frame_id, node) in state.node_store.iter() {
            if !node.is_evictable {
                continue;
            }
            let infinite = node.history.len() < self.k;
            let distance = if infinite { u64::MAX } else { now - node.oldest() };
            let candidate = (infinite, distance, node.oldest());
            let better = match best {
                None => true,
                Some((best_inf, best_dist, best_oldest)) => {
                    if infinite != best_inf {
                        infinite
                    } else if infinite {
                        candidate.2 < best_oldest
                    } else {
                        distance > best_dist
                    }
                }
            };
            if better {
                best = Some(candidate);
                victim = Some(frame_id);
            }
        }

        let frame_id = victim?;
        state.node_store.remove(&frame_id);
        state.evictable_count -= 1;
        Some(frame_id)
    }

    /// Force a frame out of the replacer. Errors if the frame is tracked but
    /// not evictable; removing an untracked frame is a no-op.
    pub fn remove(&self, frame_id: FrameId) -> Result<(), BufferPoolError> {
        if frame_id as usize >= self.num_frames {
            return Ok(());
        }
        let mut state = self.state.lock();
        if let Some(node) = state.node_store.get(&frame_id) {
            if !node.is_evictable {
                return Err(BufferPoolError::FrameNotEvictable(frame_id));
            }
            state.node_store.remove(&frame_id);
            state.evictable_count -= 1;
        }
        Ok(())
    }

    /// Number of evictable frames.
    pub fn size(&self) -> usize {
        self.state.lock().evictable_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evict_prefers_infinite_distance() {
        let replacer = LruKReplacer::new(7, 2);

        // Frame 1 gets two accesses, frame 2 only one.
        replacer.record_access(1);
        replacer.record_access(1);
        replacer.record_access(2);
        replacer.set_evictable(1, true);
        replacer.set_evictable(2, true);

        // Frame 2 has fewer than k accesses, so its distance is infinite.
        assert_eq!(replacer.evict(), Some(2));
        assert_eq!(replacer.evict(), Some(1));
        assert_eq!(replacer.evict(), None);
    }

    #[test]
    fn test_infinite_ties_broken_by_oldest_access() {
        let replacer = LruKReplacer::new(7, 3);
        replacer.record_access(1);
        replacer.record_access(2);
        replacer.record_access(3);
        for id in 1..=3 {
            replacer.set_evictable(id, true);
        }

        // All have < k accesses; earliest-touched goes first.
        assert_eq!(replacer.evict(), Some(1));
        assert_eq!(replacer.evict(), Some(2));
        assert_eq!(replacer.evict(), Some(3));
    }

    #[test]
    fn test_k_distance_ordering() {
        let replacer = LruKReplacer::new(7, 2);
        // Access pattern: 1, 2, 1, 2, 1 -- both have >= 2 accesses.
        replacer.record_access(1); // t=0
        replacer.record_access(2); // t=1
        replacer.record_access(1); // t=2
        replacer.record_access(2); // t=3
        replacer.record_access(1); // t=4
        replacer.set_evictable(1, true);
        replacer.set_evictable(2, true);

        // Backward k-distance: frame 1 = now-2, frame 2 = now-1.
        assert_eq!(replacer.evict(), Some(1));
    }

    #[test]
    fn test_k_equals_one_reduces_to_lru() {
        let replacer = LruKReplacer::new(4, 1);
        replacer.record_access(0);
        replacer.record_access(1);
        replacer.record_access(2);
        replacer.record_access(0); // 0 becomes most recent
        for id in 0..3 {
            replacer.set_evictable(id, true);
        }

        assert_eq!(replacer.evict(), Some(1));
        assert_eq!(replacer.evict(), Some(2));
        assert_eq!(replacer.evict(), Some(0));
    }

    #[test]
    fn test_non_evictable_frames_are_skipped() {
        let replacer = LruKReplacer::new(4, 2);
        replacer.record_access(0);
        replacer.record_access(1);
        replacer.set_evictable(0, false);
        replacer.set_evictable(1, true);
        assert_eq!(replacer.size(), 1);
        assert_eq!(replacer.evict(), Some(1));
        assert_eq!(replacer.evict(), None);
    }

    #[test]
    fn test_remove_requires_evictable() {
        let replacer = LruKReplacer::new(4, 2);
        replacer.record_access(0);
        assert!(replacer.remove(0).is_err());
        replacer.set_evictable(0, true);
        assert!(replacer.remove(0).is_ok());
        assert_eq!(replacer.size(), 0);
        // Untracked frames are a no-op.
        assert!(replacer.remove(3).is_ok());
    }

    #[test]
    fn test_out_of_range_frames_ignored() {
        let replacer = LruKReplacer::new(2, 2);
        replacer.record_access(10);
        replacer.set_evictable(10, true);
        assert_eq!(replacer.size(), 0);
        assert_eq!(replacer.evict(), None);
    }
}
