use super::replacer::{FrameId, Replacer};
use std::collections::{BTreeMap, HashMap};

/// Evicts the frame that has been unpinned the longest.
#[derive(Debug)]
pub struct LruReplacer {
    /// Evictable frames keyed by the tick at which they became evictable
    queue: BTreeMap<u64, FrameId>,
    ticks: HashMap<FrameId, u64>,
    clock: u64,
}

impl LruReplacer {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: BTreeMap::new(),
            ticks: HashMap::with_capacity(capacity),
            clock: 0,
        }
    }
}

impl Replacer for LruReplacer {
    fn evict(&mut self) -> Option<FrameId> {
        let (_, frame_id) = self.queue.pop_first()?;
        self.ticks.remove(&frame_id);
        Some(frame_id)
    }

    fn pin(&mut self, frame_id: FrameId) {
        if let Some(tick) = self.ticks.remove(&frame_id) {
            self.queue.remove(&tick);
        }
    }

    fn unpin(&mut self, frame_id: FrameId) {
        if self.ticks.contains_key(&frame_id) {
            return;
        }
        self.clock += 1;
        self.ticks.insert(frame_id, self.clock);
        self.queue.insert(self.clock, frame_id);
    }

    fn size(&self) -> usize {
        self.queue.len()
    }
}
