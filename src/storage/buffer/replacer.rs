use std::fmt::Debug;

pub type FrameId = u32;

/// Victim selection among frames whose pin count dropped to zero.
pub trait Replacer: Send + Sync + Debug {
    /// Select a frame to evict. Returns None if no frame can be evicted.
    fn evict(&mut self) -> Option<FrameId>;

    /// Mark a frame as pinned (not evictable).
    fn pin(&mut self, frame_id: FrameId);

    /// Mark a frame as unpinned (evictable).
    fn unpin(&mut self, frame_id: FrameId);

    /// Forget a frame that went back to the free list.
    fn remove(&mut self, frame_id: FrameId) {
        self.pin(frame_id);
    }

    /// Get the number of evictable frames.
    fn size(&self) -> usize;
}
