pub mod lru;
pub mod replacer;

use crate::storage::disk::{FileId, FileManager};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::{PageBuf, PageId};
use crate::storage::PAGE_SIZE;
use log::{debug, warn};
use lru::LruReplacer;
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use replacer::{FrameId, Replacer};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Buffer pool configuration.
#[derive(Debug, Clone)]
pub struct BufferPoolConfig {
    /// Directory holding the paged files.
    pub data_dir: PathBuf,
    /// Number of page frames kept in memory.
    pub max_frames: usize,
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        BufferPoolConfig {
            data_dir: PathBuf::from("heap_data"),
            max_frames: 64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct BufferKey {
    file: FileId,
    page_id: PageId,
}

struct Frame {
    data: Arc<RwLock<PageBuf>>,
    key: Option<BufferKey>,
    pin_count: u32,
    is_dirty: bool,
}

impl Frame {
    fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new([0u8; PAGE_SIZE])),
            key: None,
            pin_count: 0,
            is_dirty: false,
        }
    }
}

struct PoolState {
    page_table: HashMap<BufferKey, FrameId>,
    frames: Vec<Frame>,
    free_list: Vec<FrameId>,
    replacer: Box<dyn Replacer>,
}

struct BufferPoolInner {
    files: FileManager,
    state: Mutex<PoolState>,
    max_frames: usize,
}

/// Page cache shared by every open file.
///
/// Pages are addressed by `(FileId, PageId)` and handed out as
/// [`PinnedPage`]s. A frame can only be evicted once its pin count is zero;
/// dirty frames are written back on eviction and on flush.
#[derive(Clone)]
pub struct BufferPoolManager {
    inner: Arc<BufferPoolInner>,
}

impl BufferPoolManager {
    pub fn new(config: BufferPoolConfig) -> StorageResult<Self> {
        let files = FileManager::new(config.data_dir)?;
        let replacer = Box::new(LruReplacer::new(config.max_frames));
        Ok(Self::with_replacer(files, replacer, config.max_frames))
    }

    pub fn with_replacer(files: FileManager, replacer: Box<dyn Replacer>, max_frames: usize) -> Self {
        Self {
            inner: Arc::new(BufferPoolInner {
                files,
                state: Mutex::new(PoolState {
                    page_table: HashMap::with_capacity(max_frames),
                    frames: Vec::with_capacity(max_frames),
                    free_list: Vec::new(),
                    replacer,
                }),
                max_frames,
            }),
        }
    }

    pub fn files(&self) -> &FileManager {
        &self.inner.files
    }

    /// Allocate a new page at the end of `file` and pin it.
    ///
    /// The page bytes are zeroed; formatting them is up to the caller.
    pub fn alloc_page(&self, file: FileId) -> StorageResult<(PageId, PinnedPage)> {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        let frame_id = self.inner.get_frame(state)?;

        let page_id = match self.inner.files.allocate_page(file) {
            Ok(page_id) => page_id,
            Err(e) => {
                state.free_list.push(frame_id);
                return Err(e);
            }
        };

        let key = BufferKey { file, page_id };
        let frame = &mut state.frames[frame_id as usize];
        frame.data.write().fill(0);
        frame.key = Some(key);
        frame.pin_count = 1;
        frame.is_dirty = false;
        let data = frame.data.clone();

        state.page_table.insert(key, frame_id);
        state.replacer.pin(frame_id);
        debug!("allocated page {} of file {} in frame {}", page_id, file, frame_id);

        Ok((page_id, PinnedPage::new(self.clone(), key, data)))
    }

    /// Pin a page of `file`, reading it from disk if it is not resident.
    pub fn read_page(&self, file: FileId, page_id: PageId) -> StorageResult<PinnedPage> {
        let key = BufferKey { file, page_id };
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;

        // Check if page is already in buffer pool
        if let Some(&frame_id) = state.page_table.get(&key) {
            let frame = &mut state.frames[frame_id as usize];
            frame.pin_count += 1;
            let data = frame.data.clone();
            state.replacer.pin(frame_id);
            return Ok(PinnedPage::new(self.clone(), key, data));
        }

        let frame_id = self.inner.get_frame(state)?;
        let frame = &mut state.frames[frame_id as usize];
        if let Err(e) = self
            .inner
            .files
            .read_page(file, page_id, &mut frame.data.write()[..])
        {
            state.free_list.push(frame_id);
            return Err(e);
        }
        frame.key = Some(key);
        frame.pin_count = 1;
        frame.is_dirty = false;
        let data = frame.data.clone();

        state.page_table.insert(key, frame_id);
        state.replacer.pin(frame_id);

        Ok(PinnedPage::new(self.clone(), key, data))
    }

    /// Drop one pin on a page; `dirty` marks the frame for write-back.
    pub fn unpin_page(&self, file: FileId, page_id: PageId, dirty: bool) -> StorageResult<()> {
        let key = BufferKey { file, page_id };
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;

        let frame_id = *state
            .page_table
            .get(&key)
            .ok_or(StorageError::PageNotResident { file, page_id })?;
        let frame = &mut state.frames[frame_id as usize];
        if frame.pin_count == 0 {
            return Err(StorageError::PageNotPinned { file, page_id });
        }

        frame.pin_count -= 1;
        frame.is_dirty |= dirty;
        if frame.pin_count == 0 {
            state.replacer.unpin(frame_id);
        }

        Ok(())
    }

    /// Write back every unpinned dirty page of `file` and drop its unpinned
    /// frames from the pool. Pinned frames stay resident.
    pub fn flush_file(&self, file: FileId) -> StorageResult<()> {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;

        let resident: Vec<(BufferKey, FrameId)> = state
            .page_table
            .iter()
            .filter(|(key, _)| key.file == file)
            .map(|(key, frame_id)| (*key, *frame_id))
            .collect();

        let mut still_pinned = 0;
        for (key, frame_id) in resident {
            let frame = &mut state.frames[frame_id as usize];
            if frame.pin_count > 0 {
                still_pinned += 1;
                continue;
            }
            if frame.is_dirty {
                self.inner
                    .files
                    .write_page(file, key.page_id, &frame.data.read()[..])?;
                frame.is_dirty = false;
            }
            frame.key = None;
            state.page_table.remove(&key);
            state.replacer.remove(frame_id);
            state.free_list.push(frame_id);
        }

        if still_pinned > 0 {
            debug!("flush of file {} left {} pinned pages resident", file, still_pinned);
        }
        self.inner.files.sync(file)
    }

    /// Write back every unpinned dirty page of every file.
    pub fn flush_all(&self) -> StorageResult<()> {
        self.inner.flush_all()
    }

    /// Outstanding pins on pages of `file`.
    pub fn pin_count(&self, file: FileId) -> u32 {
        let state = self.inner.state.lock();
        state
            .frames
            .iter()
            .filter(|frame| frame.key.is_some_and(|key| key.file == file))
            .map(|frame| frame.pin_count)
            .sum()
    }

    /// Outstanding pins across the whole pool.
    pub fn total_pins(&self) -> u32 {
        let state = self.inner.state.lock();
        state.frames.iter().map(|frame| frame.pin_count).sum()
    }

    pub fn resident_pages(&self) -> usize {
        self.inner.state.lock().page_table.len()
    }
}

impl BufferPoolInner {
    /// Find an empty frame: from the free list, by growing the pool, or by
    /// evicting an unpinned frame.
    fn get_frame(&self, state: &mut PoolState) -> StorageResult<FrameId> {
        if let Some(frame_id) = state.free_list.pop() {
            return Ok(frame_id);
        }

        if state.frames.len() < self.max_frames {
            state.frames.push(Frame::new());
            return Ok((state.frames.len() - 1) as FrameId);
        }

        let frame_id = state.replacer.evict().ok_or(StorageError::BufferPoolFull)?;
        let frame = &mut state.frames[frame_id as usize];
        if let Some(key) = frame.key {
            if frame.is_dirty {
                let written = self
                    .files
                    .write_page(key.file, key.page_id, &frame.data.read()[..]);
                if let Err(e) = written {
                    state.replacer.unpin(frame_id);
                    return Err(e);
                }
            }
            state.page_table.remove(&key);
        }

        frame.key = None;
        frame.pin_count = 0;
        frame.is_dirty = false;

        Ok(frame_id)
    }

    fn flush_all(&self) -> StorageResult<()> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let mut touched = BTreeSet::new();

        for frame in state.frames.iter_mut() {
            let Some(key) = frame.key else { continue };
            if frame.pin_count == 0 && frame.is_dirty {
                self.files
                    .write_page(key.file, key.page_id, &frame.data.read()[..])?;
                frame.is_dirty = false;
                touched.insert(key.file);
            }
        }

        for file in touched {
            self.files.sync(file)?;
        }
        Ok(())
    }
}

impl Drop for BufferPoolInner {
    fn drop(&mut self) {
        // Best effort flush on drop
        if let Err(e) = self.flush_all() {
            warn!("failed to flush buffer pool on shutdown: {}", e);
        }
    }
}

/// A pin on one page of a file.
///
/// The pin carries its own dirty flag, set with [`PinnedPage::mark_dirty`]
/// after modifying the bytes. Releasing the pin with [`PinnedPage::unpin`]
/// reports failures; dropping it unpins as well and only logs them.
pub struct PinnedPage {
    pool: BufferPoolManager,
    key: BufferKey,
    data: Arc<RwLock<PageBuf>>,
    dirty: bool,
    released: bool,
}

impl PinnedPage {
    fn new(pool: BufferPoolManager, key: BufferKey, data: Arc<RwLock<PageBuf>>) -> Self {
        Self {
            pool,
            key,
            data,
            dirty: false,
            released: false,
        }
    }

    pub fn page_id(&self) -> PageId {
        self.key.page_id
    }

    pub fn file(&self) -> FileId {
        self.key.file
    }

    pub fn read(&self) -> RwLockReadGuard<'_, PageBuf> {
        self.data.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, PageBuf> {
        self.data.write()
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn unpin(mut self) -> StorageResult<()> {
        self.release()
    }

    /// Unpin without consuming the guard; later calls are no-ops.
    pub(crate) fn release(&mut self) -> StorageResult<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        self.pool
            .unpin_page(self.key.file, self.key.page_id, self.dirty)
    }
}

impl fmt::Debug for PinnedPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PinnedPage")
            .field("file", &self.key.file)
            .field("page_id", &self.key.page_id)
            .field("dirty", &self.dirty)
            .finish()
    }
}

impl Drop for PinnedPage {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!(
                "failed to unpin page {} of file {}: {}",
                self.key.page_id, self.key.file, e
            );
        }
    }
}
