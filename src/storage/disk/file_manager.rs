use crate::storage::disk::PageManager;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::PageId;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::fmt;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

/// Handle to an open file. Ids are never reused within one manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(pub u32);

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

struct OpenFile {
    name: String,
    pages: Mutex<PageManager>,
    open_count: usize,
}

/// Registry of named paged files inside one data directory.
///
/// Opening a file that is already open hands out the same [`FileId`] and
/// bumps its open count; the OS file is closed when the count drops to zero.
pub struct FileManager {
    base_dir: PathBuf,
    open_files: DashMap<FileId, OpenFile>,
    name_to_id: DashMap<String, FileId>,
    next_file_id: AtomicU32,
}

impl FileManager {
    pub fn new(base_dir: impl Into<PathBuf>) -> StorageResult<Self> {
        let base_dir = base_dir.into();
        std::fs::create_dir_all(&base_dir)?;

        Ok(Self {
            base_dir,
            open_files: DashMap::new(),
            name_to_id: DashMap::new(),
            next_file_id: AtomicU32::new(0),
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn create_file(&self, name: &str) -> StorageResult<()> {
        let path = self.resolve(name)?;

        match PageManager::create(&path) {
            Ok(_) => Ok(()),
            Err(StorageError::Io(e)) if e.kind() == ErrorKind::AlreadyExists => {
                Err(StorageError::FileExists(name.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    pub fn open_file(&self, name: &str) -> StorageResult<FileId> {
        let path = self.resolve(name)?;

        match self.name_to_id.entry(name.to_string()) {
            Entry::Occupied(entry) => {
                let file = *entry.get();
                let mut open_file = self
                    .open_files
                    .get_mut(&file)
                    .ok_or(StorageError::FileNotOpen(file))?;
                open_file.open_count += 1;
                Ok(file)
            }
            Entry::Vacant(entry) => {
                let pages = match PageManager::open(&path) {
                    Ok(pages) => pages,
                    Err(StorageError::Io(e)) if e.kind() == ErrorKind::NotFound => {
                        return Err(StorageError::FileNotFound(name.to_string()));
                    }
                    Err(e) => return Err(e),
                };

                let file = FileId(self.next_file_id.fetch_add(1, Ordering::SeqCst));
                self.open_files.insert(
                    file,
                    OpenFile {
                        name: name.to_string(),
                        pages: Mutex::new(pages),
                        open_count: 1,
                    },
                );
                entry.insert(file);
                Ok(file)
            }
        }
    }

    pub fn close_file(&self, file: FileId) -> StorageResult<()> {
        let remaining = {
            let mut open_file = self
                .open_files
                .get_mut(&file)
                .ok_or(StorageError::FileNotOpen(file))?;
            open_file.open_count -= 1;
            open_file.open_count
        };

        if remaining == 0 {
            if let Some((_, open_file)) = self.open_files.remove(&file) {
                self.name_to_id.remove(&open_file.name);
                open_file.pages.lock().sync()?;
            }
        }

        Ok(())
    }

    /// Delete a file from disk. Open files cannot be destroyed.
    pub fn destroy_file(&self, name: &str) -> StorageResult<()> {
        let path = self.resolve(name)?;

        if self.name_to_id.contains_key(name) {
            return Err(StorageError::FileInUse(name.to_string()));
        }

        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StorageError::FileNotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn is_open(&self, name: &str) -> bool {
        self.name_to_id.contains_key(name)
    }

    pub fn file_name(&self, file: FileId) -> StorageResult<String> {
        self.open_files
            .get(&file)
            .map(|open_file| open_file.name.clone())
            .ok_or(StorageError::FileNotOpen(file))
    }

    pub fn read_page(&self, file: FileId, page_id: PageId, buf: &mut [u8]) -> StorageResult<()> {
        self.with_pages(file, |pages| pages.read_page(page_id, buf))
    }

    pub fn write_page(&self, file: FileId, page_id: PageId, data: &[u8]) -> StorageResult<()> {
        self.with_pages(file, |pages| pages.write_page(page_id, data))
    }

    pub fn allocate_page(&self, file: FileId) -> StorageResult<PageId> {
        self.with_pages(file, |pages| pages.allocate_page())
    }

    pub fn first_page(&self, file: FileId) -> StorageResult<PageId> {
        self.with_pages(file, |pages| pages.first_page())
    }

    pub fn num_pages(&self, file: FileId) -> StorageResult<u32> {
        self.with_pages(file, |pages| pages.num_pages())
    }

    pub fn sync(&self, file: FileId) -> StorageResult<()> {
        self.with_pages(file, |pages| pages.sync())
    }

    fn with_pages<T>(
        &self,
        file: FileId,
        f: impl FnOnce(&mut PageManager) -> StorageResult<T>,
    ) -> StorageResult<T> {
        let open_file = self
            .open_files
            .get(&file)
            .ok_or(StorageError::FileNotOpen(file))?;
        let mut pages = open_file.pages.lock();
        f(&mut pages)
    }

    fn resolve(&self, name: &str) -> StorageResult<PathBuf> {
        let mut components = Path::new(name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(self.base_dir.join(name)),
            _ => Err(StorageError::InvalidFileName(name.to_string())),
        }
    }
}
