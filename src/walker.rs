//! Recursive filesystem walker (W1): pop a pending directory, enumerate it,
//! push its subdirectories, and accumulate one [`DirRecord`] per directory
//! visited. Single-threaded: the caller must serialize calls to [`step`].
//!
//! [`step`]: WalkState::step

use crate::error::{from_errno, last_errno, Error, Result};
use crate::path::{Name, Path, PathBuf};
use std::ffi::CStr;

/// The classification of one directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Regular,
    Directory,
}

/// One enumerated directory entry.
#[derive(Debug, Clone)]
pub struct FileEntry {
    pub kind: EntryKind,
    pub name: Name,
    pub inode: u64,
}

/// The walker's output for one visited directory.
#[derive(Debug)]
pub struct DirRecord {
    pub path: Path,
    pub entries: Vec<FileEntry>,
}

/// The finalized, immutable result of a completed walk.
#[derive(Debug)]
pub struct Record {
    pub dirs: Vec<DirRecord>,
}

/// In-progress walk state: directories discovered but not yet enumerated,
/// plus the directories already visited.
pub struct WalkState {
    pending: Vec<Path>,
    completed: Vec<DirRecord>,
}

impl WalkState {
    /// Starts a walk rooted at `start`. Fails with [`Error::NotDir`] if
    /// `start` is not a directory.
    pub fn new(start: Path) -> Result<Self> {
        let mut st = unsafe { std::mem::zeroed::<libc::stat>() };
        let cpath = to_cstring(&start)?;
        let rc = unsafe { libc::lstat(cpath.as_ptr(), &mut st) };
        if rc != 0 {
            return Err(from_errno(last_errno()));
        }
        if st.st_mode & libc::S_IFMT != libc::S_IFDIR {
            return Err(Error::NotDir);
        }

        Ok(Self {
            pending: vec![start],
            completed: Vec::new(),
        })
    }

    /// True once `finalize` may be called (no pending directories remain).
    pub fn is_done(&self) -> bool {
        self.pending.is_empty()
    }

    /// Performs one step: opens the next pending directory, enumerates it,
    /// pushes discovered subdirectories, and records the result.
    ///
    /// Returns `Ok(true)` when this was the last pending directory.
    /// Returns `Err(Error::FwSkip)` when the directory could not be opened
    /// due to access denial — not fatal, the caller should simply call
    /// `step` again. Any other error is fatal to the walk.
    pub fn step(&mut self) -> Result<bool> {
        if self.pending.is_empty() {
            return Err(Error::FwState);
        }
        let dir_path = self.pending.pop().expect("checked non-empty above");

        let cpath = to_cstring(&dir_path)?;
        let dir = unsafe { libc::opendir(cpath.as_ptr()) };
        if dir.is_null() {
            let errno = last_errno();
            if errno == libc::EACCES {
                return Err(Error::FwSkip);
            }
            return Err(from_errno(errno));
        }

        let result = self.scan_dir(dir, &dir_path);
        unsafe {
            libc::closedir(dir);
        }
        let entries = result?;

        let mut buf = PathBuf::new();
        for entry in &entries {
            if entry.kind == EntryKind::Directory {
                let child = buf.compose(&dir_path, &entry.name)?;
                self.pending.push(child);
            }
        }

        self.completed.push(DirRecord {
            path: dir_path,
            entries,
        });

        Ok(self.pending.is_empty())
    }

    fn scan_dir(&self, dir: *mut libc::DIR, dir_path: &Path) -> Result<Vec<FileEntry>> {
        let mut entries = Vec::new();
        let mut buf = PathBuf::new();

        // `readdir` returns null both at end-of-directory and on error;
        // like most directory iterators, we treat both as "no more entries"
        // rather than chase the platform-specific errno-clearing dance.
        loop {
            let ent = unsafe { libc::readdir(dir) };
            if ent.is_null() {
                break;
            }

            let name_cstr = unsafe { CStr::from_ptr((*ent).d_name.as_ptr()) };
            let name_bytes = name_cstr.to_bytes();
            if name_bytes == b"." || name_bytes == b".." {
                continue;
            }

            let d_type = unsafe { (*ent).d_type };
            let d_ino = unsafe { (*ent).d_ino } as u64;

            let kind = match classify(d_type) {
                Some(kind) => kind,
                None => {
                    // DT_UNKNOWN or a filesystem that never fills d_type:
                    // fall back to lstat on the composed path.
                    let name = match Name::new(name_bytes.to_vec()) {
                        Ok(name) => name,
                        Err(_) => continue,
                    };
                    let child_path = match buf.compose(dir_path, &name) {
                        Ok(p) => p,
                        Err(_) => continue,
                    };
                    match lstat_kind(&child_path) {
                        Ok(Some(kind)) => kind,
                        Ok(None) => {
                            log::debug!("walker: unsupported entry type at {}", child_path);
                            continue;
                        }
                        Err(Error::Access) => continue,
                        Err(_) => {
                            log::debug!("walker: unknown entry type at {}", child_path);
                            continue;
                        }
                    }
                }
            };

            let name = match Name::new(name_bytes.to_vec()) {
                Ok(name) => name,
                Err(_) => continue,
            };
            entries.push(FileEntry {
                kind,
                name,
                inode: d_ino,
            });
        }

        Ok(entries)
    }

    /// Consumes the state, producing the finalized [`Record`]. Fails with
    /// [`Error::FwState`] if the walk isn't finished.
    pub fn finalize(self) -> Result<Record> {
        if !self.pending.is_empty() {
            return Err(Error::FwState);
        }
        Ok(Record {
            dirs: self.completed,
        })
    }
}

fn classify(d_type: u8) -> Option<EntryKind> {
    match d_type {
        libc::DT_REG => Some(EntryKind::Regular),
        libc::DT_DIR => Some(EntryKind::Directory),
        _ => None,
    }
}

fn lstat_kind(path: &Path) -> Result<Option<EntryKind>> {
    let cpath = to_cstring(path)?;
    let mut st = unsafe { std::mem::zeroed::<libc::stat>() };
    let rc = unsafe { libc::lstat(cpath.as_ptr(), &mut st) };
    if rc != 0 {
        return Err(from_errno(last_errno()));
    }
    match st.st_mode & libc::S_IFMT {
        libc::S_IFREG => Ok(Some(EntryKind::Regular)),
        libc::S_IFDIR => Ok(Some(EntryKind::Directory)),
        _ => Ok(None),
    }
}

fn to_cstring(path: &Path) -> Result<std::ffi::CString> {
    std::ffi::CString::new(path.as_bytes()).map_err(|_| Error::InvalPath)
}
