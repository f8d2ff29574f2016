use crate::error::ErrorCode;
use crate::noaa::warn::{self, WarnEvent};
use anyhow::{Context, Result};
use fs2::FileExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::io::{ErrorKind, Read, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, SystemTime};

pub const LOCK_RETRY_DELAY: Duration = Duration::from_millis(100);

/// What a reader observed of the backing file; a different stamp means the cache is stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStamp {
    pub modified: Option<SystemTime>,
    pub len: u64,
}

impl FileStamp {
    fn of(meta: &fs::Metadata) -> Self {
        Self {
            modified: meta.modified().ok(),
            len: meta.len(),
        }
    }
}

/// Exclusive writer lock on `<file>.lock`, released when dropped.
#[derive(Debug)]
pub struct WriteLock {
    _file: fs::File,
}

pub(crate) fn is_contended(err: &std::io::Error) -> bool {
    err.kind() == ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

/// A JSON array persisted as one indented UTF-8 file and replaced atomically on write.
#[derive(Debug)]
pub struct JsonArrayFile<T> {
    path: PathBuf,
    lock_path: PathBuf,
    _items: PhantomData<fn() -> T>,
}

#[derive(Debug)]
pub struct Rewrite<T, R> {
    pub items: Vec<T>,
    pub stamp: Option<FileStamp>,
    pub written: bool,
    pub result: R,
}

impl<T: Serialize + DeserializeOwned> JsonArrayFile<T> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut lock_name = path.file_name().unwrap_or_default().to_os_string();
        lock_name.push(".lock");
        let lock_path = path.with_file_name(lock_name);
        Self {
            path,
            lock_path,
            _items: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `None` when the file does not exist yet.
    pub fn stamp(&self) -> Result<Option<FileStamp>> {
        match fs::metadata(&self.path) {
            Ok(meta) => Ok(Some(FileStamp::of(&meta))),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).with_context(|| format!("failed to stat {}", self.path.display())),
        }
    }

    /// Reads every item. A missing or empty file is an empty array.
    pub fn read_all(&self) -> Result<(Vec<T>, Option<FileStamp>)> {
        let mut file = match fs::File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok((Vec::new(), None)),
            Err(err) => {
                return Err(err).with_context(|| format!("failed to open {}", self.path.display()));
            }
        };
        let stamp = file
            .metadata()
            .map(|meta| FileStamp::of(&meta))
            .with_context(|| format!("failed to stat {}", self.path.display()))?;

        let mut raw = String::new();
        file.read_to_string(&mut raw)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        if raw.trim().is_empty() {
            return Ok((Vec::new(), Some(stamp)));
        }
        let items = serde_json::from_str::<Vec<T>>(&raw).with_context(|| {
            format!(
                "{}: failed to parse {}",
                ErrorCode::E007StoreCorrupt.as_str(),
                self.path.display()
            )
        })?;
        Ok((items, Some(stamp)))
    }

    /// Blocks until the writer lock is held, retrying every [`LOCK_RETRY_DELAY`] while
    /// another writer holds it.
    pub fn lock_exclusive(&self) -> Result<WriteLock> {
        if let Some(parent) = self.lock_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let file = fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_path)
            .with_context(|| format!("failed to open {}", self.lock_path.display()))?;

        loop {
            match file.try_lock_exclusive() {
                Ok(()) => return Ok(WriteLock { _file: file }),
                Err(err) if is_contended(&err) => thread::sleep(LOCK_RETRY_DELAY),
                Err(err) if err.kind() == ErrorKind::Interrupted => {
                    warn::emit(&WarnEvent {
                        retry: "100ms",
                        reason: "lock-interrupted",
                        err: &err.to_string(),
                        ..WarnEvent::new(ErrorCode::E005BackingFileBusy, "store-lock", "retry")
                    });
                    thread::sleep(LOCK_RETRY_DELAY);
                }
                Err(err) => {
                    return Err(err).with_context(|| {
                        format!(
                            "{}: failed to lock {}",
                            ErrorCode::E005BackingFileBusy.as_str(),
                            self.lock_path.display()
                        )
                    });
                }
            }
        }
    }

    fn write_all(&self, items: &[T]) -> Result<Option<FileStamp>> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;

        let data = serde_json::to_string_pretty(items)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("failed to create temp file in {}", dir.display()))?;
        tmp.write_all(format!("{data}\n").as_bytes())
            .with_context(|| format!("failed to write {}", tmp.path().display()))?;
        tmp.as_file()
            .sync_all()
            .with_context(|| format!("failed to sync {}", tmp.path().display()))?;
        tmp.persist(&self.path)
            .map_err(|err| err.error)
            .with_context(|| format!("failed to replace {}", self.path.display()))?;
        self.stamp()
    }

    /// Read-modify-write under the writer lock. `mutate` reports whether it changed
    /// anything; nothing is written when it did not.
    pub fn rewrite<R>(&self, mutate: impl FnOnce(&mut Vec<T>) -> (bool, R)) -> Result<Rewrite<T, R>> {
        let _lock = self.lock_exclusive()?;
        let (mut items, stamp) = self.read_all()?;
        let (changed, result) = mutate(&mut items);
        if !changed {
            return Ok(Rewrite {
                items,
                stamp,
                written: false,
                result,
            });
        }
        let stamp = self.write_all(&items)?;
        Ok(Rewrite {
            items,
            stamp,
            written: true,
            result,
        })
    }
}
