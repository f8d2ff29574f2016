use crate::error::RemoteError;
use crate::remote::{RemoteEntry, RemoteFileStore, RemoteStat};
use chrono::{DateTime, TimeZone, Utc};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::io::{Cursor, Read};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone)]
struct MemoryFile {
    bytes: Vec<u8>,
    modified: DateTime<Utc>,
}

/// In-process remote store for crawler and forecast tests.
///
/// Directories exist implicitly as prefixes of stored files.
#[derive(Debug, Default)]
pub struct MemoryStore {
    files: Mutex<BTreeMap<String, MemoryFile>>,
    failing: Mutex<HashSet<String>>,
    failing_deletes: Mutex<HashSet<String>>,
    reads: Mutex<Vec<String>>,
    raise_on_read: Mutex<Option<(String, Arc<AtomicBool>)>>,
    clock: Mutex<i64>,
}

fn normalize(path: &str) -> String {
    format!("/{}", path.trim_matches('/'))
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `bytes` at `path`; each put gets a later modification time.
    pub fn put(&self, path: &str, bytes: impl Into<Vec<u8>>) {
        let modified = {
            let mut clock = self.clock.lock().expect("clock");
            *clock += 1;
            Utc.timestamp_opt(1_680_000_000 + *clock, 0)
                .single()
                .expect("valid instant")
        };
        self.files.lock().expect("files").insert(
            normalize(path),
            MemoryFile {
                bytes: bytes.into(),
                modified,
            },
        );
    }

    pub fn remove(&self, path: &str) {
        self.files.lock().expect("files").remove(&normalize(path));
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.lock().expect("files").contains_key(&normalize(path))
    }

    /// Every call touching `path` fails with a 503 until cleared.
    pub fn fail_on(&self, path: &str) {
        self.failing.lock().expect("failing").insert(normalize(path));
    }

    /// Only deletes of `path` fail; reads and stats still succeed.
    pub fn fail_deletes_on(&self, path: &str) {
        self.failing_deletes
            .lock()
            .expect("failing deletes")
            .insert(normalize(path));
    }

    pub fn clear_failures(&self) {
        self.failing.lock().expect("failing").clear();
        self.failing_deletes.lock().expect("failing deletes").clear();
    }

    /// Sets `flag` the moment `path` is opened for reading.
    pub fn raise_on_read(&self, path: &str, flag: Arc<AtomicBool>) {
        *self.raise_on_read.lock().expect("raise on read") = Some((normalize(path), flag));
    }

    pub fn reads(&self) -> Vec<String> {
        self.reads.lock().expect("reads").clone()
    }

    fn check(&self, op: &'static str, path: &str) -> Result<String, RemoteError> {
        let path = normalize(path);
        if self.failing.lock().expect("failing").contains(&path) {
            return Err(RemoteError::Unavailable {
                op,
                path,
                status: 503,
            });
        }
        Ok(path)
    }
}

impl RemoteFileStore for MemoryStore {
    fn list_directory(&self, path: &str) -> Result<Vec<RemoteEntry>, RemoteError> {
        let dir = self.check("listing", path)?;
        let prefix = if dir == "/" { dir } else { format!("{dir}/") };
        let files = self.files.lock().expect("files");

        let mut dirs = BTreeSet::new();
        let mut out = Vec::new();
        for (full, file) in files.iter() {
            let Some(rest) = full.strip_prefix(&prefix) else {
                continue;
            };
            match rest.split_once('/') {
                Some((child, _)) => {
                    dirs.insert(child.to_string());
                }
                None => out.push(RemoteEntry {
                    name: rest.to_string(),
                    is_directory: false,
                    length: Some(file.bytes.len() as u64),
                    last_modified: Some(file.modified),
                }),
            }
        }
        out.extend(dirs.into_iter().map(|name| RemoteEntry {
            name,
            is_directory: true,
            length: None,
            last_modified: None,
        }));
        // Remote listings carry no ordering guarantee.
        out.reverse();
        Ok(out)
    }

    fn stat(&self, path: &str) -> Result<RemoteStat, RemoteError> {
        let path = self.check("stat", path)?;
        Ok(match self.files.lock().expect("files").get(&path) {
            Some(file) => RemoteStat {
                exists: true,
                length: Some(file.bytes.len() as u64),
                last_modified: Some(file.modified),
            },
            None => RemoteStat::missing(),
        })
    }

    fn open_read(&self, path: &str) -> Result<Box<dyn Read + Send>, RemoteError> {
        let path = self.check("reading", path)?;
        self.reads.lock().expect("reads").push(path.clone());
        if let Some((watched, flag)) = self.raise_on_read.lock().expect("raise on read").as_ref() {
            if *watched == path {
                flag.store(true, Ordering::SeqCst);
            }
        }
        match self.files.lock().expect("files").get(&path) {
            Some(file) => Ok(Box::new(Cursor::new(file.bytes.clone()))),
            None => Err(RemoteError::Unavailable {
                op: "reading",
                path,
                status: 404,
            }),
        }
    }

    fn delete_file(&self, path: &str) -> Result<bool, RemoteError> {
        let path = self.check("deleting", path)?;
        if self
            .failing_deletes
            .lock()
            .expect("failing deletes")
            .contains(&path)
        {
            return Err(RemoteError::Unavailable {
                op: "deleting",
                path,
                status: 403,
            });
        }
        Ok(self.files.lock().expect("files").remove(&path).is_some())
    }
}
