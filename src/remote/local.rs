use crate::error::RemoteError;
use crate::remote::{RemoteEntry, RemoteFileStore, RemoteStat};
use chrono::{DateTime, Utc};
use std::fs;
use std::io::{ErrorKind, Read};
use std::path::PathBuf;

/// Remote store rooted at a local directory (a mounted share or a test fixture).
#[derive(Debug, Clone)]
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

fn modified_utc(meta: &fs::Metadata) -> Option<DateTime<Utc>> {
    meta.modified().ok().map(DateTime::<Utc>::from)
}

fn io_error(op: &'static str, path: &str, source: std::io::Error) -> RemoteError {
    RemoteError::Io {
        op,
        path: path.to_string(),
        source,
    }
}

impl RemoteFileStore for LocalFileStore {
    fn list_directory(&self, path: &str) -> Result<Vec<RemoteEntry>, RemoteError> {
        let dir = self.resolve(path);
        let read_dir = match fs::read_dir(&dir) {
            Ok(read_dir) => read_dir,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(io_error("listing", path, err)),
        };

        let mut out = Vec::new();
        for entry in read_dir {
            let entry = entry.map_err(|err| io_error("listing", path, err))?;
            let meta = entry
                .metadata()
                .map_err(|err| io_error("listing", path, err))?;
            out.push(RemoteEntry {
                name: entry.file_name().to_string_lossy().to_string(),
                is_directory: meta.is_dir(),
                length: meta.is_file().then(|| meta.len()),
                last_modified: modified_utc(&meta),
            });
        }
        Ok(out)
    }

    fn stat(&self, path: &str) -> Result<RemoteStat, RemoteError> {
        match fs::metadata(self.resolve(path)) {
            Ok(meta) => Ok(RemoteStat {
                exists: true,
                length: meta.is_file().then(|| meta.len()),
                last_modified: modified_utc(&meta),
            }),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(RemoteStat::missing()),
            Err(err) => Err(io_error("stat", path, err)),
        }
    }

    fn open_read(&self, path: &str) -> Result<Box<dyn Read + Send>, RemoteError> {
        let file = fs::File::open(self.resolve(path)).map_err(|err| io_error("opening", path, err))?;
        Ok(Box::new(file))
    }

    fn delete_file(&self, path: &str) -> Result<bool, RemoteError> {
        match fs::remove_file(self.resolve(path)) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(io_error("deleting", path, err)),
        }
    }
}
