use crate::noaa::model::SatellitePass;
use crate::noaa::store::{FileStamp, JsonArrayFile};
use anyhow::Result;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug)]
struct CachedCatalog {
    stamp: Option<FileStamp>,
    passes: Arc<Vec<SatellitePass>>,
}

/// Append-only catalog of processed passes, unique by `(site, file_key)`.
#[derive(Debug)]
pub struct CatalogStore {
    file: JsonArrayFile<SatellitePass>,
    cache: Mutex<Option<CachedCatalog>>,
}

impl CatalogStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            file: JsonArrayFile::new(path),
            cache: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// All passes in insertion order. Served from memory while the file is unchanged.
    pub fn get(&self) -> Result<Arc<Vec<SatellitePass>>> {
        let current = self.file.stamp()?;
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(cached) = cache.as_ref() {
            if cached.stamp == current {
                return Ok(Arc::clone(&cached.passes));
            }
        }

        let (passes, stamp) = self.file.read_all()?;
        let passes = Arc::new(passes);
        *cache = Some(CachedCatalog {
            stamp,
            passes: Arc::clone(&passes),
        });
        Ok(passes)
    }

    pub fn site_keys(&self, site: &str) -> Result<HashSet<String>> {
        Ok(self
            .get()?
            .iter()
            .filter(|pass| pass.site == site)
            .map(|pass| pass.file_key.clone())
            .collect())
    }

    /// Appends `pass` unless its `(site, file_key)` is already cataloged.
    pub fn insert(&self, pass: SatellitePass) -> Result<bool> {
        let done = self.file.rewrite(|passes| {
            let known = passes
                .iter()
                .any(|p| p.site == pass.site && p.file_key == pass.file_key);
            if known {
                return (false, false);
            }
            passes.push(pass);
            (true, true)
        })?;

        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        *cache = Some(CachedCatalog {
            stamp: done.stamp,
            passes: Arc::new(done.items),
        });
        Ok(done.result)
    }
}
