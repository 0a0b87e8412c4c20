use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use facet_shared::log::{info, trace, warn};
use serde::{Deserialize, Serialize};

use crate::{
    common::{meta_path, modified_ticks, CACHE_FILE_NAME},
    Error, Result,
};

/// Modification times of an asset and its sidecar metadata file.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TimeStamps {
    /// Last write time of the asset in nanoseconds since the epoch.
    pub file_time: u64,
    /// Last write time of the metadata file or 0 when there is none.
    pub meta_time: u64,
}

impl TimeStamps {
    /// Reads the current time stamps of the asset from the file system.
    pub fn of(file: &Path) -> Self {
        Self {
            file_time: modified_ticks(file),
            meta_time: modified_ticks(&meta_path(file)),
        }
    }
}

/// One record of the persisted cache.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CacheRecord {
    file: PathBuf,
    last_file_write_time: u64,
    last_meta_write_time: u64,
}

/// Remembers the time stamps of every file at the moment it was last packed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FileStateCache {
    entries: BTreeMap<PathBuf, TimeStamps>,
}

impl FileStateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Path of the cache file of the workspace.
    pub fn path(workspace_root: &Path) -> PathBuf {
        workspace_root.join(CACHE_FILE_NAME)
    }

    /// Loads the cache of the workspace. A missing or corrupt file results in an empty cache.
    pub fn load(workspace_root: &Path) -> Self {
        let path = Self::path(workspace_root);
        let Ok(content) = fs::read_to_string(&path) else {
            info!("No file cache found at '{}', every file will be packed", path.display());
            return Self::new();
        };
        match serde_yaml::from_str::<Option<Vec<CacheRecord>>>(&content) {
            Ok(records) => {
                let entries = records
                    .unwrap_or_default()
                    .into_iter()
                    .map(|record| {
                        let time_stamps = TimeStamps {
                            file_time: record.last_file_write_time,
                            meta_time: record.last_meta_write_time,
                        };
                        (record.file, time_stamps)
                    })
                    .collect();
                Self { entries }
            }
            Err(err) => {
                warn!("Failed to parse file cache '{}', starting empty: {err}", path.display());
                Self::new()
            }
        }
    }

    /// Writes the cache into the workspace, replacing the previous file.
    pub fn save(&self, workspace_root: &Path) -> Result<()> {
        let path = Self::path(workspace_root);
        let records = self
            .entries
            .iter()
            .map(|(file, time_stamps)| CacheRecord {
                file: file.clone(),
                last_file_write_time: time_stamps.file_time,
                last_meta_write_time: time_stamps.meta_time,
            })
            .collect::<Vec<_>>();
        let content = serde_yaml::to_string(&records).map_err(|err| Error::Serialization {
            path: path.clone(),
            message: err.to_string(),
        })?;
        if path.exists() {
            fs::remove_file(&path)?;
        }
        fs::write(&path, content)?;
        info!("Saved {} entries to the file cache '{}'", self.entries.len(), path.display());
        Ok(())
    }

    /// Returns whether the file changed since it was last packed.
    ///
    /// When it did, the cache is updated to the current time stamps right away,
    /// so this must only be called when the file is actually going to be packed.
    pub fn should_pack(&mut self, file: &Path) -> bool {
        let current = TimeStamps::of(file);
        match self.entries.get(file) {
            Some(cached) if *cached == current => {
                trace!("Unchanged since the last pack: {}", file.display());
                false
            }
            _ => {
                self.entries.insert(file.to_owned(), current);
                true
            }
        }
    }

    /// Forgets the file so that it is packed again by the next run.
    pub fn invalidate(&mut self, file: &Path) {
        self.entries.remove(file);
    }

    /// Forgets every file.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn contains(&self, file: &Path) -> bool {
        self.entries.contains_key(file)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
