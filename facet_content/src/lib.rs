//! # Overview
//!
//! Crate for [packing](PackEngine) and [updating](UpdateEngine) the assets of
//! a workspace.
//!
//! This crate is based around the idea of two structurally mirrored directory
//! trees. One is the workspace, which contains the source assets, and the
//! other is the output directory, which contains the packed assets. Every
//! directory of the workspace exists at the same relative location in the
//! output directory. Files with an [`Encoder`] are converted into the mirrored
//! directory, all other files are copied unless their extension is excluded.
//!
//! Next to an asset there may be a metadata file with the additional
//! extension `.meta` which is maintained by the encoder of the asset.
//!
//! ## Example:
//!
//! **Workspace:**
//!
//! ```text
//! Workspace/
//! ├─ config.workspace
//! ├─ Files.cache
//! ├─ Textures/
//! │  ├─ stone.png
//! │  ├─ stone.png.meta
//! ├─ Text/
//! │  ├─ credits.txt
//! ```
//!
//! **Output Directory:**
//!
//! ```text
//! Assets/
//! ├─ Textures/
//! │  ├─ stone.texture
//! ├─ Text/
//! │  ├─ credits.txt
//! ```
//!
//! # Components
//!
//! The [`Session`] owns the [`WorkspaceConfig`] and the [`FileStateCache`] of a
//! workspace and runs the engines on it. The [`ChangeReactor`] drives a
//! session from a queue of file system events and user commands.

mod common;
mod encoder;
mod encoder_registry;
mod file_cache;
mod pack;
mod reactor;
mod scanner;
mod session;
mod update;
mod watcher;
mod workspace_config;

pub use common::{asset_path_of_meta, is_meta_file, meta_path, AssetKey, Directories, Error, Operation, Result};
pub use common::{CACHE_FILE_NAME, CONFIG_FILE_NAME, META_EXTENSION};
pub use encoder::*;
pub use encoder_registry::*;
pub use file_cache::*;
pub use pack::*;
pub use reactor::*;
pub use scanner::*;
pub use session::*;
pub use update::*;
pub use watcher::*;
pub use workspace_config::*;

#[cfg(test)]
pub(crate) mod test_encoders {
    use std::{
        fs,
        path::{Path, PathBuf},
        sync::Arc,
    };

    use facet_shared::parking_lot::Mutex;

    use crate::{Encoder, Result};

    #[derive(Debug, Default)]
    struct Calls {
        initialized: Vec<PathBuf>,
        converted: Vec<PathBuf>,
        updated: Vec<PathBuf>,
        validated: Vec<PathBuf>,
    }

    /// Remembers every call and copies the file into the destination on convert.
    #[derive(Debug, Default, Clone)]
    pub struct RecordingEncoder {
        calls: Arc<Mutex<Calls>>,
    }

    impl RecordingEncoder {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn initialized(&self) -> Vec<PathBuf> {
            self.calls.lock().initialized.clone()
        }

        pub fn converted(&self) -> Vec<PathBuf> {
            self.calls.lock().converted.clone()
        }

        pub fn updated(&self) -> Vec<PathBuf> {
            self.calls.lock().updated.clone()
        }

        pub fn validated(&self) -> Vec<PathBuf> {
            self.calls.lock().validated.clone()
        }
    }

    impl Encoder for RecordingEncoder {
        fn name(&self) -> &str {
            "recording"
        }

        fn initialize(&self, file: &Path) -> Result<bool> {
            self.calls.lock().initialized.push(file.to_owned());
            Ok(true)
        }

        fn convert(&self, file: &Path, destination_dir: &Path) -> Result<bool> {
            self.calls.lock().converted.push(file.to_owned());
            let file_name = file.file_name().expect("file without name");
            fs::copy(file, destination_dir.join(file_name))?;
            Ok(true)
        }

        fn update(&self, file: &Path) -> Result<bool> {
            self.calls.lock().updated.push(file.to_owned());
            Ok(true)
        }

        fn validate(&self, file: &Path) -> Result<bool> {
            self.calls.lock().validated.push(file.to_owned());
            Ok(true)
        }
    }

    /// Reports failure for every operation.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct FailingEncoder;

    impl Encoder for FailingEncoder {
        fn name(&self) -> &str {
            "failing"
        }

        fn initialize(&self, _file: &Path) -> Result<bool> {
            Ok(false)
        }

        fn convert(&self, _file: &Path, _destination_dir: &Path) -> Result<bool> {
            Ok(false)
        }

        fn update(&self, _file: &Path) -> Result<bool> {
            Ok(false)
        }

        fn validate(&self, _file: &Path) -> Result<bool> {
            Ok(false)
        }
    }
}
