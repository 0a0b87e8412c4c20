use std::{
    fs::{self, File},
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use facet_shared::log::LevelFilter;
use tempdir::TempDir;

pub use spectral;

/// Name of the workspace directory inside of the [`TestWorkspace`].
pub const WORKSPACE_DIR: &str = "Workspace";

/// Name of the default output directory that is a sibling of the workspace.
pub const OUTPUT_DIR: &str = "Assets";

/// Installs a logger for the tests. Calling it more than once is fine.
pub fn setup_logger() {
    let _ = simple_logger::SimpleLogger::new().with_level(LevelFilter::Trace).init();
}

/// Temporary directory that contains a workspace and room for its output.
///
/// ```text
/// <tmp>/
/// ├─ Workspace/   <- root()
/// ├─ Assets/      <- output(), not created
/// ├─ bin/         <- encoders created with `script_encoder`
/// ```
pub struct TestWorkspace {
    dir: TempDir,
    root: PathBuf,
}

impl TestWorkspace {
    /// Creates an empty workspace in a new temporary directory.
    pub fn new() -> Self {
        let dir = TempDir::new("facet").expect("failed to create temporary directory");
        let root = dir
            .path()
            .canonicalize()
            .expect("failed to canonicalize the temporary directory")
            .join(WORKSPACE_DIR);
        fs::create_dir_all(&root).expect("failed to create workspace directory");
        Self { dir, root }
    }

    /// The workspace root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The directory that the default configuration packs into (`../Assets`).
    pub fn output(&self) -> PathBuf {
        self.root.parent().expect("workspace has no parent").join(OUTPUT_DIR)
    }

    /// Path of a file relative to the workspace root.
    pub fn path(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.root.join(relative)
    }

    /// Path of a file relative to the output directory.
    pub fn output_path(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.output().join(relative)
    }

    /// Writes a file into the workspace and creates the parent directories.
    pub fn write(&self, relative: impl AsRef<Path>, content: &str) -> PathBuf {
        let path = self.root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("failed to create parent directory");
        }
        fs::write(&path, content).expect("failed to write workspace file");
        path
    }

    /// Creates a directory in the workspace.
    pub fn mkdir(&self, relative: impl AsRef<Path>) -> PathBuf {
        let path = self.root.join(relative);
        fs::create_dir_all(&path).expect("failed to create directory");
        path
    }

    /// Pins the modification time of a workspace file to `seconds` after the epoch.
    pub fn touch(&self, relative: impl AsRef<Path>, seconds: u64) {
        set_modified(&self.root.join(relative), seconds);
    }

    /// Writes an executable `/bin/sh` script into the temporary directory and
    /// returns its path. The script receives the encoder command line.
    #[cfg(unix)]
    pub fn script_encoder(&self, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let bin = self.dir.path().join("bin");
        fs::create_dir_all(&bin).expect("failed to create bin directory");
        let path = bin.join(name);
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("failed to write script encoder");
        let mut permissions = fs::metadata(&path).expect("failed to read script metadata").permissions();
        permissions.set_mode(0o755);
        fs::set_permissions(&path, permissions).expect("failed to make script executable");
        path
    }
}

impl Default for TestWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

/// Pins the modification time of a file to `seconds` after the epoch.
pub fn set_modified(path: &Path, seconds: u64) {
    let file = File::options()
        .write(true)
        .open(path)
        .unwrap_or_else(|_| panic!("failed to open \"{}\"", path.display()));
    file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(seconds))
        .unwrap_or_else(|_| panic!("failed to set the modification time of \"{}\"", path.display()));
}

/// Collects the paths of all files below `root`, relative to `root`, sorted.
pub fn list_files(root: &Path) -> Vec<PathBuf> {
    let mut files = facet_shared::walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.path().strip_prefix(root).ok().map(Path::to_owned))
        .collect::<Vec<_>>();
    files.sort();
    files
}
