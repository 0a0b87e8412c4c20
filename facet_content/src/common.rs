use std::{
    borrow::Cow,
    fmt::{self, Formatter},
    io,
    path::{Component, Path, PathBuf},
    result,
    time::{SystemTime, UNIX_EPOCH},
};

use facet_shared::{pathdiff, thiserror};

/// Extension of the sidecar metadata file that belongs to an asset (`foo.png.meta`).
pub const META_EXTENSION: &str = "meta";

/// Name of the persisted workspace configuration in the workspace root.
pub const CONFIG_FILE_NAME: &str = "config.workspace";

/// Name of the persisted file state cache in the workspace root.
pub const CACHE_FILE_NAME: &str = "Files.cache";

pub type Result<T> = result::Result<T, Error>;

/// The four operations that an encoder provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Initialize,
    Convert,
    Update,
    Validate,
}

impl Operation {
    /// The mode flag that is passed to an external encoder.
    pub fn flag(self) -> &'static str {
        match self {
            Operation::Initialize => "-reset",
            Operation::Convert => "-pack",
            Operation::Update => "-update",
            Operation::Validate => "-validate",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let verb = match self {
            Operation::Initialize => "initialize",
            Operation::Convert => "encode",
            Operation::Update => "update",
            Operation::Validate => "validate",
        };
        f.write_str(verb)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid path: {0}")]
    InvalidPath(PathBuf),
    #[error("Workspace directory does not exist: {0}")]
    WorkspaceNotFound(PathBuf),
    #[error("IoError: {0}")]
    IoError(#[from] io::Error),
    #[error("Failed to serialize '{path}': {message}")]
    Serialization { path: PathBuf, message: String },
    #[error("Encoder for extension '{extension}' does not exist: \"{path}\"")]
    EncoderNotFound { extension: String, path: PathBuf },
    #[error("Encoder \"{0}\" is a dynamic library; only executables and built-in encoders are supported")]
    UnsupportedEncoder(PathBuf),
    #[error("Encoder \"{path}\" failed to load: no built-in encoder provides the \"{capability}\" capability")]
    MissingEntryPoint { path: String, capability: String },
    #[error("Extension linked to more than one encoder: {0}")]
    ExtensionAlreadyRegistered(String),
    #[error("Failed to start encoder \"{path}\": {source}")]
    EncoderLaunch { path: PathBuf, source: io::Error },
    #[error("Failed to {operation}: {file}")]
    EncoderFailed { operation: Operation, file: AssetKey },
    #[error("Expected a directory but found a file: {0}")]
    NotADirectory(PathBuf),
    #[error("Failed to copy: {file} ({source})")]
    CopyFailed { file: AssetKey, source: io::Error },
    #[error("Failed to start directory watcher in directory: {0}")]
    FailedToStartDirectoryWatcher(PathBuf),
}

/// Identifies an asset by its path relative to the workspace root.
///
/// This is the "logical name" that shows up in the log and in error messages.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AssetKey(PathBuf);

impl AssetKey {
    /// Create a new [`AssetKey`] from a path. No validation is done on the path.
    ///
    /// # Example
    ///
    /// ```rust
    /// use facet_content::AssetKey;
    /// let asset_key = AssetKey::new("Textures/character.png");
    /// assert_eq!(asset_key.as_str(), "Textures/character.png");
    /// ```
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    /// Creates the [`AssetKey`] of an absolute `file` inside of `root`.
    ///
    /// Falls back to the unmodified path when `file` is not located in `root`.
    pub fn relative_to(file: &Path, root: &Path) -> Self {
        match file.strip_prefix(root) {
            Ok(relative) => Self::new(relative),
            Err(_) => Self::new(pathdiff::diff_paths(file, root).unwrap_or_else(|| file.to_owned())),
        }
    }

    /// Returns the path of the asset.
    pub fn as_path(&self) -> &Path {
        &self.0
    }

    /// Returns the path of the asset as a string.
    pub fn as_str(&self) -> Cow<str> {
        self.0.to_string_lossy()
    }
}

impl fmt::Display for AssetKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str())
    }
}

impl From<&str> for AssetKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<&Path> for AssetKey {
    fn from(value: &Path) -> Self {
        Self::new(value)
    }
}

/// The two mirrored directory trees: the workspace containing the source
/// assets and the output directory containing the packed assets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directories {
    workspace_path: PathBuf,
    output_path: PathBuf,
}

impl Directories {
    /// Creates the [`Directories`]. Both paths are expected to be absolute.
    pub fn new(workspace_path: impl Into<PathBuf>, output_path: impl Into<PathBuf>) -> Self {
        Self {
            workspace_path: normalize_path(&workspace_path.into()),
            output_path: normalize_path(&output_path.into()),
        }
    }

    pub fn workspace_path(&self) -> &Path {
        &self.workspace_path
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Returns whether the output directory is located inside of the workspace.
    pub fn is_output_nested(&self) -> bool {
        self.output_path.starts_with(&self.workspace_path)
    }

    /// Returns the logical name of a workspace file.
    pub fn asset_key(&self, file: &Path) -> AssetKey {
        AssetKey::relative_to(file, &self.workspace_path)
    }

    /// Maps a path inside of the workspace to the same relative path in the output directory.
    pub fn output_path_for(&self, path: &Path) -> Result<PathBuf> {
        let relative = path
            .strip_prefix(&self.workspace_path)
            .map_err(|_| Error::InvalidPath(path.to_owned()))?;
        Ok(self.output_path.join(relative))
    }

    /// Directory in the output directory that receives the packed form of `file`.
    pub fn output_dir_for(&self, file: &Path) -> Result<PathBuf> {
        let output_file = self.output_path_for(file)?;
        output_file
            .parent()
            .map(Path::to_owned)
            .ok_or_else(|| Error::InvalidPath(file.to_owned()))
    }
}

/// Returns the lowercase extension of the path without the leading dot.
pub(crate) fn extract_extension_from_path(path: &Path) -> Result<String> {
    Ok(path
        .extension()
        .and_then(|extension| extension.to_str())
        .map(|extension| extension.to_lowercase())
        .ok_or(Error::InvalidPath(path.to_owned()))?
        .to_owned())
}

/// Returns whether the path is a sidecar metadata file.
pub fn is_meta_file(path: &Path) -> bool {
    path.extension()
        .and_then(|extension| extension.to_str())
        .is_some_and(|extension| extension.eq_ignore_ascii_case(META_EXTENSION))
}

/// Path of the sidecar metadata file of an asset (`foo.png` -> `foo.png.meta`).
pub fn meta_path(asset_path: &Path) -> PathBuf {
    let mut path = asset_path.as_os_str().to_owned();
    path.push(".");
    path.push(META_EXTENSION);
    PathBuf::from(path)
}

/// Path of the asset that a sidecar metadata file belongs to (`foo.png.meta` -> `foo.png`).
pub fn asset_path_of_meta(meta_path: &Path) -> Option<PathBuf> {
    if !is_meta_file(meta_path) {
        return None;
    }
    Some(meta_path.with_extension(""))
}

pub(crate) fn modified_system_time(path: &Path) -> Option<SystemTime> {
    path.metadata().ok().and_then(|metadata| metadata.modified().ok())
}

/// Modification time of the file in nanoseconds since the epoch or 0 when the file does not exist.
pub(crate) fn modified_ticks(path: &Path) -> u64 {
    if !path.is_file() {
        return 0;
    }
    modified_system_time(path)
        .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
        .map(|duration| u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// Removes `.` and resolves `..` components without touching the file system.
pub(crate) fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push(component);
                }
            }
            _ => normalized.push(component),
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_paths() {
        assert_eq!(meta_path(Path::new("a/b.png")), PathBuf::from("a/b.png.meta"));
        assert_eq!(asset_path_of_meta(Path::new("a/b.png.meta")), Some(PathBuf::from("a/b.png")));
        assert_eq!(asset_path_of_meta(Path::new("a/b.png")), None);
        assert!(is_meta_file(Path::new("c.META")));
        assert!(!is_meta_file(Path::new("meta")));
    }

    #[test]
    fn extension_is_lowercase() {
        assert_eq!(extract_extension_from_path(Path::new("a/B.OBJ")).unwrap(), "obj");
        assert!(extract_extension_from_path(Path::new("a/Makefile")).is_err());
    }

    #[test]
    fn normalize() {
        assert_eq!(normalize_path(Path::new("/a/b/../Assets")), PathBuf::from("/a/Assets"));
        assert_eq!(normalize_path(Path::new("/a/./b")), PathBuf::from("/a/b"));
    }

    #[test]
    fn directories_mirror_paths() {
        let directories = Directories::new("/ws/Workspace", "/ws/Workspace/../Assets");
        assert_eq!(directories.output_path(), Path::new("/ws/Assets"));
        assert!(!directories.is_output_nested());
        assert_eq!(
            directories.output_dir_for(Path::new("/ws/Workspace/Meshes/a.obj")).unwrap(),
            PathBuf::from("/ws/Assets/Meshes")
        );
        assert_eq!(
            directories.asset_key(Path::new("/ws/Workspace/Meshes/a.obj")),
            AssetKey::new("Meshes/a.obj")
        );
        assert!(directories.output_path_for(Path::new("/elsewhere/a.obj")).is_err());
    }

    #[test]
    fn missing_file_has_zero_ticks() {
        assert_eq!(modified_ticks(Path::new("/this/file/does/not/exist")), 0);
    }
}
