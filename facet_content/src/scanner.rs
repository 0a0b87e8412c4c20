//! Enumerates the files of a workspace.
//!
//! Only files inside of the top-level directories of the workspace root are
//! part of the workspace. Files directly in the root, like `config.workspace`
//! and `Files.cache`, are reserved for the tool itself.

use std::{
    fmt,
    fs,
    path::{Path, PathBuf},
};

use facet_shared::{
    log::warn,
    walkdir::{DirEntry, WalkDir},
};

use crate::{
    common::{extract_extension_from_path, is_meta_file, normalize_path},
    workspace_config::WorkspaceConfig,
    Result,
};

/// Decides which files of the workspace are visible.
#[derive(Debug, Clone)]
pub struct WorkspaceScanner<'a> {
    root: &'a Path,
    config: &'a WorkspaceConfig,
    /// Skipped while walking when it is nested in the workspace.
    output: Option<PathBuf>,
}

impl<'a> WorkspaceScanner<'a> {
    pub fn new(root: &'a Path, config: &'a WorkspaceConfig) -> Self {
        let output = config.output_path(root);
        let output = (output.starts_with(root) && output != root).then_some(output);
        Self { root, config, output }
    }

    /// Returns whether the file takes part in packing and updating.
    ///
    /// Metadata files never do. Files with an excluded extension don't either,
    /// unless an encoder is linked to that extension.
    pub fn is_visible(&self, file: &Path) -> bool {
        if is_meta_file(file) {
            return false;
        }
        match extract_extension_from_path(file) {
            Ok(extension) => !self.config.is_extension_excluded(&extension) || self.config.has_encoder_for(&extension),
            Err(_) => true,
        }
    }

    /// Returns whether the path is a visible file below one of the top-level directories.
    pub fn is_workspace_file(&self, path: &Path) -> bool {
        let path = normalize_path(path);
        let Ok(relative) = path.strip_prefix(self.root) else {
            return false;
        };
        if relative.components().count() < 2 {
            return false;
        }
        if self.output.as_ref().is_some_and(|output| path.starts_with(output)) {
            return false;
        }
        self.is_visible(&path)
    }

    /// Collects all visible files. The order is stable: directories are walked
    /// in lexicographic order of their entries.
    pub fn files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for directory in self.top_level_directories()? {
            for entry in self.walk(&directory) {
                if entry.file_type().is_file() && self.is_visible(entry.path()) {
                    files.push(entry.into_path());
                }
            }
        }
        Ok(files)
    }

    /// Collects all directories below the workspace root, parents before children.
    pub fn directories(&self) -> Result<Vec<PathBuf>> {
        let mut directories = Vec::new();
        for directory in self.top_level_directories()? {
            for entry in self.walk(&directory) {
                if entry.file_type().is_dir() {
                    directories.push(entry.into_path());
                }
            }
        }
        Ok(directories)
    }

    /// Builds the tree that is shown to the user.
    pub fn tree(&self) -> Result<WorkspaceTree> {
        let directories = self
            .top_level_directories()?
            .iter()
            .map(|directory| self.directory_node(directory))
            .collect::<Result<Vec<_>>>()?;
        Ok(WorkspaceTree { directories })
    }

    fn directory_node(&self, directory: &Path) -> Result<DirectoryNode> {
        let mut files = Vec::new();
        let mut subdirectories = Vec::new();
        for entry in sorted_entries(directory)? {
            let path = entry.path();
            if path.is_dir() {
                if !self.is_output(&path) {
                    subdirectories.push(path);
                }
            } else if self.is_visible(&path) {
                files.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        let children = subdirectories
            .iter()
            .map(|subdirectory| self.directory_node(subdirectory))
            .collect::<Result<Vec<_>>>()?;
        Ok(DirectoryNode {
            name: file_name(directory),
            files,
            children,
        })
    }

    fn top_level_directories(&self) -> Result<Vec<PathBuf>> {
        Ok(sorted_entries(self.root)?
            .into_iter()
            .map(|entry| entry.path())
            .filter(|path| path.is_dir() && !self.is_output(path))
            .collect())
    }

    fn walk<'b>(&'b self, directory: &Path) -> impl Iterator<Item = DirEntry> + 'b {
        WalkDir::new(directory)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |entry| !self.is_output(entry.path()))
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(err) => {
                    warn!("Failed to read directory entry: {err}");
                    None
                }
            })
    }

    fn is_output(&self, path: &Path) -> bool {
        self.output.as_deref().is_some_and(|output| output == path)
    }
}

fn sorted_entries(directory: &Path) -> Result<Vec<fs::DirEntry>> {
    let mut entries = fs::read_dir(directory)?.collect::<std::io::Result<Vec<_>>>()?;
    entries.sort_by_key(|entry| entry.file_name());
    Ok(entries)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Hierarchical view of the workspace for display purposes.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WorkspaceTree {
    pub directories: Vec<DirectoryNode>,
}

/// A directory with its visible files and subdirectories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryNode {
    pub name: String,
    pub files: Vec<String>,
    pub children: Vec<DirectoryNode>,
}

impl DirectoryNode {
    /// The name annotated with the number of visible files, e.g. `Textures [3]`.
    pub fn label(&self) -> String {
        format!("{} [{}]", self.name, self.files.len())
    }

    fn write(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let indent = "  ".repeat(depth);
        writeln!(f, "{indent}{}", self.label())?;
        for child in &self.children {
            child.write(f, depth + 1)?;
        }
        for file in &self.files {
            writeln!(f, "{indent}  {file}")?;
        }
        Ok(())
    }
}

impl WorkspaceTree {
    /// Total number of visible files in the tree.
    pub fn file_count(&self) -> usize {
        fn count(node: &DirectoryNode) -> usize {
            node.files.len() + node.children.iter().map(count).sum::<usize>()
        }
        self.directories.iter().map(count).sum()
    }

    /// Finds a directory by the names of the directories leading to it.
    pub fn find(&self, names: &[&str]) -> Option<&DirectoryNode> {
        let (first, rest) = names.split_first()?;
        let mut node = self.directories.iter().find(|node| node.name == *first)?;
        for name in rest {
            node = node.children.iter().find(|child| child.name == *name)?;
        }
        Some(node)
    }
}

impl fmt::Display for WorkspaceTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for directory in &self.directories {
            directory.write(f, 0)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use facet_test::TestWorkspace;

    use super::*;

    fn relative(workspace: &TestWorkspace, files: Vec<PathBuf>) -> Vec<String> {
        files
            .iter()
            .map(|file| file.strip_prefix(workspace.root()).unwrap().to_string_lossy().replace('\\', "/"))
            .collect()
    }

    #[test]
    fn enumerates_files_below_top_level_directories() {
        let workspace = TestWorkspace::new();
        workspace.write("config.workspace", "");
        workspace.write("Files.cache", "");
        workspace.write("loose.txt", "");
        workspace.write("Meshes/b.obj", "");
        workspace.write("Meshes/a.obj", "");
        workspace.write("Meshes/a.obj.meta", "");
        workspace.write("Meshes/Props/crate.obj", "");
        workspace.write("Fonts/arial.ttf", "");
        workspace.write("Fonts/orphan.meta", "");

        let config = WorkspaceConfig::default();
        let files = WorkspaceScanner::new(workspace.root(), &config).files().unwrap();
        assert_eq!(
            relative(&workspace, files),
            vec!["Fonts/arial.ttf", "Meshes/Props/crate.obj", "Meshes/a.obj", "Meshes/b.obj"]
        );
    }

    #[test]
    fn excluded_extensions_are_skipped_unless_encoded() {
        let workspace = TestWorkspace::new();
        workspace.write("Art/a.psd", "");
        workspace.write("Art/a.PNG", "");
        workspace.write("Art/notes.txt", "");

        let config = WorkspaceConfig {
            excluded_extensions: "psd;png".to_owned(),
            ..WorkspaceConfig::default()
        };
        let files = WorkspaceScanner::new(workspace.root(), &config).files().unwrap();
        assert_eq!(relative(&workspace, files), vec!["Art/a.PNG", "Art/notes.txt"]);
    }

    #[test]
    fn nested_output_directory_is_skipped() {
        let workspace = TestWorkspace::new();
        workspace.write("Meshes/a.obj", "");
        workspace.write("Build/Meshes/a.obj", "");
        let config = WorkspaceConfig {
            output_directory: "Build".to_owned(),
            ..WorkspaceConfig::default()
        };
        let scanner = WorkspaceScanner::new(workspace.root(), &config);
        assert_eq!(relative(&workspace, scanner.files().unwrap()), vec!["Meshes/a.obj"]);
        assert!(!scanner.is_workspace_file(&workspace.path("Build/Meshes/a.obj")));
        assert!(scanner.tree().unwrap().find(&["Build"]).is_none());
    }

    #[test]
    fn directories_are_listed_parents_first() {
        let workspace = TestWorkspace::new();
        workspace.mkdir("B/Empty");
        workspace.write("A/x.txt", "");
        let config = WorkspaceConfig::default();
        let directories = WorkspaceScanner::new(workspace.root(), &config).directories().unwrap();
        assert_eq!(relative(&workspace, directories), vec!["A", "B", "B/Empty"]);
    }

    #[test]
    fn workspace_files() {
        let workspace = TestWorkspace::new();
        let config = WorkspaceConfig::default();
        let scanner = WorkspaceScanner::new(workspace.root(), &config);
        assert!(scanner.is_workspace_file(&workspace.path("Meshes/a.obj")));
        assert!(!scanner.is_workspace_file(&workspace.path("Meshes/a.obj.meta")));
        assert!(!scanner.is_workspace_file(&workspace.path("config.workspace")));
        assert!(!scanner.is_workspace_file(Path::new("/somewhere/else/a.obj")));
    }

    #[test]
    fn tree_counts_visible_files() {
        let workspace = TestWorkspace::new();
        workspace.write("Textures/a.png", "");
        workspace.write("Textures/a.png.meta", "");
        workspace.write("Textures/b.psd", "");
        workspace.write("Textures/UI/button.png", "");
        workspace.write("Audio/theme.ogg", "");

        let config = WorkspaceConfig {
            excluded_extensions: "psd".to_owned(),
            ..WorkspaceConfig::default()
        };
        let tree = WorkspaceScanner::new(workspace.root(), &config).tree().unwrap();

        assert_eq!(tree.directories.len(), 2);
        assert_eq!(tree.directories[0].label(), "Audio [1]");
        assert_eq!(tree.directories[1].label(), "Textures [1]");
        assert_eq!(tree.find(&["Textures", "UI"]).unwrap().label(), "UI [1]");
        assert_eq!(tree.file_count(), 3);

        let rendered = tree.to_string();
        assert_eq!(
            rendered,
            "Audio [1]\n  theme.ogg\nTextures [1]\n  UI [1]\n    button.png\n  a.png\n"
        );
    }
}
