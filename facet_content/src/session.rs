use std::path::{Path, PathBuf};

use facet_shared::log::{error, info};

use crate::{
    common::{normalize_path, Directories},
    encoder::{BuiltinEncoders, Encoder},
    encoder_registry::EncoderRegistry,
    file_cache::FileStateCache,
    pack::{PackAction, PackEngine, PackReport},
    scanner::{WorkspaceScanner, WorkspaceTree},
    update::UpdateEngine,
    workspace_config::{ConfigChange, WorkspaceConfig},
    Error, Result,
};

/// The state of one opened workspace.
///
/// Owns the configuration and the cache of the workspace. The encoder
/// registry is built from the configuration at the start of every operation,
/// so changes to the configuration or to the encoders on disk are picked up
/// without reopening the session.
///
/// The `try_*` methods propagate errors. The other methods log the error and
/// return whether the operation succeeded.
pub struct Session {
    root: PathBuf,
    config: WorkspaceConfig,
    cache: FileStateCache,
    builtins: BuiltinEncoders,
}

impl Session {
    /// Opens the workspace and loads its configuration and cache.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let root = if root.is_absolute() {
            normalize_path(root)
        } else {
            normalize_path(&std::env::current_dir()?.join(root))
        };
        if !root.is_dir() {
            return Err(Error::WorkspaceNotFound(root));
        }
        info!("Opening workspace '{}'", root.display());
        let config = WorkspaceConfig::load(&root);
        let cache = FileStateCache::load(&root);
        Ok(Self {
            root,
            config,
            cache,
            builtins: BuiltinEncoders::new(),
        })
    }

    /// Adds a built-in encoder.
    pub fn register(mut self, name: impl Into<String>, encoder: impl Encoder + 'static) -> Self {
        self.builtins = self.builtins.register(name, encoder);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &WorkspaceConfig {
        &self.config
    }

    pub fn cache(&self) -> &FileStateCache {
        &self.cache
    }

    pub fn directories(&self) -> Directories {
        Directories::new(&self.root, self.config.output_path(&self.root))
    }

    pub fn scanner(&self) -> WorkspaceScanner<'_> {
        WorkspaceScanner::new(&self.root, &self.config)
    }

    /// Applies a settings change and saves the configuration right away.
    pub fn configure(&mut self, change: ConfigChange) -> Result<()> {
        info!("Changing workspace configuration: {change:?}");
        self.config.apply(change);
        self.config.save(&self.root)
    }

    pub fn files(&self) -> Result<Vec<PathBuf>> {
        self.scanner().files()
    }

    pub fn tree(&self) -> Result<WorkspaceTree> {
        self.scanner().tree()
    }

    pub fn build_registry(&self) -> Result<EncoderRegistry> {
        EncoderRegistry::build(&self.config, &self.builtins)
    }

    /// Runs the update operation of the encoders on every file of the workspace.
    pub fn update_workspace(&self) -> bool {
        info!(">>>>>> Updating Workspace <<<<<<");
        report(self.try_update_workspace().map(|count| {
            info!("Updated {count} files");
            info!(">>>>>> Finished Updating <<<<<<");
        }))
    }

    pub fn try_update_workspace(&self) -> Result<usize> {
        let registry = self.build_registry()?;
        let files = self.files()?;
        UpdateEngine::new(&self.directories(), &registry).update_all(&files)
    }

    /// Packs every changed file of the workspace into the output directory.
    pub fn pack_workspace(&mut self) -> bool {
        info!(">>>>>> Packing Workspace <<<<<<");
        report(self.try_pack_workspace().map(|pack_report| {
            info!(
                "Encoded {} and copied {} files, {} unchanged, {} excluded",
                pack_report.encoded.len(),
                pack_report.copied.len(),
                pack_report.unchanged,
                pack_report.excluded
            );
            info!(">>>>>> Finished Packing <<<<<<");
        }))
    }

    pub fn try_pack_workspace(&mut self) -> Result<PackReport> {
        let registry = self.build_registry()?;
        let scanner = WorkspaceScanner::new(&self.root, &self.config);
        let files = scanner.files()?;
        let workspace_directories = scanner.directories()?;
        let directories = Directories::new(&self.root, self.config.output_path(&self.root));
        PackEngine::new(&directories, &registry, &self.config, &mut self.cache).pack(&files, &workspace_directories)
    }

    /// Checks the metadata of every file of the workspace.
    pub fn validate_workspace(&self) -> bool {
        info!(">>>>>> Validating Workspace <<<<<<");
        report(self.try_validate_workspace().map(|count| {
            info!("Validated {count} files");
            info!(">>>>>> Finished Validating <<<<<<");
        }))
    }

    pub fn try_validate_workspace(&self) -> Result<usize> {
        let registry = self.build_registry()?;
        let files = self.files()?;
        UpdateEngine::new(&self.directories(), &registry).validate_all(&files)
    }

    /// Runs the update operation of the encoder on a single file.
    pub fn update_file(&self, file: &Path) -> bool {
        report(self.try_update_file(file).map(drop))
    }

    pub fn try_update_file(&self, file: &Path) -> Result<bool> {
        let registry = self.build_registry()?;
        UpdateEngine::new(&self.directories(), &registry).update_file(file)
    }

    /// Packs a single file if it changed since it was last packed.
    ///
    /// A missing output directory is recreated first and the cache is
    /// cleared, so the next full pack restores every other file.
    pub fn pack_file(&mut self, file: &Path) -> bool {
        report(self.try_pack_file(file).map(drop))
    }

    pub fn try_pack_file(&mut self, file: &Path) -> Result<PackAction> {
        let registry = self.build_registry()?;
        let directories = Directories::new(&self.root, self.config.output_path(&self.root));
        let mut engine = PackEngine::new(&directories, &registry, &self.config, &mut self.cache);
        engine.ensure_output_root()?;
        engine.pack_file(file)
    }

    /// Replaces the metadata of a single file with the defaults of its encoder.
    pub fn reset_file(&self, file: &Path) -> bool {
        report(self.try_reset_file(file).map(|initialized| {
            if !initialized {
                info!("No encoder for: {}", self.directories().asset_key(file));
            }
        }))
    }

    pub fn try_reset_file(&self, file: &Path) -> Result<bool> {
        let registry = self.build_registry()?;
        UpdateEngine::new(&self.directories(), &registry).initialize_file(file)
    }

    /// Writes the cache into the workspace.
    pub fn save_cache(&self) -> bool {
        report(self.cache.save(&self.root))
    }
}

fn report(result: Result<()>) -> bool {
    match result {
        Ok(()) => true,
        Err(err) => {
            error!("{err}");
            false
        }
    }
}
