use std::{
    fs,
    path::{Path, PathBuf},
};

use facet_shared::log::{debug, info, trace};

use crate::{
    common::{extract_extension_from_path, is_meta_file, AssetKey, Directories, Operation},
    encoder::Encoder,
    encoder_registry::EncoderRegistry,
    file_cache::FileStateCache,
    workspace_config::WorkspaceConfig,
    Error, Result,
};

/// What happened to a single file during packing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackAction {
    /// Put through its encoder.
    Encoded,
    /// Copied byte for byte.
    Copied,
    /// Not changed since it was last packed.
    Unchanged,
    /// No encoder and the extension is excluded.
    Excluded,
    /// Metadata files are never packed on their own.
    Ignored,
}

/// Summary of a pack run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PackReport {
    pub encoded: Vec<AssetKey>,
    pub copied: Vec<AssetKey>,
    pub unchanged: usize,
    pub excluded: usize,
    /// The output directory didn't exist and everything was packed from scratch.
    pub rebuilt: bool,
}

impl PackReport {
    /// Number of files that were encoded or copied.
    pub fn processed(&self) -> usize {
        self.encoded.len() + self.copied.len()
    }

    fn record(&mut self, key: AssetKey, action: PackAction) {
        match action {
            PackAction::Encoded => self.encoded.push(key),
            PackAction::Copied => self.copied.push(key),
            PackAction::Unchanged => self.unchanged += 1,
            PackAction::Excluded => self.excluded += 1,
            PackAction::Ignored => {}
        }
    }
}

/// Mirrors the workspace into the output directory, encoding the files that
/// have an encoder and copying the others.
///
/// The first failure stops the run. Files packed before the failure keep
/// their new state in the output directory.
pub struct PackEngine<'a> {
    directories: &'a Directories,
    registry: &'a EncoderRegistry,
    config: &'a WorkspaceConfig,
    cache: &'a mut FileStateCache,
}

impl<'a> PackEngine<'a> {
    pub fn new(
        directories: &'a Directories,
        registry: &'a EncoderRegistry,
        config: &'a WorkspaceConfig,
        cache: &'a mut FileStateCache,
    ) -> Self {
        Self {
            directories,
            registry,
            config,
            cache,
        }
    }

    /// Packs all `files` after creating the output directory and mirroring the
    /// `workspace_directories` into it.
    pub fn pack(&mut self, files: &[PathBuf], workspace_directories: &[PathBuf]) -> Result<PackReport> {
        let mut report = PackReport {
            rebuilt: self.prepare_output(workspace_directories)?,
            ..PackReport::default()
        };
        for file in files.iter().filter(|file| !is_meta_file(file)) {
            let action = self.pack_file(file)?;
            report.record(self.directories.asset_key(file), action);
        }
        Ok(report)
    }

    /// Creates the output directory and the mirrored directory structure.
    ///
    /// Returns `true` when the output directory had to be created, see
    /// [`PackEngine::ensure_output_root`].
    pub fn prepare_output(&mut self, workspace_directories: &[PathBuf]) -> Result<bool> {
        let rebuilt = self.ensure_output_root()?;
        for directory in workspace_directories {
            let mirrored = self.directories.output_path_for(directory)?;
            ensure_directory(&mirrored)?;
        }
        Ok(rebuilt)
    }

    /// Creates the output directory when it doesn't exist.
    ///
    /// Returns `true` when it had to be created, in which case the cache is
    /// cleared because none of the cached files exist in the new output
    /// directory.
    pub fn ensure_output_root(&mut self) -> Result<bool> {
        let output_path = self.directories.output_path();
        if output_path.exists() {
            ensure_directory(output_path)?;
            return Ok(false);
        }
        info!("Output directory doesn't exist, packing everything: {}", output_path.display());
        fs::create_dir_all(output_path)?;
        self.cache.clear();
        Ok(true)
    }

    /// Packs a single file if it changed since it was last packed.
    ///
    /// Expects the output directory to exist, see [`PackEngine::prepare_output`].
    pub fn pack_file(&mut self, file: &Path) -> Result<PackAction> {
        if is_meta_file(file) {
            return Ok(PackAction::Ignored);
        }

        let asset_key = self.directories.asset_key(file);
        let encoder = self.registry.encoder_for(file).cloned();
        if encoder.is_none() && self.is_excluded(file) {
            debug!("Excluded: {asset_key}");
            return Ok(PackAction::Excluded);
        }

        if !self.cache.should_pack(file) {
            return Ok(PackAction::Unchanged);
        }

        let result = match encoder {
            Some(encoder) => self.encode(encoder.as_ref(), file, asset_key),
            None => self.copy(file, asset_key),
        };

        // A failed file must not count as packed, otherwise the next run would skip it.
        if result.is_err() {
            self.cache.invalidate(file);
        }
        result
    }

    fn encode(&self, encoder: &dyn Encoder, file: &Path, asset_key: AssetKey) -> Result<PackAction> {
        info!("Encoding: {asset_key}");
        let destination_dir = self.directories.output_dir_for(file)?;
        ensure_directory(&destination_dir)?;
        if encoder.convert(file, &destination_dir)? {
            Ok(PackAction::Encoded)
        } else {
            Err(Error::EncoderFailed {
                operation: Operation::Convert,
                file: asset_key,
            })
        }
    }

    fn copy(&self, file: &Path, asset_key: AssetKey) -> Result<PackAction> {
        info!("Copying:  {asset_key}");
        let destination = self.directories.output_path_for(file)?;
        if let Some(parent) = destination.parent() {
            ensure_directory(parent)?;
        }
        fs::copy(file, &destination).map_err(|source| Error::CopyFailed { file: asset_key, source })?;
        Ok(PackAction::Copied)
    }

    fn is_excluded(&self, file: &Path) -> bool {
        extract_extension_from_path(file)
            .map(|extension| self.config.is_extension_excluded(&extension))
            .unwrap_or(false)
    }
}

/// Creates the directory if it is missing. Fails when something else occupies the path.
fn ensure_directory(path: &Path) -> Result<()> {
    if path.is_dir() {
        return Ok(());
    }
    if path.exists() {
        return Err(Error::NotADirectory(path.to_owned()));
    }
    trace!("Creating directory: {}", path.display());
    fs::create_dir_all(path)?;
    Ok(())
}
