use std::{
    fs,
    path::{Path, PathBuf},
};

use facet_shared::{
    log::{info, warn},
    split_extensions,
};
use serde::{Deserialize, Serialize};

use crate::{
    common::{normalize_path, CONFIG_FILE_NAME},
    Error, Result,
};

/// Delimiter of the `excludedExtensions` list.
pub const EXTENSION_DELIMITER: char = ';';

/// Output directory of a fresh workspace, relative to the workspace root.
pub const DEFAULT_OUTPUT_DIRECTORY: &str = "../Assets";

/// Links an extension to the encoder that handles it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncoderLink {
    pub extension: String,
    pub encoder: String,
}

impl EncoderLink {
    pub fn new(extension: impl Into<String>, encoder: impl Into<String>) -> Self {
        Self {
            extension: extension.into(),
            encoder: encoder.into(),
        }
    }
}

/// Settings of a workspace as they are persisted in `config.workspace`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkspaceConfig {
    pub output_directory: String,
    pub excluded_extensions: String,
    pub encoders: Vec<EncoderLink>,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        let encoder = |name: &str| format!("%GEMCUTTER_PATH%/tools/{name}/bin/{name}");
        Self {
            output_directory: DEFAULT_OUTPUT_DIRECTORY.to_owned(),
            excluded_extensions: String::new(),
            encoders: vec![
                EncoderLink::new("ttf", encoder("FontEncoder")),
                EncoderLink::new("obj", encoder("MeshEncoder")),
                EncoderLink::new("png", encoder("TextureEncoder")),
                EncoderLink::new("jpg", encoder("TextureEncoder")),
                EncoderLink::new("tga", encoder("TextureEncoder")),
                EncoderLink::new("bmp", encoder("TextureEncoder")),
            ],
        }
    }
}

/// A single edit made through the settings surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigChange {
    SetOutputDirectory(String),
    SetExcludedExtensions(String),
    /// Links the extension to the encoder, replacing an existing link of the same extension.
    LinkEncoder { extension: String, encoder: String },
    UnlinkEncoder(String),
}

impl WorkspaceConfig {
    /// Path of the configuration file of the workspace.
    pub fn path(workspace_root: &Path) -> PathBuf {
        workspace_root.join(CONFIG_FILE_NAME)
    }

    /// Loads the configuration of the workspace.
    ///
    /// This never fails. A missing or unreadable file results in the default configuration.
    pub fn load(workspace_root: &Path) -> Self {
        let path = Self::path(workspace_root);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(_) => {
                info!("No workspace configuration found at '{}', using the defaults", path.display());
                return Self::default();
            }
        };
        match serde_yaml::from_str::<Self>(&content) {
            Ok(config) => config,
            Err(err) => {
                warn!("Failed to parse workspace configuration '{}', using the defaults: {err}", path.display());
                Self::default()
            }
        }
    }

    /// Writes the configuration into the workspace, replacing the previous file.
    pub fn save(&self, workspace_root: &Path) -> Result<()> {
        let path = Self::path(workspace_root);
        let content = serde_yaml::to_string(self).map_err(|err| Error::Serialization {
            path: path.clone(),
            message: err.to_string(),
        })?;
        if path.exists() {
            fs::remove_file(&path)?;
        }
        fs::write(&path, content)?;
        info!("Saved workspace configuration to '{}'", path.display());
        Ok(())
    }

    /// The excluded extensions, lowercase and without leading dots.
    pub fn excluded_extensions(&self) -> Vec<String> {
        split_extensions(&self.excluded_extensions, EXTENSION_DELIMITER)
    }

    /// Returns whether files with the extension are never copied. Case-insensitive.
    pub fn is_extension_excluded(&self, extension: &str) -> bool {
        let extension = extension.trim_start_matches('.');
        self.excluded_extensions()
            .iter()
            .any(|excluded| excluded.eq_ignore_ascii_case(extension))
    }

    /// Returns whether an encoder is linked to the extension. Case-insensitive.
    pub fn has_encoder_for(&self, extension: &str) -> bool {
        let extension = extension.trim_start_matches('.');
        self.encoders
            .iter()
            .any(|link| link.extension.trim_start_matches('.').eq_ignore_ascii_case(extension))
    }

    /// Resolves the output directory against the workspace root.
    pub fn output_path(&self, workspace_root: &Path) -> PathBuf {
        normalize_path(&workspace_root.join(&self.output_directory))
    }

    /// Applies a change from the settings surface.
    pub fn apply(&mut self, change: ConfigChange) {
        match change {
            ConfigChange::SetOutputDirectory(output_directory) => self.output_directory = output_directory,
            ConfigChange::SetExcludedExtensions(excluded_extensions) => self.excluded_extensions = excluded_extensions,
            ConfigChange::LinkEncoder { extension, encoder } => {
                let extension = extension.trim_start_matches('.').to_owned();
                match self
                    .encoders
                    .iter_mut()
                    .find(|link| link.extension.eq_ignore_ascii_case(&extension))
                {
                    Some(link) => link.encoder = encoder,
                    None => self.encoders.push(EncoderLink::new(extension, encoder)),
                }
            }
            ConfigChange::UnlinkEncoder(extension) => {
                let extension = extension.trim_start_matches('.');
                self.encoders.retain(|link| !link.extension.eq_ignore_ascii_case(extension));
            }
        }
    }
}
