use std::path::{Path, PathBuf};

use facet_shared::log::{debug, info};

use crate::{
    common::{is_meta_file, Directories, Operation},
    encoder::Encoder,
    encoder_registry::EncoderRegistry,
    Error, Result,
};

/// The operations that only touch the metadata next to an asset.
#[derive(Debug, Clone, Copy)]
enum MetadataOperation {
    Update,
    Validate,
    Initialize,
}

impl MetadataOperation {
    fn run(self, encoder: &dyn Encoder, file: &Path) -> Result<bool> {
        match self {
            Self::Update => encoder.update(file),
            Self::Validate => encoder.validate(file),
            Self::Initialize => encoder.initialize(file),
        }
    }

    fn progress(self) -> &'static str {
        match self {
            Self::Update => "Checking",
            Self::Validate => "Validating",
            Self::Initialize => "Resetting",
        }
    }
}

impl From<MetadataOperation> for Operation {
    fn from(operation: MetadataOperation) -> Self {
        match operation {
            MetadataOperation::Update => Operation::Update,
            MetadataOperation::Validate => Operation::Validate,
            MetadataOperation::Initialize => Operation::Initialize,
        }
    }
}

/// Runs the metadata operations (update, validate, initialize) of the
/// encoders on the workspace files.
///
/// Files without an encoder are skipped. The first failure stops the run.
pub struct UpdateEngine<'a> {
    directories: &'a Directories,
    registry: &'a EncoderRegistry,
}

impl<'a> UpdateEngine<'a> {
    pub fn new(directories: &'a Directories, registry: &'a EncoderRegistry) -> Self {
        Self { directories, registry }
    }

    /// Brings the metadata of every file to the newest version of its encoder.
    ///
    /// Returns the number of files that were handed to an encoder.
    pub fn update_all(&self, files: &[PathBuf]) -> Result<usize> {
        self.run_all(MetadataOperation::Update, files)
    }

    /// Brings the metadata of a single file up to date.
    ///
    /// Returns `false` when no encoder handles the file.
    pub fn update_file(&self, file: &Path) -> Result<bool> {
        self.run_file(MetadataOperation::Update, file)
    }

    /// Checks the metadata of every file without changing it.
    pub fn validate_all(&self, files: &[PathBuf]) -> Result<usize> {
        self.run_all(MetadataOperation::Validate, files)
    }

    /// Replaces the metadata of a single file with the defaults of its encoder.
    pub fn initialize_file(&self, file: &Path) -> Result<bool> {
        self.run_file(MetadataOperation::Initialize, file)
    }

    fn run_all(&self, operation: MetadataOperation, files: &[PathBuf]) -> Result<usize> {
        let mut count = 0;
        for file in files.iter().filter(|file| !is_meta_file(file)) {
            if self.run_file(operation, file)? {
                count += 1;
            }
        }
        Ok(count)
    }

    fn run_file(&self, operation: MetadataOperation, file: &Path) -> Result<bool> {
        if is_meta_file(file) {
            return Ok(false);
        }
        let Some(encoder) = self.registry.encoder_for(file) else {
            debug!("No encoder for: {}", file.display());
            return Ok(false);
        };

        let asset_key = self.directories.asset_key(file);
        info!("{}: {asset_key}", operation.progress());
        if operation.run(encoder.as_ref(), file)? {
            Ok(true)
        } else {
            Err(Error::EncoderFailed {
                operation: operation.into(),
                file: asset_key,
            })
        }
    }
}
