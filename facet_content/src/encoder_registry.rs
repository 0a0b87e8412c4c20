use std::{
    borrow::Cow,
    collections::BTreeMap,
    env,
    path::{Path, PathBuf},
    sync::Arc,
};

use facet_shared::log::{info, trace};

use crate::{
    common::extract_extension_from_path,
    encoder::{is_dynamic_library, BuiltinEncoders, Encoder, ExternalEncoder, BUILTIN_PREFIX},
    workspace_config::WorkspaceConfig,
    Error, Result,
};

/// Maps file extensions to encoders. Built from the [`WorkspaceConfig`] at the
/// start of every operation and not changed afterwards.
#[derive(Default)]
pub struct EncoderRegistry {
    encoders: BTreeMap<String, Arc<dyn Encoder>>,
}

impl EncoderRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the registry from the links in the configuration.
    ///
    /// Fails as a whole when any single encoder can't be resolved; a registry
    /// with only some of the encoders is never returned.
    pub fn build(config: &WorkspaceConfig, builtins: &BuiltinEncoders) -> Result<Self> {
        let mut encoders: BTreeMap<String, Arc<dyn Encoder>> = BTreeMap::new();
        for link in &config.encoders {
            let extension = link.extension.trim_start_matches('.').to_lowercase();
            if encoders.contains_key(&extension) {
                return Err(Error::ExtensionAlreadyRegistered(extension));
            }
            let path = expand_placeholders(&link.encoder);
            trace!("Resolving encoder for extension '{extension}': \"{path}\"");
            let encoder = resolve(&extension, &path, builtins)?;
            encoders.insert(extension, encoder);
        }
        info!("Loaded {} encoders", encoders.len());
        Ok(Self { encoders })
    }

    /// Returns the encoder for the extension. Case-insensitive.
    pub fn get(&self, extension: &str) -> Option<&Arc<dyn Encoder>> {
        self.encoders.get(&extension.trim_start_matches('.').to_lowercase())
    }

    /// Returns the encoder that handles the file, if any.
    pub fn encoder_for(&self, file: &Path) -> Option<&Arc<dyn Encoder>> {
        extract_extension_from_path(file)
            .ok()
            .and_then(|extension| self.encoders.get(&extension))
    }

    pub fn contains(&self, extension: &str) -> bool {
        self.get(extension).is_some()
    }

    /// The registered extensions, lowercase and sorted.
    pub fn extensions(&self) -> impl Iterator<Item = &str> {
        self.encoders.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.encoders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.encoders.is_empty()
    }
}

fn resolve(extension: &str, path: &str, builtins: &BuiltinEncoders) -> Result<Arc<dyn Encoder>> {
    if let Some(name) = path.strip_prefix(BUILTIN_PREFIX) {
        return builtins.get(name).ok_or_else(|| Error::MissingEntryPoint {
            path: path.to_owned(),
            capability: name.to_owned(),
        });
    }
    let path = PathBuf::from(path);
    if is_dynamic_library(&path) {
        return Err(Error::UnsupportedEncoder(path));
    }
    Ok(Arc::new(ExternalEncoder::new(extension, path)?))
}

/// Expands `%NAME%`, `$NAME`, `${NAME}` and a leading `~` in an encoder path.
///
/// Variables that are not set are left as they are.
pub fn expand_placeholders(path: &str) -> String {
    let path = expand_percent_variables(path);
    let path = shellexpand::tilde(&path).into_owned();
    shellexpand::env_with_context_no_errors(&path, |name| env::var(name).ok()).into_owned()
}

fn expand_percent_variables(input: &str) -> Cow<str> {
    if !input.contains('%') {
        return Cow::Borrowed(input);
    }
    let mut output = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find('%') {
        output.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('%') {
            Some(end) => {
                let name = &after[..end];
                let is_name = !name.is_empty() && !name.contains(['=', '\0']);
                match is_name.then(|| env::var(name)) {
                    Some(Ok(value)) => {
                        output.push_str(&value);
                        rest = &after[end + 1..];
                    }
                    _ => {
                        // Not a variable; keep the first '%' and continue
                        // with the second one as a potential start.
                        output.push('%');
                        output.push_str(name);
                        rest = &after[end..];
                    }
                }
            }
            None => {
                output.push('%');
                rest = after;
            }
        }
    }
    output.push_str(rest);
    Cow::Owned(output)
}
