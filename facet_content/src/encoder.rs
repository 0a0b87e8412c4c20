use std::{
    collections::BTreeMap,
    ffi::OsStr,
    fmt,
    io::{BufRead, BufReader, Read},
    path::{Path, PathBuf},
    process::{Command, Stdio},
    sync::Arc,
    thread,
};

use facet_shared::log::{self, debug, warn, Level};

use crate::{common::Operation, Error, Result};

/// Log target under which the output of the encoders is forwarded.
pub const ENCODER_LOG_TARGET: &str = "encoder";

/// Path prefix that selects an in-process encoder instead of an executable.
pub const BUILTIN_PREFIX: &str = "builtin:";

/// Handle to an encoder.
///
/// Every operation blocks until the encoder is done and returns whether it
/// succeeded. An `Err` means the encoder could not be run at all.
pub trait Encoder: Send + Sync {
    /// Human readable description of the encoder, e.g. its path.
    fn name(&self) -> &str;

    /// Replaces the metadata of the asset with the defaults of the encoder.
    fn initialize(&self, file: &Path) -> Result<bool>;

    /// Writes the packed form of `file` into `destination_dir`.
    fn convert(&self, file: &Path, destination_dir: &Path) -> Result<bool>;

    /// Brings the metadata of the asset to the newest version, creating it when missing.
    fn update(&self, file: &Path) -> Result<bool>;

    /// Checks the metadata of the asset without changing it.
    fn validate(&self, file: &Path) -> Result<bool>;
}

impl fmt::Debug for dyn Encoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Encoder({})", self.name())
    }
}

/// Encoder that is a separate executable.
///
/// The executable is started once per operation:
///
/// ```text
/// Encoder -reset    -src <file>
/// Encoder -pack     -src <file> -dest <folder>/
/// Encoder -update   -src <file>
/// Encoder -validate -src <file>
/// ```
///
/// A zero exit code means success. Every line the encoder prints is forwarded
/// to the log while the encoder is still running.
pub struct ExternalEncoder {
    name: String,
    path: PathBuf,
}

impl ExternalEncoder {
    /// Creates the handle and checks that the executable exists.
    pub fn new(extension: &str, path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.is_file() {
            return Err(Error::EncoderNotFound {
                extension: extension.to_owned(),
                path,
            });
        }
        Ok(Self {
            name: path.display().to_string(),
            path,
        })
    }

    fn invoke(&self, operation: Operation, file: &Path, destination_dir: Option<&Path>) -> Result<bool> {
        let mut command = Command::new(&self.path);
        command.arg(operation.flag()).arg("-src").arg(file);
        if let Some(destination_dir) = destination_dir {
            // The encoders expect the destination to be a folder, which is
            // marked with a trailing separator.
            let mut destination = destination_dir.as_os_str().to_owned();
            if !destination_dir.as_os_str().to_string_lossy().ends_with(std::path::MAIN_SEPARATOR) {
                destination.push(std::path::MAIN_SEPARATOR.to_string());
            }
            command.arg("-dest").arg(destination);
        }
        command.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());

        debug!("Running {command:?}");
        let mut child = command.spawn().map_err(|source| Error::EncoderLaunch {
            path: self.path.clone(),
            source,
        })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        thread::scope(|scope| {
            if let Some(stderr) = stderr {
                scope.spawn(move || forward_stderr(stderr));
            }
            if let Some(stdout) = stdout {
                forward_output(stdout);
            }
        });

        let status = child.wait().map_err(|source| Error::EncoderLaunch {
            path: self.path.clone(),
            source,
        })?;
        debug!("Encoder \"{}\" exited with {status}", self.path.display());
        Ok(status.success())
    }
}

impl Encoder for ExternalEncoder {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialize(&self, file: &Path) -> Result<bool> {
        self.invoke(Operation::Initialize, file, None)
    }

    fn convert(&self, file: &Path, destination_dir: &Path) -> Result<bool> {
        self.invoke(Operation::Convert, file, Some(destination_dir))
    }

    fn update(&self, file: &Path) -> Result<bool> {
        self.invoke(Operation::Update, file, None)
    }

    fn validate(&self, file: &Path) -> Result<bool> {
        self.invoke(Operation::Validate, file, None)
    }
}

/// Determines the log level of a line printed by an encoder.
///
/// Lines without a known prefix keep the level of the previous line.
pub fn line_severity(line: &str, previous: Level) -> Level {
    if line.starts_with("ERROR:") || line.starts_with("[e]") {
        Level::Error
    } else if line.starts_with("WARNING:") || line.starts_with("[w]") {
        Level::Warn
    } else if line.starts_with("Log:") {
        Level::Info
    } else {
        previous
    }
}

fn forward_output(output: impl Read) {
    let mut level = Level::Info;
    for line in BufReader::new(output).lines() {
        let Ok(line) = line else {
            break;
        };
        level = line_severity(&line, level);
        log::log!(target: ENCODER_LOG_TARGET, level, "{line}");
    }
}

fn forward_stderr(output: impl Read) {
    for line in BufReader::new(output).lines() {
        let Ok(line) = line else {
            break;
        };
        warn!(target: ENCODER_LOG_TARGET, "{line}");
    }
}

/// Named in-process encoders that the workspace configuration can refer to
/// with `builtin:<name>`.
#[derive(Default, Clone)]
pub struct BuiltinEncoders {
    encoders: BTreeMap<String, Arc<dyn Encoder>>,
}

impl BuiltinEncoders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an in-process encoder under the given name.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use std::path::Path;
    /// use facet_content::{BuiltinEncoders, Encoder, Result};
    ///
    /// struct Noop;
    ///
    /// impl Encoder for Noop {
    ///     fn name(&self) -> &str { "noop" }
    ///     fn initialize(&self, _file: &Path) -> Result<bool> { Ok(true) }
    ///     fn convert(&self, _file: &Path, _destination_dir: &Path) -> Result<bool> { Ok(true) }
    ///     fn update(&self, _file: &Path) -> Result<bool> { Ok(true) }
    ///     fn validate(&self, _file: &Path) -> Result<bool> { Ok(true) }
    /// }
    ///
    /// let builtins = BuiltinEncoders::new().register("noop", Noop);
    /// assert!(builtins.get("noop").is_some());
    /// ```
    ///
    /// # Panics
    ///
    /// If an encoder with the same name is already registered.
    pub fn register(mut self, name: impl Into<String>, encoder: impl Encoder + 'static) -> Self {
        let name = name.into();
        if self.encoders.contains_key(&name) {
            panic!("built-in encoder '{name}' already registered");
        }
        self.encoders.insert(name, Arc::new(encoder));
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Encoder>> {
        self.encoders.get(name).cloned()
    }
}

/// Returns whether the path names a dynamic library.
pub(crate) fn is_dynamic_library(path: &Path) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .is_some_and(|extension| ["dll", "so", "dylib"].iter().any(|e| extension.eq_ignore_ascii_case(e)))
}
