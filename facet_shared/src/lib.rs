//! Crates that are shared between the members of the workspace.
//!
//! Every member depends on the versions that are re-exported here so that
//! the types used at the crate boundaries (e.g. [`crossbeam_channel::Sender`])
//! are guaranteed to be identical.

pub use chrono;
pub use crossbeam_channel;
pub use indoc;
pub use log;
pub use parking_lot;
pub use pathdiff;
pub use thiserror;
pub use walkdir;

/// Splits a delimiter-joined list of extensions into its normalized parts.
///
/// Empty segments are dropped, leading dots are removed and the result is
/// lowercase so that it can be compared case-insensitively.
///
/// # Example
///
/// ```rust
/// use facet_shared::split_extensions;
/// assert_eq!(split_extensions("psd; .Blend;;", ';'), vec!["psd", "blend"]);
/// ```
pub fn split_extensions(joined: &str, delimiter: char) -> Vec<String> {
    joined
        .split(delimiter)
        .map(|extension| extension.trim().trim_start_matches('.').to_lowercase())
        .filter(|extension| !extension.is_empty())
        .collect()
}
