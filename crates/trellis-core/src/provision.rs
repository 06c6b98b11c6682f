//! Data directory provisioning seam
//!
//! Extensions may declare a directory of default assets. The core computes
//! where each one belongs in the application tree and hands the pair to a
//! [`Provisioner`] before the extension's initializer runs; the copy logic
//! lives with the collaborator.

use std::path::PathBuf;

/// One extension's declared data directory and its place in the app tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataDirEntry {
    /// Slash-joined extension path (e.g. `app/foo`)
    pub extension: String,
    /// Directory holding the extension's default assets
    pub declared: PathBuf,
    /// Directory inside the application tree the assets belong in
    pub target: PathBuf,
}

/// Materialises an extension's default assets into the application tree
pub trait Provisioner: Send + Sync {
    /// Returns `true` if anything was written, `false` if `target` already existed
    fn provision(&self, entry: &DataDirEntry) -> std::io::Result<bool>;
}
