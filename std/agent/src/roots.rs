//! The set of directories the server may read from.

use crate::validate::{is_within, normalize, resolve};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Directories under the user's home allowed by default.
pub const DEFAULT_ROOTS: [&str; 4] = ["Documents", "Downloads", "Desktop", "github"];

/// Errors building the allowed directory set.
#[derive(Error, Debug)]
pub enum RootsError {
    #[error("could not determine the home directory")]
    NoHomeDir,
}

/// Immutable set of allowed root directories, resolved once at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowedRoots {
    dirs: Vec<PathBuf>,
}

impl AllowedRoots {
    /// Resolve the given directories the same way request paths are
    /// resolved, dropping duplicates.
    ///
    /// Directories that do not exist are kept so files created in them
    /// later stay readable.
    pub fn new(dirs: impl IntoIterator<Item = PathBuf>) -> Self {
        let mut resolved: Vec<PathBuf> = Vec::new();
        for dir in dirs {
            let dir = match normalize(&dir).and_then(|d| resolve(&d)) {
                Ok(d) => d,
                Err(e) => {
                    tracing::warn!("skipping allowed directory {}: {e}", dir.display());
                    continue;
                }
            };
            if !dir.is_dir() {
                tracing::debug!("allowed directory {} does not exist", dir.display());
            }
            if !resolved.contains(&dir) {
                resolved.push(dir);
            }
        }
        Self { dirs: resolved }
    }

    /// The default directories under `home`.
    pub fn under_home(home: &Path) -> Self {
        Self::new(DEFAULT_ROOTS.iter().map(|name| home.join(name)))
    }

    /// The default directories under the current user's home.
    pub fn from_home() -> Result<Self, RootsError> {
        dirs::home_dir()
            .map(|home| Self::under_home(&home))
            .ok_or(RootsError::NoHomeDir)
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty()
    }

    /// Whether a resolved path lies within any allowed directory.
    pub fn contains(&self, path: &Path) -> bool {
        self.dirs.iter().any(|root| is_within(path, root))
    }
}
