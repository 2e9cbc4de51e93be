//! Host directory standing in for the `/sd/` card.

use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Component, Path, PathBuf};

/// Prefix of every card path
pub const SD_PREFIX: &str = "/sd/";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdCard {
    root: PathBuf,
}

impl SdCard {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map `/sd/<name>` (or a bare `<name>`) to a path under the root
    ///
    /// Names that are empty or would leave the root are rejected.
    pub fn resolve(&self, path: &str) -> io::Result<PathBuf> {
        let name = Path::new(path.strip_prefix(SD_PREFIX).unwrap_or(path));
        let inside = name
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if name.as_os_str().is_empty() || !inside {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid card path {path}"),
            ));
        }
        Ok(self.root.join(name))
    }

    /// Create or truncate a file for writing
    pub fn create(&self, path: &str) -> io::Result<BufWriter<File>> {
        File::create(self.resolve(path)?).map(BufWriter::new)
    }

    pub fn remove(&self, path: &str) -> io::Result<()> {
        fs::remove_file(self.resolve(path)?)
    }
}
