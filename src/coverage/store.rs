//! Reading and writing coverage data files.

use super::data::{PackageData, ProjectData};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Current on-disk format version.
pub const FORMAT_VERSION: u32 = 1;

/// Errors raised while loading or saving a data file.
#[derive(Debug, Error)]
pub enum CoverageError {
    #[error("failed to read coverage data file {path}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("corrupt coverage data file {path}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("coverage data file {path} has unsupported format version {version}")]
    UnsupportedVersion { path: PathBuf, version: u32 },

    #[error("failed to write coverage data file {path}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Serialize)]
struct FileRef<'a> {
    format_version: u32,
    packages: &'a BTreeMap<String, PackageData>,
}

#[derive(Deserialize)]
struct FileOwned {
    format_version: u32,
    #[serde(default)]
    packages: BTreeMap<String, PackageData>,
}

/// Load a coverage data file.
pub fn load(path: &Path) -> Result<ProjectData, CoverageError> {
    let content = fs::read_to_string(path).map_err(|source| CoverageError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let file: FileOwned = serde_json::from_str(&content).map_err(|source| CoverageError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    if file.format_version != FORMAT_VERSION {
        return Err(CoverageError::UnsupportedVersion {
            path: path.to_path_buf(),
            version: file.format_version,
        });
    }

    debug!(
        "Loaded {} packages from {}",
        file.packages.len(),
        path.display()
    );
    Ok(ProjectData {
        packages: file.packages,
    })
}

/// Save a coverage data file, creating parent directories as needed.
pub fn save(data: &ProjectData, path: &Path) -> Result<(), CoverageError> {
    let write_err = |source| CoverageError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(write_err)?;
    }

    let file = FileRef {
        format_version: FORMAT_VERSION,
        packages: &data.packages,
    };
    let content = serde_json::to_string_pretty(&file)
        .map_err(|e| write_err(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;

    fs::write(path, content).map_err(write_err)?;
    debug!("Saved coverage data to {}", path.display());
    Ok(())
}
