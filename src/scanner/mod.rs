//! Source file index for report generation.
//!
//! Coverage data records each class's source file relative to a source
//! root (e.g. `com/acme/Circle.java`). This module walks the compile source
//! roots once and maps those relative paths to files on disk.

use crate::config::ScannerConfig;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Configuration for source scanning.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// File extensions to include (e.g., ["java", "kt"])
    pub extensions: Vec<String>,
    /// Directory or file names to exclude (e.g., ["target", ".git"])
    pub excludes: Vec<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self::from(&ScannerConfig::default())
    }
}

impl From<&ScannerConfig> for ScanConfig {
    fn from(config: &ScannerConfig) -> Self {
        Self {
            extensions: config.extensions.clone(),
            excludes: config.excludes.clone(),
        }
    }
}

/// Relative source path (always `/`-separated) to absolute file.
#[derive(Debug, Clone, Default)]
pub struct SourceIndex {
    files: HashMap<String, PathBuf>,
}

impl SourceIndex {
    /// Index every matching file below `roots`.
    ///
    /// Missing roots are skipped. When two roots hold the same relative
    /// path the first root wins.
    pub fn build(roots: &[PathBuf], config: &ScanConfig) -> Self {
        let mut files = HashMap::new();

        for root in roots {
            if !root.is_dir() {
                debug!("Source root {} does not exist, skipping", root.display());
                continue;
            }

            let walker = WalkDir::new(root)
                .follow_links(true)
                .into_iter()
                .filter_entry(|entry| entry.depth() == 0 || !is_excluded(config, entry.file_name()));

            for entry in walker {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        warn!("Cannot read below {}: {}", root.display(), e);
                        continue;
                    }
                };

                if !entry.file_type().is_file() || !matches_extension(config, entry.path()) {
                    continue;
                }

                if let Ok(relative) = entry.path().strip_prefix(root) {
                    files
                        .entry(to_slash(relative))
                        .or_insert_with(|| entry.path().to_path_buf());
                }
            }
        }

        debug!("Indexed {} source files from {} roots", files.len(), roots.len());
        Self { files }
    }

    /// Look up a source file recorded in coverage data.
    pub fn resolve(&self, source_file: &str) -> Option<&Path> {
        let key = source_file.replace('\\', "/");
        self.files
            .get(key.trim_start_matches('/'))
            .map(PathBuf::as_path)
    }

    /// Number of indexed files.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Returns true if nothing was indexed.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Check if a name matches exclusion patterns.
fn is_excluded(config: &ScanConfig, name: &std::ffi::OsStr) -> bool {
    let name = name.to_string_lossy();

    // Hidden files
    if name.starts_with('.') {
        return true;
    }

    config.excludes.iter().any(|pattern| name == pattern.as_str())
}

fn matches_extension(config: &ScanConfig, path: &Path) -> bool {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    config.extensions.iter().any(|allowed| allowed == ext)
}

fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "class X {}\n").unwrap();
    }

    #[test]
    fn test_build_and_resolve() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("src/main/java");
        touch(&root.join("com/acme/Circle.java"));
        touch(&root.join("com/acme/notes.txt"));
        touch(&root.join(".hidden/Secret.java"));
        touch(&root.join("target/Generated.java"));

        let index = SourceIndex::build(&[root.clone()], &ScanConfig::default());

        assert_eq!(index.len(), 1);
        assert_eq!(
            index.resolve("com/acme/Circle.java"),
            Some(root.join("com/acme/Circle.java").as_path())
        );
        assert!(index.resolve("com/acme/notes.txt").is_none());
        assert!(index.resolve("Secret.java").is_none());
    }

    #[test]
    fn test_first_root_wins_and_missing_roots_skipped() {
        let dir = TempDir::new().unwrap();
        let first = dir.path().join("a");
        let second = dir.path().join("b");
        touch(&first.join("p/A.java"));
        touch(&second.join("p/A.java"));
        touch(&second.join("p/B.java"));

        let roots = vec![dir.path().join("missing"), first.clone(), second.clone()];
        let index = SourceIndex::build(&roots, &ScanConfig::default());

        assert_eq!(index.len(), 2);
        assert_eq!(index.resolve("p/A.java"), Some(first.join("p/A.java").as_path()));
        assert_eq!(index.resolve("p/B.java"), Some(second.join("p/B.java").as_path()));
    }

    #[test]
    fn test_empty_index() {
        let index = SourceIndex::build(&[], &ScanConfig::default());
        assert!(index.is_empty());
    }
}
