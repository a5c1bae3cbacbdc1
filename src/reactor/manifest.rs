//! Reactor manifest parsing.
//!
//! A manifest lists the modules of a build in build order:
//!
//! ```toml
//! [[module]]
//! name = "core"
//! base_dir = "core"
//! packaging = "jar"
//! parent = "parent"
//! ```

use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading a reactor manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read reactor manifest {path}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse reactor manifest {path}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("reactor manifest lists no modules")]
    Empty,

    #[error("module '{0}' is listed more than once")]
    DuplicateModule(String),

    #[error("module '{0}' names itself as its parent")]
    SelfParent(String),

    #[error("parent chain of module '{0}' forms a cycle")]
    ParentCycle(String),
}

/// Deserialized manifest file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReactorManifest {
    /// Modules in build order.
    #[serde(rename = "module", default)]
    pub modules: Vec<ModuleEntry>,
}

/// One `[[module]]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct ModuleEntry {
    /// Unique module name.
    pub name: String,

    /// Module root, relative to the manifest's directory unless absolute.
    pub base_dir: PathBuf,

    /// Build packaging; `pom` marks an aggregator.
    #[serde(default = "default_packaging")]
    pub packaging: String,

    /// Name of the parent module. May name a module outside the reactor.
    #[serde(default)]
    pub parent: Option<String>,

    /// Compile source roots, relative to the module root unless absolute.
    #[serde(default)]
    pub source_roots: Option<Vec<PathBuf>>,

    /// Per-module override of the configured data file.
    #[serde(default)]
    pub data_file: Option<PathBuf>,

    /// Per-module override of the configured report directory.
    #[serde(default)]
    pub output_directory: Option<PathBuf>,
}

fn default_packaging() -> String {
    "jar".to_string()
}

impl ReactorManifest {
    /// Parse manifest text. `origin` is only used in error messages.
    pub fn parse(content: &str, origin: PathBuf) -> Result<Self, ManifestError> {
        toml::from_str(content).map_err(|source| ManifestError::Parse {
            path: origin,
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_manifest() {
        let manifest = ReactorManifest::parse(
            r#"
[[module]]
name = "core"
base_dir = "core"
parent = "root"
source_roots = ["src/main/java", "src/gen/java"]

[[module]]
name = "root"
base_dir = "."
packaging = "pom"
"#,
            PathBuf::from("reactor.toml"),
        )
        .unwrap();

        assert_eq!(manifest.modules.len(), 2);
        assert_eq!(manifest.modules[0].packaging, "jar");
        assert_eq!(manifest.modules[0].parent.as_deref(), Some("root"));
        assert_eq!(
            manifest.modules[0].source_roots.as_ref().map(|r| r.len()),
            Some(2)
        );
        assert_eq!(manifest.modules[1].packaging, "pom");
        assert!(manifest.modules[1].parent.is_none());
    }

    #[test]
    fn test_parse_error_names_origin() {
        let err = ReactorManifest::parse("[[module]]\nname = 3", PathBuf::from("bad.toml"))
            .unwrap_err();
        assert!(err.to_string().contains("bad.toml"));
    }
}
