//! The build reactor: every module of the build, in build order.
//!
//! Modules live in an arena and refer to each other through [`ModuleId`].
//! The reactor checks the parent structure once on construction so the
//! planner can treat it as an acyclic forest.

pub mod manifest;

pub use manifest::{ManifestError, ModuleEntry, ReactorManifest};

use crate::config::GeneralConfig;
use crate::models::{ModuleDescriptor, ModuleId, ModuleSettings, PackagingKind};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Default compile source root of a module.
const DEFAULT_SOURCE_ROOT: &str = "src/main/java";

/// Ordered modules of one build.
#[derive(Debug, Clone)]
pub struct Reactor {
    modules: Vec<ModuleDescriptor>,
}

impl Reactor {
    /// Load a reactor from a manifest file.
    ///
    /// Relative module directories are resolved against the manifest's
    /// directory; configured paths are resolved against each module.
    pub fn load(path: &Path, config: &GeneralConfig) -> Result<Self, ManifestError> {
        let read_err = |source| ManifestError::Read {
            path: path.to_path_buf(),
            source,
        };

        let content = std::fs::read_to_string(path).map_err(read_err)?;
        let manifest = ReactorManifest::parse(&content, path.to_path_buf())?;

        let manifest_dir = path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let root_dir = std::path::absolute(manifest_dir).map_err(read_err)?;

        Self::from_manifest(manifest, &root_dir, config)
    }

    /// Build a reactor from a parsed manifest rooted at `root_dir`.
    pub fn from_manifest(
        manifest: ReactorManifest,
        root_dir: &Path,
        config: &GeneralConfig,
    ) -> Result<Self, ManifestError> {
        if manifest.modules.is_empty() {
            return Err(ManifestError::Empty);
        }

        let mut ids: HashMap<String, ModuleId> = HashMap::new();
        for (index, entry) in manifest.modules.iter().enumerate() {
            if ids.insert(entry.name.clone(), ModuleId(index)).is_some() {
                return Err(ManifestError::DuplicateModule(entry.name.clone()));
            }
        }

        let mut modules = Vec::with_capacity(manifest.modules.len());
        for (index, entry) in manifest.modules.into_iter().enumerate() {
            let parent = match entry.parent.as_deref() {
                Some(name) if name == entry.name => {
                    return Err(ManifestError::SelfParent(entry.name));
                }
                Some(name) => {
                    let parent = ids.get(name).copied();
                    if parent.is_none() {
                        debug!(
                            "Parent '{}' of module '{}' is outside the reactor",
                            name, entry.name
                        );
                    }
                    parent
                }
                None => None,
            };

            let base_dir = resolve(root_dir, &entry.base_dir);
            let settings = module_settings(&entry, &base_dir, config);

            modules.push(ModuleDescriptor {
                id: ModuleId(index),
                name: entry.name,
                base_dir,
                packaging: PackagingKind::from_packaging(&entry.packaging),
                parent,
                settings,
            });
        }

        let reactor = Self { modules };
        reactor.check_acyclic()?;
        reactor.warn_on_leaf_parents();
        Ok(reactor)
    }

    /// All modules, in build order.
    pub fn modules(&self) -> &[ModuleDescriptor] {
        &self.modules
    }

    /// Descriptor of a module id issued by this reactor.
    pub fn get(&self, id: ModuleId) -> &ModuleDescriptor {
        &self.modules[id.0]
    }

    /// Look a module up by name.
    pub fn find(&self, name: &str) -> Option<&ModuleDescriptor> {
        self.modules.iter().find(|m| m.name == name)
    }

    /// The module built last.
    pub fn last(&self) -> Option<&ModuleDescriptor> {
        self.modules.last()
    }

    /// Number of modules.
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    fn check_acyclic(&self) -> Result<(), ManifestError> {
        for module in &self.modules {
            let mut steps = 0;
            let mut cursor = module.parent;
            while let Some(parent) = cursor {
                steps += 1;
                if parent == module.id || steps > self.modules.len() {
                    return Err(ManifestError::ParentCycle(module.name.clone()));
                }
                cursor = self.get(parent).parent;
            }
        }
        Ok(())
    }

    fn warn_on_leaf_parents(&self) {
        for module in &self.modules {
            if let Some(parent) = module.parent {
                let parent = self.get(parent);
                if !parent.is_aggregator() {
                    warn!(
                        "Module '{}' has parent '{}' which is not an aggregator; it will never be aggregated",
                        module.name, parent.name
                    );
                }
            }
        }
    }
}

fn module_settings(entry: &ModuleEntry, base_dir: &Path, config: &GeneralConfig) -> ModuleSettings {
    let data_file = entry
        .data_file
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.data_file));
    let output_directory = entry
        .output_directory
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.output_directory));
    let source_roots = entry
        .source_roots
        .clone()
        .unwrap_or_else(|| vec![PathBuf::from(DEFAULT_SOURCE_ROOT)]);

    ModuleSettings {
        data_file: resolve(base_dir, &data_file),
        output_directory: resolve(base_dir, &output_directory),
        source_roots: source_roots.iter().map(|r| resolve(base_dir, r)).collect(),
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reactor(toml: &str) -> Result<Reactor, ManifestError> {
        let manifest = ReactorManifest::parse(toml, PathBuf::from("reactor.toml"))?;
        Reactor::from_manifest(manifest, Path::new("/work"), &GeneralConfig::default())
    }

    #[test]
    fn test_resolves_paths_and_parents() {
        let reactor = reactor(
            r#"
[[module]]
name = "core"
base_dir = "core"
parent = "root"

[[module]]
name = "root"
base_dir = "."
packaging = "pom"
parent = "corporate-parent"
output_directory = "/reports/root"
"#,
        )
        .unwrap();

        let core = reactor.find("core").unwrap();
        assert_eq!(core.base_dir, PathBuf::from("/work/core"));
        assert_eq!(core.packaging, PackagingKind::Leaf);
        assert_eq!(core.parent, Some(ModuleId(1)));
        assert_eq!(
            core.settings.data_file,
            PathBuf::from("/work/core/target/coverage/coverage.json")
        );
        assert_eq!(
            core.settings.source_roots,
            vec![PathBuf::from("/work/core/src/main/java")]
        );

        let root = reactor.find("root").unwrap();
        assert!(root.is_aggregator());
        assert_eq!(root.parent, None);
        assert_eq!(root.settings.output_directory, PathBuf::from("/reports/root"));
        assert_eq!(reactor.last().map(|m| m.id), Some(ModuleId(1)));
    }

    #[test]
    fn test_rejects_duplicates() {
        let err = reactor(
            r#"
[[module]]
name = "a"
base_dir = "a"

[[module]]
name = "a"
base_dir = "b"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ManifestError::DuplicateModule(name) if name == "a"));
    }

    #[test]
    fn test_rejects_self_parent() {
        let err = reactor("[[module]]\nname = \"a\"\nbase_dir = \"a\"\nparent = \"a\"\n").unwrap_err();
        assert!(matches!(err, ManifestError::SelfParent(_)));
    }

    #[test]
    fn test_rejects_parent_cycle() {
        let err = reactor(
            r#"
[[module]]
name = "a"
base_dir = "a"
packaging = "pom"
parent = "b"

[[module]]
name = "b"
base_dir = "b"
packaging = "pom"
parent = "a"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ManifestError::ParentCycle(_)));
    }

    #[test]
    fn test_rejects_empty() {
        assert!(matches!(reactor("").unwrap_err(), ManifestError::Empty));
    }
}
