//! Aggregation planning.
//!
//! Decides, for the module whose reporting step is running, whether an
//! aggregate report can be produced, which leaf modules feed it, and where
//! their data files and the aggregate output live.
//!
//! Aggregation waits for the last module of the build order. The build
//! orders children before their aggregators, so by then every leaf has had
//! its chance to write coverage data.

use super::paths::relativize;
use crate::models::{ModuleDescriptor, ModuleId};
use crate::reactor::Reactor;
use std::cell::OnceCell;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Relative data file used when the configured one is not under the
/// module's base directory.
pub const FALLBACK_DATA_FILE: &str = "coverage/coverage.json";

/// Relative report directory used when the configured one is not under the
/// module's base directory.
pub const FALLBACK_OUTPUT_DIR: &str = "coverage";

/// Direct children of every module, plus the modules without a parent in
/// the reactor (the `None` bucket).
#[derive(Debug, Clone, Default)]
pub struct ParentChildIndex {
    children: HashMap<Option<ModuleId>, Vec<ModuleId>>,
}

impl ParentChildIndex {
    /// Index the reactor. Children keep build order.
    pub fn build(reactor: &Reactor) -> Self {
        let mut children: HashMap<Option<ModuleId>, Vec<ModuleId>> = HashMap::new();
        for module in reactor.modules() {
            children.entry(module.parent).or_default().push(module.id);
        }
        Self { children }
    }

    /// Direct children of `parent`; empty when it has none.
    pub fn children(&self, parent: Option<ModuleId>) -> &[ModuleId] {
        self.children
            .get(&parent)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Where data files and aggregate reports sit relative to a module root.
///
/// Derived from one module's configuration and applied to every module of
/// the reactor. A module configured with a different layout gets looked up
/// (and written) at the wrong place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelativeLayout {
    pub relative_data_file: String,
    pub relative_aggregate_output_dir: String,
}

impl RelativeLayout {
    /// Derive the layout from `module`'s configured absolute paths,
    /// substituting fallbacks (with a warning) when they are not under the
    /// module's base directory.
    pub fn derive(module: &ModuleDescriptor) -> Self {
        let relative_data_file = relativize(&module.base_dir, &module.settings.data_file)
            .unwrap_or_else(|| {
                warn!(
                    "Could not determine relative data file name, defaulting to '{}'",
                    FALLBACK_DATA_FILE
                );
                FALLBACK_DATA_FILE.to_string()
            });

        let relative_aggregate_output_dir =
            relativize(&module.base_dir, &module.settings.output_directory).unwrap_or_else(|| {
                warn!(
                    "Could not determine relative output dir name, defaulting to '{}'",
                    FALLBACK_OUTPUT_DIR
                );
                FALLBACK_OUTPUT_DIR.to_string()
            });

        Self {
            relative_data_file,
            relative_aggregate_output_dir,
        }
    }

    /// Data file location of `module` under this layout.
    pub fn data_file_for(&self, module: &ModuleDescriptor) -> PathBuf {
        module.base_dir.join(&self.relative_data_file)
    }

    /// Aggregate report directory of `module` under this layout.
    pub fn output_dir_for(&self, module: &ModuleDescriptor) -> PathBuf {
        module.base_dir.join(&self.relative_aggregate_output_dir)
    }
}

/// Returns true if the module groups other modules.
pub fn is_aggregator_module(module: &ModuleDescriptor) -> bool {
    module.is_aggregator()
}

/// Returns true if `module` is the final element of `build_order`.
pub fn is_last_in_build_order(module: &ModuleDescriptor, build_order: &[ModuleDescriptor]) -> bool {
    build_order.last().is_some_and(|last| last.id == module.id)
}

/// Leaf modules below `root`, in order, with aggregators replaced by their
/// own leaves.
///
/// The parent structure must be acyclic.
pub fn collect_leaf_descendants(
    root: ModuleId,
    reactor: &Reactor,
    index: &ParentChildIndex,
) -> Vec<ModuleId> {
    let mut leaves = Vec::new();
    let mut pending: Vec<ModuleId> = index.children(Some(root)).iter().rev().copied().collect();

    while let Some(id) = pending.pop() {
        if reactor.get(id).is_aggregator() {
            pending.extend(index.children(Some(id)).iter().rev().copied());
        } else {
            leaves.push(id);
        }
    }

    leaves
}

/// Data files that exist for the leaf modules among `candidates`.
pub fn find_existing_data_files(
    candidates: &[ModuleId],
    reactor: &Reactor,
    relative_data_file: &str,
) -> Vec<(ModuleId, PathBuf)> {
    candidates
        .iter()
        .map(|&id| reactor.get(id))
        .filter(|module| !module.is_aggregator())
        .filter_map(|module| {
            let path = module.base_dir.join(relative_data_file);
            if path.exists() {
                Some((module.id, path))
            } else {
                debug!(
                    "No coverage data for module '{}' at {}",
                    module.name,
                    path.display()
                );
                None
            }
        })
        .collect()
}

/// True iff `current` is built last and at least one of its leaf
/// descendants has produced a data file.
pub fn can_aggregate_now(
    current: ModuleId,
    reactor: &Reactor,
    index: &ParentChildIndex,
    relative_data_file: &str,
) -> bool {
    let module = reactor.get(current);
    if !is_last_in_build_order(module, reactor.modules()) {
        return false;
    }

    let leaves = collect_leaf_descendants(current, reactor, index);
    !find_existing_data_files(&leaves, reactor, relative_data_file).is_empty()
}

/// Everything needed to aggregate one aggregator's subtree.
#[derive(Debug, Clone)]
pub struct AggregatePlan {
    /// The aggregator module.
    pub root: ModuleId,
    /// Leaf descendants of the root, in order.
    pub leaves: Vec<ModuleId>,
    /// Leaves with data, and their data files.
    pub data_files: Vec<(ModuleId, PathBuf)>,
    /// Where the merged data is written.
    pub aggregate_data_file: PathBuf,
    /// Where the aggregate report is written.
    pub output_dir: PathBuf,
    /// Source roots of all leaves.
    pub source_roots: Vec<PathBuf>,
}

impl AggregatePlan {
    /// Leaves that contributed no data.
    pub fn skipped_leaves(&self) -> Vec<ModuleId> {
        self.leaves
            .iter()
            .copied()
            .filter(|leaf| !self.data_files.iter().any(|(id, _)| id == leaf))
            .collect()
    }

    /// Paths of the data files to merge.
    pub fn input_paths(&self) -> Vec<PathBuf> {
        self.data_files.iter().map(|(_, path)| path.clone()).collect()
    }
}

/// Planning session for one module's reporting step.
///
/// The parent/child index and the relative layout are computed on first
/// use and kept for the rest of the session.
pub struct AggregationPlanner<'a> {
    reactor: &'a Reactor,
    current: ModuleId,
    aggregate_requested: bool,
    index: OnceCell<ParentChildIndex>,
    layout: OnceCell<RelativeLayout>,
}

impl<'a> AggregationPlanner<'a> {
    /// Start a session for `current`'s reporting step.
    pub fn new(reactor: &'a Reactor, current: ModuleId, aggregate_requested: bool) -> Self {
        Self {
            reactor,
            current,
            aggregate_requested,
            index: OnceCell::new(),
            layout: OnceCell::new(),
        }
    }

    /// The reactor being planned.
    pub fn reactor(&self) -> &'a Reactor {
        self.reactor
    }

    /// Descriptor of the module whose step is running.
    pub fn current(&self) -> &'a ModuleDescriptor {
        self.reactor.get(self.current)
    }

    /// Parent/child index of the reactor.
    pub fn index(&self) -> &ParentChildIndex {
        self.index.get_or_init(|| {
            debug!("Indexing {} reactor modules", self.reactor.len());
            ParentChildIndex::build(self.reactor)
        })
    }

    /// Layout derived from the current module's configuration.
    pub fn layout(&self) -> &RelativeLayout {
        self.layout
            .get_or_init(|| RelativeLayout::derive(self.current()))
    }

    /// Leaf descendants of `root`.
    pub fn leaf_descendants(&self, root: ModuleId) -> Vec<ModuleId> {
        collect_leaf_descendants(root, self.reactor, self.index())
    }

    /// Existing data files of the leaves among `candidates`.
    pub fn existing_data_files(&self, candidates: &[ModuleId]) -> Vec<(ModuleId, PathBuf)> {
        find_existing_data_files(candidates, self.reactor, &self.layout().relative_data_file)
    }

    /// Whether the current module can aggregate its own subtree now.
    pub fn can_aggregate_now(&self) -> bool {
        can_aggregate_now(
            self.current,
            self.reactor,
            self.index(),
            &self.layout().relative_data_file,
        )
    }

    /// Whether the current module's own data file exists.
    pub fn can_generate_simple_report(&self) -> bool {
        self.current().settings.data_file.is_file()
    }

    /// Whether aggregate reports can be produced during this step.
    ///
    /// Requires aggregation to be requested, the current module to be the
    /// last one built, and at least one leaf of the reactor to have data.
    pub fn can_generate_aggregate_report(&self) -> bool {
        if !self.aggregate_requested || !is_last_in_build_order(self.current(), self.reactor.modules())
        {
            return false;
        }

        let all: Vec<ModuleId> = self.reactor.modules().iter().map(|m| m.id).collect();
        !self.existing_data_files(&all).is_empty()
    }

    /// Whether this step produces a report at all.
    ///
    /// Aggregator modules with aggregation requested answer yes even before
    /// their subtree has data, since the aggregate may appear on a later step.
    pub fn can_generate_report(&self) -> bool {
        self.can_generate_simple_report()
            || self.can_generate_aggregate_report()
            || (self.aggregate_requested && is_aggregator_module(self.current()))
    }

    /// Aggregator modules of the reactor, in build order.
    pub fn aggregate_roots(&self) -> Vec<ModuleId> {
        self.reactor
            .modules()
            .iter()
            .filter(|m| is_aggregator_module(m))
            .map(|m| m.id)
            .collect()
    }

    /// Plan the aggregation of `root`'s subtree.
    ///
    /// Returns `None` when the root has no leaves or none of them has data.
    pub fn plan_for_root(&self, root: ModuleId) -> Option<AggregatePlan> {
        let leaves = self.leaf_descendants(root);
        if leaves.is_empty() {
            return None;
        }

        let data_files = self.existing_data_files(&leaves);
        if data_files.is_empty() {
            return None;
        }

        let root_module = self.reactor.get(root);
        let layout = self.layout();
        let source_roots = leaves
            .iter()
            .flat_map(|&id| self.reactor.get(id).settings.source_roots.iter().cloned())
            .collect();

        Some(AggregatePlan {
            root,
            aggregate_data_file: layout.data_file_for(root_module),
            output_dir: layout.output_dir_for(root_module),
            leaves,
            data_files,
            source_roots,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GeneralConfig;
    use crate::reactor::ReactorManifest;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    /// `(name, packaging, parent)` in build order.
    fn reactor_at(root: &Path, modules: &[(&str, &str, Option<&str>)]) -> Reactor {
        let mut toml = String::new();
        for (name, packaging, parent) in modules {
            toml.push_str(&format!(
                "[[module]]\nname = \"{}\"\nbase_dir = \"{}\"\npackaging = \"{}\"\n",
                name, name, packaging
            ));
            if let Some(parent) = parent {
                toml.push_str(&format!("parent = \"{}\"\n", parent));
            }
        }
        let manifest = ReactorManifest::parse(&toml, root.join("reactor.toml")).unwrap();
        Reactor::from_manifest(manifest, root, &GeneralConfig::default()).unwrap()
    }

    fn id(reactor: &Reactor, name: &str) -> ModuleId {
        reactor.find(name).unwrap().id
    }

    fn names(reactor: &Reactor, ids: &[ModuleId]) -> Vec<String> {
        ids.iter().map(|&id| reactor.get(id).name.clone()).collect()
    }

    fn write_data(reactor: &Reactor, name: &str) {
        let path = &reactor.find(name).unwrap().settings.data_file;
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, r#"{"format_version": 1, "packages": {}}"#).unwrap();
    }

    fn nested() -> (TempDir, Reactor) {
        let dir = TempDir::new().unwrap();
        let reactor = reactor_at(
            dir.path(),
            &[
                ("leafA", "jar", Some("sub")),
                ("leafB", "jar", Some("sub")),
                ("sub", "pom", Some("top")),
                ("leafC", "jar", Some("top")),
                ("top", "pom", None),
            ],
        );
        (dir, reactor)
    }

    #[test]
    fn test_is_aggregator_module() {
        let (_dir, reactor) = nested();
        assert!(is_aggregator_module(reactor.find("sub").unwrap()));
        assert!(!is_aggregator_module(reactor.find("leafA").unwrap()));
    }

    #[test]
    fn test_index_groups_children_in_build_order() {
        let (_dir, reactor) = nested();
        let index = ParentChildIndex::build(&reactor);

        assert_eq!(
            names(&reactor, index.children(Some(id(&reactor, "sub")))),
            vec!["leafA", "leafB"]
        );
        assert_eq!(
            names(&reactor, index.children(Some(id(&reactor, "top")))),
            vec!["sub", "leafC"]
        );
        assert_eq!(names(&reactor, index.children(None)), vec!["top"]);
        assert!(index.children(Some(id(&reactor, "leafA"))).is_empty());

        let total: usize = [None]
            .into_iter()
            .chain(reactor.modules().iter().map(|m| Some(m.id)))
            .map(|parent| index.children(parent).len())
            .sum();
        assert_eq!(total, reactor.len());
    }

    #[test]
    fn test_nested_aggregator_promotes_children() {
        let (_dir, reactor) = nested();
        let index = ParentChildIndex::build(&reactor);

        let leaves = collect_leaf_descendants(id(&reactor, "top"), &reactor, &index);
        assert_eq!(names(&reactor, &leaves), vec!["leafA", "leafB", "leafC"]);
    }

    #[test]
    fn test_leaf_collection_deep_tree() {
        let dir = TempDir::new().unwrap();
        let reactor = reactor_at(
            dir.path(),
            &[
                ("l1", "jar", Some("a3")),
                ("a3", "pom", Some("a2")),
                ("l2", "jar", Some("a2")),
                ("a2", "pom", Some("a1")),
                ("empty", "pom", Some("a1")),
                ("l3", "war", Some("a1")),
                ("a1", "pom", None),
                ("stray", "jar", None),
            ],
        );
        let index = ParentChildIndex::build(&reactor);

        let leaves = collect_leaf_descendants(id(&reactor, "a1"), &reactor, &index);
        assert_eq!(names(&reactor, &leaves), vec!["l1", "l2", "l3"]);

        let leaves = collect_leaf_descendants(id(&reactor, "empty"), &reactor, &index);
        assert!(leaves.is_empty());

        let leaves = collect_leaf_descendants(id(&reactor, "l1"), &reactor, &index);
        assert!(leaves.is_empty());
    }

    #[test]
    fn test_last_in_build_order() {
        let (_dir, reactor) = nested();
        let last_count = reactor
            .modules()
            .iter()
            .filter(|m| is_last_in_build_order(m, reactor.modules()))
            .count();
        assert_eq!(last_count, 1);
        assert!(is_last_in_build_order(
            reactor.find("top").unwrap(),
            reactor.modules()
        ));

        let dir = TempDir::new().unwrap();
        let single = reactor_at(dir.path(), &[("only", "jar", None)]);
        assert!(is_last_in_build_order(&single.modules()[0], single.modules()));
        assert!(!is_last_in_build_order(&single.modules()[0], &[]));
    }

    #[test]
    fn test_find_existing_data_files_skips_aggregators_and_missing() {
        let (_dir, reactor) = nested();
        write_data(&reactor, "leafB");
        write_data(&reactor, "leafC");

        let candidates: Vec<ModuleId> = ["leafA", "sub", "leafC", "leafB"]
            .iter()
            .map(|name| id(&reactor, name))
            .collect();
        let found = find_existing_data_files(
            &candidates,
            &reactor,
            "target/coverage/coverage.json",
        );

        let found_names: Vec<ModuleId> = found.iter().map(|(id, _)| *id).collect();
        assert_eq!(names(&reactor, &found_names), vec!["leafC", "leafB"]);
        assert!(found.iter().all(|(_, path)| path.is_file()));
    }

    #[test]
    fn test_can_aggregate_now_requires_data() {
        let (_dir, reactor) = nested();
        let index = ParentChildIndex::build(&reactor);
        let top = id(&reactor, "top");
        let rel = "target/coverage/coverage.json";

        assert!(!can_aggregate_now(top, &reactor, &index, rel));

        write_data(&reactor, "leafA");
        assert!(can_aggregate_now(top, &reactor, &index, rel));
        assert!(!can_aggregate_now(id(&reactor, "sub"), &reactor, &index, rel));
    }

    #[test]
    fn test_simple_reactor_scenario() {
        let dir = TempDir::new().unwrap();
        let reactor = reactor_at(
            dir.path(),
            &[
                ("leaf1", "jar", Some("aggregator")),
                ("leaf2", "jar", Some("aggregator")),
                ("aggregator", "pom", None),
            ],
        );
        write_data(&reactor, "leaf1");

        let aggregator = id(&reactor, "aggregator");
        let planner = AggregationPlanner::new(&reactor, aggregator, true);
        assert!(planner.can_aggregate_now());
        assert!(planner.can_generate_aggregate_report());
        assert!(!planner.can_generate_simple_report());

        let plan = planner.plan_for_root(aggregator).unwrap();
        assert_eq!(plan.input_paths(), vec![reactor.find("leaf1").unwrap().settings.data_file.clone()]);
        assert_eq!(names(&reactor, &plan.skipped_leaves()), vec!["leaf2"]);
        assert_eq!(
            plan.aggregate_data_file,
            reactor.get(aggregator).base_dir.join(&planner.layout().relative_data_file)
        );

        let leaf1 = AggregationPlanner::new(&reactor, id(&reactor, "leaf1"), true);
        assert!(leaf1.can_generate_simple_report());
        assert!(!leaf1.can_generate_aggregate_report());
        assert!(!leaf1.can_aggregate_now());
    }

    #[test]
    fn test_aggregate_report_needs_request() {
        let dir = TempDir::new().unwrap();
        let reactor = reactor_at(
            dir.path(),
            &[("leaf", "jar", Some("root")), ("root", "pom", None)],
        );
        write_data(&reactor, "leaf");

        let planner = AggregationPlanner::new(&reactor, id(&reactor, "root"), false);
        assert!(!planner.can_generate_aggregate_report());
        assert!(!planner.can_generate_report());
    }

    #[test]
    fn test_optimistic_report_for_aggregator() {
        let dir = TempDir::new().unwrap();
        let reactor = reactor_at(
            dir.path(),
            &[("root", "pom", None), ("leaf", "jar", Some("root"))],
        );

        let planner = AggregationPlanner::new(&reactor, id(&reactor, "root"), true);
        assert!(!planner.can_generate_aggregate_report());
        assert!(planner.can_generate_report());
    }

    #[test]
    fn test_layout_from_current_module() {
        let (_dir, reactor) = nested();
        let planner = AggregationPlanner::new(&reactor, id(&reactor, "top"), true);
        let layout = planner.layout();

        let sep = std::path::MAIN_SEPARATOR_STR;
        assert_eq!(
            layout.relative_data_file,
            ["target", "coverage", "coverage.json"].join(sep)
        );
        assert_eq!(
            layout.relative_aggregate_output_dir,
            ["target", "site", "coverage"].join(sep)
        );
    }

    #[test]
    fn test_layout_falls_back_outside_base() {
        let dir = TempDir::new().unwrap();
        let manifest = ReactorManifest::parse(
            r#"
[[module]]
name = "root"
base_dir = "root"
packaging = "pom"
data_file = "/elsewhere/coverage.json"
output_directory = "../reports"
"#,
            PathBuf::from("reactor.toml"),
        )
        .unwrap();
        let reactor =
            Reactor::from_manifest(manifest, dir.path(), &GeneralConfig::default()).unwrap();

        let layout = RelativeLayout::derive(&reactor.modules()[0]);
        assert_eq!(layout.relative_data_file, FALLBACK_DATA_FILE);
        assert_eq!(layout.relative_aggregate_output_dir, FALLBACK_OUTPUT_DIR);
    }

    #[test]
    fn test_plan_none_without_data() {
        let (_dir, reactor) = nested();
        let planner = AggregationPlanner::new(&reactor, id(&reactor, "top"), true);
        assert!(planner.plan_for_root(id(&reactor, "top")).is_none());
        assert_eq!(
            names(&reactor, &planner.aggregate_roots()),
            vec!["sub", "top"]
        );
    }
}
