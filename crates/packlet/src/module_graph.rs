//! Module identities, processed modules and the closed module graph.

use std::fmt;

use indexmap::IndexMap;
use log::trace;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use rustc_hash::FxHashMap;

use crate::error::{BundleError, BundleResult};

/// Canonical identity of a module: an absolute, `/`-separated path with no
/// `.` or `..` segments and no trailing slash.
///
/// Two specifiers that name the same module always produce equal ids, which
/// makes this the deduplication key of the graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CanonicalModuleId(String);

impl CanonicalModuleId {
    /// Lexically canonicalize `path` as an absolute path.
    ///
    /// `..` at the root stays at the root, so the result never escapes `/`.
    pub fn new(path: &str) -> Self {
        let mut segments: Vec<&str> = Vec::new();
        for segment in path.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    segments.pop();
                }
                segment => segments.push(segment),
            }
        }

        let mut canonical = String::with_capacity(path.len() + 1);
        for segment in segments {
            canonical.push('/');
            canonical.push_str(segment);
        }
        if canonical.is_empty() {
            canonical.push('/');
        }
        Self(canonical)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Directory containing this module, `/` for top-level modules.
    pub fn dir(&self) -> &str {
        match self.0.rfind('/') {
            Some(0) | None => "/",
            Some(index) => &self.0[..index],
        }
    }

    /// Resolve `relative` against the directory containing this module.
    pub fn join_relative(&self, relative: &str) -> Self {
        Self::new(&format!("{}/{relative}", self.dir()))
    }

    /// Append a raw suffix (such as a file extension) to the path.
    pub(crate) fn with_suffix(&self, suffix: &str) -> Self {
        Self::new(&format!("{}{suffix}", self.0))
    }

    /// Path segments without the leading root.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|segment| !segment.is_empty())
    }
}

impl fmt::Display for CanonicalModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CanonicalModuleId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// One source module after processing. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    id: CanonicalModuleId,
    import_map: IndexMap<String, CanonicalModuleId>,
    code: String,
}

impl Module {
    pub const fn new(
        id: CanonicalModuleId,
        import_map: IndexMap<String, CanonicalModuleId>,
        code: String,
    ) -> Self {
        Self {
            id,
            import_map,
            code,
        }
    }

    pub const fn id(&self) -> &CanonicalModuleId {
        &self.id
    }

    /// Import specifier to resolved target, in order of first appearance.
    pub const fn import_map(&self) -> &IndexMap<String, CanonicalModuleId> {
        &self.import_map
    }

    /// Loader-compatible code expecting `require` and `exports` bindings.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Distinct modules this module depends on, in first-appearance order.
    pub fn dependencies(&self) -> impl Iterator<Item = &CanonicalModuleId> {
        let mut seen = Vec::with_capacity(self.import_map.len());
        self.import_map.values().filter(move |target| {
            if seen.contains(target) {
                false
            } else {
                seen.push(*target);
                true
            }
        })
    }
}

/// Every module reachable from the entry, keyed by id in discovery order.
#[derive(Debug, Clone)]
pub struct ModuleGraph {
    entry: CanonicalModuleId,
    modules: IndexMap<CanonicalModuleId, Module>,
}

impl ModuleGraph {
    pub(crate) fn new(entry: CanonicalModuleId) -> Self {
        Self {
            entry,
            modules: IndexMap::new(),
        }
    }

    /// Assemble a graph from already processed modules and verify that it is
    /// closed over its `import_map` edges.
    pub fn from_modules(
        entry: CanonicalModuleId,
        modules: impl IntoIterator<Item = Module>,
    ) -> BundleResult<Self> {
        let mut graph = Self::new(entry);
        for module in modules {
            graph.insert(module);
        }
        if !graph.contains(&graph.entry) {
            return Err(BundleError::Resolution {
                importer: "<entry>".to_owned(),
                specifier: graph.entry.to_string(),
                reason: "entry module is not part of the graph".to_owned(),
            });
        }
        graph.verify_closure()?;
        Ok(graph)
    }

    /// Insert a module, keeping the first one registered for an id.
    pub(crate) fn insert(&mut self, module: Module) {
        if self.modules.contains_key(module.id()) {
            trace!("Module {} already present in graph", module.id());
            return;
        }
        self.modules.insert(module.id().clone(), module);
    }

    pub const fn entry(&self) -> &CanonicalModuleId {
        &self.entry
    }

    pub fn get(&self, id: &CanonicalModuleId) -> Option<&Module> {
        self.modules.get(id)
    }

    pub fn contains(&self, id: &CanonicalModuleId) -> bool {
        self.modules.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Modules in discovery order.
    pub fn modules(&self) -> impl Iterator<Item = &Module> {
        self.modules.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &CanonicalModuleId> {
        self.modules.keys()
    }

    /// Check that every import target is itself a module of the graph.
    pub fn verify_closure(&self) -> BundleResult<()> {
        for module in self.modules.values() {
            for (specifier, target) in module.import_map() {
                if !self.modules.contains_key(target) {
                    return Err(BundleError::Resolution {
                        importer: module.id().to_string(),
                        specifier: specifier.clone(),
                        reason: format!("resolved module {target} is missing from the graph"),
                    });
                }
            }
        }
        Ok(())
    }

    /// Groups of modules that import each other, including modules that
    /// import themselves.
    ///
    /// Members of a group and the groups themselves are listed in discovery
    /// order.
    pub fn circular_groups(&self) -> Vec<Vec<CanonicalModuleId>> {
        let mut graph: DiGraph<usize, ()> = DiGraph::new();
        let mut nodes: FxHashMap<&CanonicalModuleId, NodeIndex> = FxHashMap::default();
        for (position, id) in self.modules.keys().enumerate() {
            nodes.insert(id, graph.add_node(position));
        }
        for module in self.modules.values() {
            let from = nodes[module.id()];
            for target in module.dependencies() {
                if let Some(&to) = nodes.get(target) {
                    graph.update_edge(from, to, ());
                }
            }
        }

        let mut groups: Vec<Vec<usize>> = tarjan_scc(&graph)
            .into_iter()
            .filter(|component| {
                component.len() > 1
                    || component
                        .first()
                        .is_some_and(|&node| graph.contains_edge(node, node))
            })
            .map(|component| {
                let mut positions: Vec<usize> =
                    component.into_iter().map(|node| graph[node]).collect();
                positions.sort_unstable();
                positions
            })
            .collect();
        groups.sort_unstable_by_key(|positions| positions[0]);

        groups
            .into_iter()
            .map(|positions| {
                positions
                    .into_iter()
                    .filter_map(|position| self.modules.get_index(position))
                    .map(|(id, _)| id.clone())
                    .collect()
            })
            .collect()
    }
}
