//! Discovery of every module reachable from the entry point.

use std::collections::VecDeque;

use indexmap::{IndexMap, IndexSet};
use log::{debug, info, trace};

use crate::error::BundleResult;
use crate::module_graph::{CanonicalModuleId, Module, ModuleGraph};
use crate::resolver::ModuleResolver;
use crate::source::SourceLoader;
use crate::transform::ModuleTransformer;
use crate::util::normalize_line_endings;

/// Builds a closed [`ModuleGraph`] with a breadth-first worklist.
#[derive(Debug)]
pub struct GraphBuilder<'a> {
    loader: &'a dyn SourceLoader,
    transformer: &'a dyn ModuleTransformer,
    resolver: ModuleResolver<'a>,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(
        loader: &'a dyn SourceLoader,
        transformer: &'a dyn ModuleTransformer,
        extensions: &[String],
    ) -> Self {
        Self {
            loader,
            transformer,
            resolver: ModuleResolver::new(loader, extensions),
        }
    }

    pub const fn resolver(&self) -> &ModuleResolver<'a> {
        &self.resolver
    }

    /// Build the graph of everything reachable from `entry_specifier`.
    ///
    /// Each module is loaded and transformed exactly once, however many
    /// importers it has and whether or not it takes part in a cycle.
    pub fn build(&self, entry_specifier: &str) -> BundleResult<ModuleGraph> {
        let entry = self.resolver.resolve_entry(entry_specifier)?;
        info!("Building module graph from {entry}");

        let mut graph = ModuleGraph::new(entry.clone());
        let mut visited: IndexSet<CanonicalModuleId> = IndexSet::new();
        // Everything ever pushed onto the worklist, so each id is queued once.
        let mut queued: IndexSet<CanonicalModuleId> = IndexSet::from([entry.clone()]);
        let mut worklist: VecDeque<CanonicalModuleId> = VecDeque::from([entry]);

        while let Some(id) = worklist.pop_front() {
            // Marking before parsing keeps a cycle from re-enqueueing a module
            // whose processing has already started.
            if !visited.insert(id.clone()) {
                trace!("Skipping already visited module {id}");
                continue;
            }
            debug!("Processing module {id}");

            let module = self.process(&id, &mut queued, &mut worklist)?;
            graph.insert(module);
        }

        graph.verify_closure()?;
        info!("Module graph contains {} modules", graph.len());
        Ok(graph)
    }

    fn process(
        &self,
        id: &CanonicalModuleId,
        queued: &mut IndexSet<CanonicalModuleId>,
        worklist: &mut VecDeque<CanonicalModuleId>,
    ) -> BundleResult<Module> {
        let source = normalize_line_endings(self.loader.load(id)?);
        let transformed = self.transformer.parse_and_transform(&source, id)?;

        let mut import_map = IndexMap::with_capacity(transformed.import_specifiers.len());
        for specifier in transformed.import_specifiers {
            if import_map.contains_key(&specifier) {
                continue;
            }
            let target = self.resolver.resolve(id, &specifier)?;
            trace!("{id}: '{specifier}' -> {target}");
            if queued.insert(target.clone()) {
                worklist.push_back(target.clone());
            }
            import_map.insert(specifier, target);
        }

        Ok(Module::new(
            id.clone(),
            import_map,
            transformed.transformed_code,
        ))
    }
}
