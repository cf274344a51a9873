use anyhow::{Context, Result, anyhow, bail};
use log::{debug, info, warn};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::emit::{BundleArtifact, BundleEmitter};
use crate::graph_builder::GraphBuilder;
use crate::module_graph::{CanonicalModuleId, ModuleGraph};
use crate::source::FsSourceLoader;
use crate::transform::{DownlevelTransformer, EsmTransformer, ModuleTransformer};
use crate::util::path_to_specifier;

/// Drives a full build: graph construction, emission and output.
#[derive(Debug, Clone)]
pub struct Bundler {
    config: Config,
}

impl Bundler {
    pub const fn new(config: Config) -> Self {
        Self { config }
    }

    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Build, emit and write the bundle, returning the path written to.
    pub fn bundle(&self) -> Result<PathBuf> {
        let artifact = self.build_artifact()?;

        let output_path = self.output_path()?;
        if let Some(parent) = output_path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create output directory {}", parent.display())
            })?;
        }
        fs::write(&output_path, artifact.code())
            .with_context(|| format!("Failed to write bundle to {}", output_path.display()))?;

        info!(
            "Wrote {} modules to {}",
            artifact.module_count(),
            output_path.display()
        );
        Ok(output_path)
    }

    /// Build and emit the bundle without writing it.
    pub fn bundle_to_string(&self) -> Result<String> {
        Ok(self.build_artifact()?.into_code())
    }

    pub fn build_artifact(&self) -> Result<BundleArtifact> {
        let graph = self.build_graph()?;
        let artifact = BundleEmitter::new()
            .emit(&graph, graph.entry())
            .context("Failed to emit bundle")?;
        Ok(artifact)
    }

    /// Build the module graph of the configured entry from the filesystem.
    pub fn build_graph(&self) -> Result<ModuleGraph> {
        let root = self.project_root()?;
        let loader = FsSourceLoader::new(&root)
            .with_context(|| format!("Invalid project root {}", root.display()))?;
        debug!("Project root: {}", loader.root().display());

        let entry = self.entry_specifier(&loader)?;
        let downlevel;
        let transformer: &dyn ModuleTransformer = match &self.config.target {
            Some(target) => {
                downlevel = DownlevelTransformer::new(target)?;
                &downlevel
            }
            None => &EsmTransformer,
        };
        let builder = GraphBuilder::new(&loader, transformer, &self.config.extensions);
        let graph = builder
            .build(&entry)
            .with_context(|| format!("Failed to build module graph from {entry}"))?;

        for group in graph.circular_groups() {
            warn!("Circular dependency detected: {}", describe_cycle(&group));
        }
        Ok(graph)
    }

    fn project_root(&self) -> Result<PathBuf> {
        match &self.config.root {
            Some(root) => Ok(root.clone()),
            None => env::current_dir().context("Failed to determine the current directory"),
        }
    }

    fn output_path(&self) -> Result<PathBuf> {
        let output = self.config.output_file();
        if output.is_absolute() {
            return Ok(output);
        }
        Ok(self.project_root()?.join(output))
    }

    /// The configured entry as a specifier relative to the project root.
    fn entry_specifier(&self, loader: &FsSourceLoader) -> Result<String> {
        let entry = self.config.entry.as_deref().ok_or_else(|| {
            anyhow!("No entry module configured; pass --entry or set `entry` in packlet.toml")
        })?;

        if !entry.is_absolute() {
            return Ok(path_to_specifier(entry));
        }
        match absolute_entry_id(loader, entry) {
            Some(id) => Ok(id.to_string()),
            None => bail!(
                "Entry {} lies outside the project root {}",
                entry.display(),
                loader.root().display()
            ),
        }
    }
}

fn absolute_entry_id(loader: &FsSourceLoader, entry: &Path) -> Option<CanonicalModuleId> {
    // The entry may omit its extension, so only its directory has to exist.
    if let Some(id) = loader.id_for_path(entry) {
        return Some(id);
    }
    let parent = entry.parent()?.canonicalize().ok()?;
    loader.id_for_path(&parent.join(entry.file_name()?))
}

fn describe_cycle(group: &[CanonicalModuleId]) -> String {
    let mut chain: Vec<&str> = group.iter().map(CanonicalModuleId::as_str).collect();
    if let Some(first) = chain.first().copied() {
        chain.push(first);
    }
    chain.join(" -> ")
}
