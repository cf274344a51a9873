pub mod bundler;
pub mod combine;
pub mod config;
pub mod dirs;
pub mod emit;
pub mod error;
pub mod graph_builder;
pub mod module_graph;
pub mod resolver;
pub mod runtime;
pub mod source;
pub mod transform;
pub mod util;

pub use bundler::Bundler;
pub use config::Config;
pub use emit::{BundleArtifact, BundleEmitter};
pub use error::{BundleError, BundleResult};
pub use graph_builder::GraphBuilder;
pub use module_graph::{CanonicalModuleId, Module, ModuleGraph};
pub use resolver::ModuleResolver;
pub use runtime::{Exports, ModuleRegistry, Runtime, RuntimeError};
pub use source::{FsSourceLoader, MemorySourceLoader, SourceLoader};
pub use transform::{DownlevelTransformer, EsmTransformer, ModuleTransformer, TransformedModule};
