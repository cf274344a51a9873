//! Serialization of a module graph into a single self-contained script.

use std::fmt;

use js_lowering::quote;
use log::debug;

use crate::error::{BundleError, BundleResult};
use crate::module_graph::{CanonicalModuleId, Module, ModuleGraph};

/// Bootstrap wrapper. The cache entry is created before a module body runs,
/// so a circular `require` gets the partially populated `exports`, and it is
/// removed again if the body throws.
const RUNTIME_PROLOGUE: &str = r#"(function (modules) {
  "use strict";
  var cache = {};
  var hasOwn = Object.prototype.hasOwnProperty;

  function require(id) {
    if (hasOwn.call(cache, id)) {
      return cache[id];
    }
    if (!hasOwn.call(modules, id)) {
      throw new Error("Cannot find module '" + id + "'");
    }
    var module = modules[id];
    var exports = {};
    cache[id] = exports;

    function localRequire(specifier) {
      if (!hasOwn.call(module.dependencies, specifier)) {
        throw new Error("Cannot resolve '" + specifier + "' from '" + id + "'");
      }
      return require(module.dependencies[specifier]);
    }

    try {
      module.code(localRequire, exports);
    } catch (error) {
      delete cache[id];
      throw error;
    }
    return exports;
  }

"#;

/// The emitted bundle. Written once, never modified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleArtifact {
    entry: CanonicalModuleId,
    module_count: usize,
    code: String,
}

impl BundleArtifact {
    pub const fn entry(&self) -> &CanonicalModuleId {
        &self.entry
    }

    pub const fn module_count(&self) -> usize {
        self.module_count
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn into_code(self) -> String {
        self.code
    }
}

impl fmt::Display for BundleArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BundleEmitter;

impl BundleEmitter {
    pub const fn new() -> Self {
        Self
    }

    /// Serialize `graph` into a bundle that starts by requiring `entry`.
    pub fn emit(
        &self,
        graph: &ModuleGraph,
        entry: &CanonicalModuleId,
    ) -> BundleResult<BundleArtifact> {
        if !graph.contains(entry) {
            return Err(BundleError::resolution(
                "<bundle>",
                entry.as_str(),
                "entry module is not part of the module graph",
            ));
        }
        graph.verify_closure()?;

        let capacity = RUNTIME_PROLOGUE.len()
            + graph
                .modules()
                .map(|module| module.code().len() + 128)
                .sum::<usize>();
        let mut code = String::with_capacity(capacity);

        code.push_str(RUNTIME_PROLOGUE);
        code.push_str(&format!("  require({});\n", quote(entry.as_str())));
        code.push_str("})({\n");

        let count = graph.len();
        for (index, module) in graph.modules().enumerate() {
            push_registry_entry(&mut code, module);
            code.push_str(if index + 1 < count { "  },\n" } else { "  }\n" });
        }
        code.push_str("});\n");

        debug!("Emitted bundle for {entry} with {count} modules ({} bytes)", code.len());
        Ok(BundleArtifact {
            entry: entry.clone(),
            module_count: count,
            code,
        })
    }
}

/// Module code is embedded unindented so template literals keep their text.
fn push_registry_entry(out: &mut String, module: &Module) {
    let dependencies = module
        .import_map()
        .iter()
        .map(|(specifier, target)| format!("{}: {}", quote(specifier), quote(target.as_str())))
        .collect::<Vec<_>>();

    out.push_str(&format!("  {}: {{\n", quote(module.id().as_str())));
    if dependencies.is_empty() {
        out.push_str("    dependencies: {},\n");
    } else {
        out.push_str(&format!("    dependencies: {{ {} }},\n", dependencies.join(", ")));
    }
    out.push_str("    code: function (require, exports) {\n");
    out.push_str(module.code());
    if !module.code().ends_with('\n') {
        out.push('\n');
    }
    out.push_str("    }\n");
}
