use std::fmt::Debug;

use js_lowering::{Downleveler, SyntaxError, TargetError};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{BundleError, BundleResult};
use crate::module_graph::CanonicalModuleId;

/// Trailing `//# sourceMappingURL=` comment. Bundles carry no source maps, so
/// a reference left over from an earlier build step would point at the wrong
/// code.
static SOURCE_MAP_COMMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\r?\n)?[ \t]*//[#@][ \t]*sourceMappingURL=[^\s'\x22`]*\s*\z")
        .expect("source map comment pattern is valid")
});

/// Output of the parse + transform step for one module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformedModule {
    /// Static import specifiers in source order, duplicates included.
    pub import_specifiers: Vec<String>,
    /// Code expecting `require` and `exports` bindings.
    pub transformed_code: String,
}

/// Turns module source text into loader-compatible code.
pub trait ModuleTransformer: Debug {
    fn parse_and_transform(
        &self,
        source: &str,
        id: &CanonicalModuleId,
    ) -> BundleResult<TransformedModule>;
}

/// Default transformer: lowers static ES module syntax with `js_lowering`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EsmTransformer;

impl ModuleTransformer for EsmTransformer {
    fn parse_and_transform(
        &self,
        source: &str,
        id: &CanonicalModuleId,
    ) -> BundleResult<TransformedModule> {
        let lowered = js_lowering::lower_module(source).map_err(|err| parse_error(id, err))?;
        log::trace!("{id} exports {:?}", lowered.exported_names);

        let transformed_code = SOURCE_MAP_COMMENT.replace(&lowered.code, "\n").into_owned();
        Ok(TransformedModule {
            import_specifiers: lowered.import_specifiers,
            transformed_code,
        })
    }
}

/// Lowers syntax newer than a configured target, then module syntax.
#[derive(Debug)]
pub struct DownlevelTransformer {
    downleveler: Downleveler,
}

impl DownlevelTransformer {
    pub fn new(target: &str) -> Result<Self, TargetError> {
        Ok(Self {
            downleveler: Downleveler::new(target)?,
        })
    }
}

impl ModuleTransformer for DownlevelTransformer {
    fn parse_and_transform(
        &self,
        source: &str,
        id: &CanonicalModuleId,
    ) -> BundleResult<TransformedModule> {
        let downleveled = self
            .downleveler
            .run(source)
            .map_err(|err| parse_error(id, err))?;
        log::trace!("{id} downleveled to {}", self.downleveler.target());
        EsmTransformer.parse_and_transform(&downleveled, id)
    }
}

fn parse_error(id: &CanonicalModuleId, err: SyntaxError) -> BundleError {
    BundleError::Parse {
        module: id.clone(),
        message: err.message,
        line: err.line,
        column: err.column,
    }
}
