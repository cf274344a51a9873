use std::fmt;
use std::path::Path;

use oxc_allocator::Allocator;
use oxc_codegen::Codegen;
use oxc_parser::Parser;
use oxc_semantic::SemanticBuilder;
use oxc_span::SourceType;
use oxc_transformer::{TransformOptions, Transformer};
use thiserror::Error;

use crate::error::SyntaxError;

/// A target string the transformer does not understand.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported target {target:?}: {reason}")]
pub struct TargetError {
    pub target: String,
    pub reason: String,
}

/// Lowers syntax newer than a target (`es2015`, `chrome80`, ...) while
/// leaving module syntax alone for [`crate::lower_module`].
///
/// Transforms that need runtime helpers import them from
/// `@oxc-project/runtime`, which the bundler treats as an unresolvable bare
/// specifier.
pub struct Downleveler {
    target: String,
    options: TransformOptions,
}

impl fmt::Debug for Downleveler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Downleveler")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

impl Downleveler {
    pub fn new(target: &str) -> Result<Self, TargetError> {
        let options = TransformOptions::from_target(target).map_err(|reason| TargetError {
            target: target.to_owned(),
            reason: reason.to_string(),
        })?;
        Ok(Self {
            target: target.to_owned(),
            options,
        })
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Parse, transform and print `source`. Errors are positioned in `source`.
    pub fn run(&self, source: &str) -> Result<String, SyntaxError> {
        let allocator = Allocator::default();
        let parsed = Parser::new(&allocator, source, SourceType::mjs()).parse();
        if let Some(diagnostic) = parsed.errors.first() {
            return Err(SyntaxError::from_diagnostic(source, diagnostic));
        }

        let mut program = parsed.program;
        let scoping = SemanticBuilder::new().build(&program).semantic.into_scoping();
        let transformed = Transformer::new(&allocator, Path::new("module.mjs"), &self.options)
            .build_with_scoping(scoping, &mut program);
        if let Some(diagnostic) = transformed.errors.first() {
            return Err(SyntaxError::from_diagnostic(source, diagnostic));
        }

        Ok(Codegen::new().build(&program).code)
    }
}
