use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::module_graph::CanonicalModuleId;

/// Fatal build failures. None of them are retried; the first one aborts the
/// whole build.
#[derive(Debug, Error)]
pub enum BundleError {
    #[error("failed to parse {module} at {line}:{column}: {message}")]
    Parse {
        module: CanonicalModuleId,
        message: String,
        line: usize,
        column: usize,
    },

    #[error("cannot resolve '{specifier}' from {importer}: {reason}")]
    Resolution {
        importer: String,
        specifier: String,
        reason: String,
    },

    #[error("failed to read {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl BundleError {
    pub(crate) fn resolution(
        importer: impl ToString,
        specifier: &str,
        reason: impl Into<String>,
    ) -> Self {
        Self::Resolution {
            importer: importer.to_string(),
            specifier: specifier.to_owned(),
            reason: reason.into(),
        }
    }
}

pub type BundleResult<T> = Result<T, BundleError>;
