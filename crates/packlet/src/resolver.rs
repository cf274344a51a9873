use std::cell::RefCell;

use log::{debug, trace};
use rustc_hash::FxHashMap;

use crate::error::{BundleError, BundleResult};
use crate::module_graph::CanonicalModuleId;
use crate::source::SourceLoader;

/// Extensions tried when a specifier does not name a source directly.
pub const DEFAULT_EXTENSIONS: &[&str] = &[".js", ".mjs", ".cjs"];

const ENTRY_IMPORTER: &str = "<entry>";

/// Maps import specifiers to canonical module ids.
#[derive(Debug)]
pub struct ModuleResolver<'a> {
    loader: &'a dyn SourceLoader,
    extensions: Vec<String>,
    /// Normalized base path to the source it resolved to, if any
    lookup_cache: RefCell<FxHashMap<CanonicalModuleId, Option<CanonicalModuleId>>>,
}

impl<'a> ModuleResolver<'a> {
    pub fn new(loader: &'a dyn SourceLoader, extensions: &[String]) -> Self {
        Self {
            loader,
            extensions: extensions.to_vec(),
            lookup_cache: RefCell::default(),
        }
    }

    /// Resolver probing [`DEFAULT_EXTENSIONS`].
    pub fn with_default_extensions(loader: &'a dyn SourceLoader) -> Self {
        let extensions: Vec<String> = DEFAULT_EXTENSIONS
            .iter()
            .map(|ext| (*ext).to_owned())
            .collect();
        Self::new(loader, &extensions)
    }

    /// Resolve `specifier` as imported by `importer`.
    ///
    /// Relative specifiers are joined against the importer's directory and
    /// absolute ones are taken as-is. Bare specifiers are rejected since there
    /// is no package lookup.
    pub fn resolve(
        &self,
        importer: &CanonicalModuleId,
        specifier: &str,
    ) -> BundleResult<CanonicalModuleId> {
        let base = if is_relative(specifier) {
            importer.join_relative(specifier)
        } else if specifier.starts_with('/') {
            CanonicalModuleId::new(specifier)
        } else if specifier.is_empty() {
            return Err(BundleError::resolution(importer, specifier, "empty module specifier"));
        } else {
            return Err(BundleError::resolution(
                importer,
                specifier,
                "bare module specifiers are not supported; use a relative or absolute path",
            ));
        };

        self.find_source(&base).ok_or_else(|| {
            BundleError::resolution(importer, specifier, format!("no module found at {base}"))
        })
    }

    /// Resolve the entry point relative to the project root.
    ///
    /// Unlike imports, `src/main.js` is accepted here and means `/src/main.js`.
    pub fn resolve_entry(&self, specifier: &str) -> BundleResult<CanonicalModuleId> {
        if specifier.trim().is_empty() {
            return Err(BundleError::resolution(
                ENTRY_IMPORTER,
                specifier,
                "empty entry specifier",
            ));
        }
        let base = CanonicalModuleId::new(specifier);
        let resolved = self.find_source(&base).ok_or_else(|| {
            BundleError::resolution(
                ENTRY_IMPORTER,
                specifier,
                format!("no module found at {base}"),
            )
        })?;
        debug!("Resolved entry '{specifier}' to {resolved}");
        Ok(resolved)
    }

    /// First existing candidate among `base`, `base` + extension and
    /// `base/index` + extension.
    fn find_source(&self, base: &CanonicalModuleId) -> Option<CanonicalModuleId> {
        if let Some(cached) = self.lookup_cache.borrow().get(base) {
            return cached.clone();
        }

        let found = self.candidates(base).find(|candidate| {
            let exists = self.loader.exists(candidate);
            trace!("Probing {candidate}: {}", if exists { "found" } else { "missing" });
            exists
        });
        self.lookup_cache
            .borrow_mut()
            .insert(base.clone(), found.clone());
        found
    }

    fn candidates<'b>(
        &'b self,
        base: &'b CanonicalModuleId,
    ) -> impl Iterator<Item = CanonicalModuleId> + 'b {
        let with_extension = self.extensions.iter().map(|ext| base.with_suffix(ext));
        let index = CanonicalModuleId::new(&format!("{base}/index"));
        let with_index = self
            .extensions
            .iter()
            .map(move |ext| index.with_suffix(ext));

        std::iter::once(base.clone())
            .chain(with_extension)
            .chain(with_index)
    }
}

fn is_relative(specifier: &str) -> bool {
    specifier == "."
        || specifier == ".."
        || specifier.starts_with("./")
        || specifier.starts_with("../")
}
