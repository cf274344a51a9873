//! In-process loader with the same semantics as the emitted bundle runtime.
//!
//! Module bodies are compiled once into closures that receive a local
//! [`Require`] and the module's [`Exports`]. All loader state lives in an
//! explicit [`LoaderState`] owned by a [`Runtime`], which borrows an
//! immutable [`ModuleRegistry`].

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use log::{debug, trace};
use rustc_hash::FxHashMap;
use serde_json::Value;
use thiserror::Error;

use crate::module_graph::{CanonicalModuleId, Module, ModuleGraph};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("module {0} is not registered")]
    UnknownModule(CanonicalModuleId),

    #[error("cannot resolve '{specifier}' from {importer}")]
    UnresolvedSpecifier {
        importer: CanonicalModuleId,
        specifier: String,
    },

    #[error("error while executing {module}: {message}")]
    Execution {
        module: CanonicalModuleId,
        message: String,
    },
}

impl RuntimeError {
    pub fn execution(module: &CanonicalModuleId, message: impl Into<String>) -> Self {
        Self::Execution {
            module: module.clone(),
            message: message.into(),
        }
    }
}

/// Reads the current value of a module-local binding; `None` while the
/// binding is uninitialized.
pub type ExportGetter = Rc<dyn Fn() -> Option<Value>>;

#[derive(Clone)]
enum ExportSlot {
    Value(Value),
    Getter(ExportGetter),
}

impl fmt::Debug for ExportSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Getter(_) => f.write_str("Getter"),
        }
    }
}

/// Shared, mutable exports object of one module instance.
///
/// An export is either a plain value or a getter over a local binding, the
/// in-process counterpart of `Object.defineProperty(exports, name, { get })`
/// in lowered code. Clones are handles to the same object; use
/// [`Exports::ptr_eq`] to compare identity.
#[derive(Debug, Clone, Default)]
pub struct Exports(Rc<RefCell<IndexMap<String, ExportSlot>>>);

impl Exports {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of `name`. Getters run after the borrow is released, so
    /// they may read other exports, including this object's.
    pub fn get(&self, name: &str) -> Option<Value> {
        let slot = self.0.borrow().get(name).cloned()?;
        match slot {
            ExportSlot::Value(value) => Some(value),
            ExportSlot::Getter(getter) => getter(),
        }
    }

    pub fn set(&self, name: impl Into<String>, value: impl Into<Value>) {
        self.0
            .borrow_mut()
            .insert(name.into(), ExportSlot::Value(value.into()));
    }

    pub fn define_getter<F>(&self, name: impl Into<String>, getter: F)
    where
        F: Fn() -> Option<Value> + 'static,
    {
        self.0
            .borrow_mut()
            .insert(name.into(), ExportSlot::Getter(Rc::new(getter)));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.borrow().contains_key(name)
    }

    /// Exported names in definition order.
    pub fn keys(&self) -> Vec<String> {
        self.0.borrow().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Snapshot of the current contents as a JSON object. Uninitialized
    /// bindings read as `null`.
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.keys()
                .into_iter()
                .map(|name| {
                    let value = self.get(&name).unwrap_or(Value::Null);
                    (name, value)
                })
                .collect(),
        )
    }
}

/// Compiled module code.
pub type ModuleBody = Box<dyn Fn(&mut Require<'_, '_>, &Exports) -> Result<(), RuntimeError>>;

pub struct RegisteredModule {
    import_map: IndexMap<String, CanonicalModuleId>,
    body: ModuleBody,
}

impl RegisteredModule {
    pub const fn import_map(&self) -> &IndexMap<String, CanonicalModuleId> {
        &self.import_map
    }
}

impl fmt::Debug for RegisteredModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredModule")
            .field("import_map", &self.import_map)
            .finish_non_exhaustive()
    }
}

/// Read-only registry of compiled modules.
pub struct ModuleRegistry {
    entry: CanonicalModuleId,
    modules: IndexMap<CanonicalModuleId, RegisteredModule>,
}

impl ModuleRegistry {
    pub fn new(entry: CanonicalModuleId) -> Self {
        Self {
            entry,
            modules: IndexMap::new(),
        }
    }

    /// Register a module body. A later registration for the same id replaces
    /// the earlier one.
    pub fn register<F>(
        &mut self,
        id: CanonicalModuleId,
        import_map: IndexMap<String, CanonicalModuleId>,
        body: F,
    ) where
        F: Fn(&mut Require<'_, '_>, &Exports) -> Result<(), RuntimeError> + 'static,
    {
        self.modules.insert(
            id,
            RegisteredModule {
                import_map,
                body: Box::new(body),
            },
        );
    }

    /// Compile every module of `graph` once with `compile`.
    pub fn from_graph<F>(graph: &ModuleGraph, mut compile: F) -> Result<Self, RuntimeError>
    where
        F: FnMut(&Module) -> Result<ModuleBody, RuntimeError>,
    {
        let mut registry = Self::new(graph.entry().clone());
        for module in graph.modules() {
            let body = compile(module)?;
            registry.modules.insert(
                module.id().clone(),
                RegisteredModule {
                    import_map: module.import_map().clone(),
                    body,
                },
            );
        }
        debug!("Compiled {} modules into registry", registry.modules.len());
        Ok(registry)
    }

    pub const fn entry(&self) -> &CanonicalModuleId {
        &self.entry
    }

    pub fn get(&self, id: &CanonicalModuleId) -> Option<&RegisteredModule> {
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
}

impl fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("entry", &self.entry)
            .field("modules", &self.modules.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Lifecycle of one module within a [`Runtime`].
#[derive(Debug, Clone)]
pub enum ModuleState {
    Unloaded,
    /// Body is executing; the exports may be partially populated.
    Loading(Exports),
    Loaded(Exports),
}

impl ModuleState {
    pub const fn exports(&self) -> Option<&Exports> {
        match self {
            Self::Unloaded => None,
            Self::Loading(exports) | Self::Loaded(exports) => Some(exports),
        }
    }
}

/// Memoization cache of a [`Runtime`]. Modules without an entry are unloaded.
#[derive(Debug, Default)]
pub struct LoaderState {
    modules: FxHashMap<CanonicalModuleId, ModuleState>,
}

impl LoaderState {
    pub fn state(&self, id: &CanonicalModuleId) -> ModuleState {
        self.modules
            .get(id)
            .cloned()
            .unwrap_or(ModuleState::Unloaded)
    }

    /// Number of modules that are loading or loaded.
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

#[derive(Debug)]
pub struct Runtime<'reg> {
    registry: &'reg ModuleRegistry,
    state: LoaderState,
}

impl<'reg> Runtime<'reg> {
    pub fn new(registry: &'reg ModuleRegistry) -> Self {
        Self {
            registry,
            state: LoaderState::default(),
        }
    }

    /// Require the registry's entry module.
    pub fn run(&mut self) -> Result<Exports, RuntimeError> {
        let registry = self.registry;
        self.require(registry.entry())
    }

    /// Return the exports of `id`, executing its body on first use.
    ///
    /// A module that is still loading yields its partial exports. If the
    /// body fails, the module goes back to unloaded and the error propagates.
    pub fn require(&mut self, id: &CanonicalModuleId) -> Result<Exports, RuntimeError> {
        match self.state.modules.get(id) {
            Some(ModuleState::Loaded(exports)) => return Ok(exports.clone()),
            Some(ModuleState::Loading(exports)) => {
                trace!("Circular require of {id}, returning partial exports");
                return Ok(exports.clone());
            }
            Some(ModuleState::Unloaded) | None => {}
        }

        let registry = self.registry;
        let (id, module) = registry
            .modules
            .get_key_value(id)
            .ok_or_else(|| RuntimeError::UnknownModule(id.clone()))?;

        trace!("Executing {id}");
        let exports = Exports::new();
        self.state
            .modules
            .insert(id.clone(), ModuleState::Loading(exports.clone()));

        let result = {
            let mut require = Require {
                runtime: self,
                importer: id,
                module,
            };
            (module.body)(&mut require, &exports)
        };

        match result {
            Ok(()) => {
                self.state
                    .modules
                    .insert(id.clone(), ModuleState::Loaded(exports.clone()));
                Ok(exports)
            }
            Err(err) => {
                debug!("Module {id} failed, discarding its cache entry: {err}");
                self.state.modules.remove(id);
                Err(err)
            }
        }
    }

    pub fn state(&self, id: &CanonicalModuleId) -> ModuleState {
        self.state.state(id)
    }

    pub const fn loader_state(&self) -> &LoaderState {
        &self.state
    }
}

/// The `require` binding handed to a module body; resolves specifiers
/// through the importing module's import map.
#[derive(Debug)]
pub struct Require<'rt, 'reg> {
    runtime: &'rt mut Runtime<'reg>,
    importer: &'reg CanonicalModuleId,
    module: &'reg RegisteredModule,
}

impl Require<'_, '_> {
    pub fn require(&mut self, specifier: &str) -> Result<Exports, RuntimeError> {
        let target = self.module.import_map.get(specifier).ok_or_else(|| {
            RuntimeError::UnresolvedSpecifier {
                importer: self.importer.clone(),
                specifier: specifier.to_owned(),
            }
        })?;
        self.runtime.require(target)
    }

    /// Id of the module whose body is running.
    pub const fn importer(&self) -> &CanonicalModuleId {
        self.importer
    }

    pub fn state(&self, id: &CanonicalModuleId) -> ModuleState {
        self.runtime.state(id)
    }
}
