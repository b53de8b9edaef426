//! Handler interface and the name-based registry used to resolve
//! `module.function` references.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::ResolutionError;

/// Input data for one invocation.
pub type Event = serde_json::Map<String, Value>;

/// Auxiliary invocation metadata.
pub type Context = serde_json::Map<String, Value>;

/// A user-supplied callable.
///
/// Errors are reported with their full `Debug` rendering, so an
/// `anyhow::Error` keeps its `Caused by:` chain and backtrace.
pub trait Handler: Send + Sync {
    fn call(&self, event: &Event, context: &Context) -> anyhow::Result<Value>;
}

impl<F> Handler for F
where
    F: Fn(&Event, &Context) -> anyhow::Result<Value> + Send + Sync,
{
    fn call(&self, event: &Event, context: &Context) -> anyhow::Result<Value> {
        self(event, context)
    }
}

/// A named group of handlers, the `module` part of a reference.
#[derive(Default)]
pub struct Module {
    handlers: BTreeMap<String, Box<dyn Handler>>,
}

impl Module {
    /// Register `handler` under `name`, replacing any previous entry.
    pub fn register<F>(&mut self, name: &str, handler: F) -> &mut Self
    where
        F: Fn(&Event, &Context) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.handlers.insert(name.to_string(), Box::new(handler));
        self
    }
}

/// All handlers known to an execution process.
#[derive(Default)]
pub struct Registry {
    modules: BTreeMap<String, Module>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the module called `name`. Dots are allowed, so
    /// `"pkg.tools"` serves references like `pkg.tools.run`.
    pub fn module(&mut self, name: &str) -> &mut Module {
        self.modules.entry(name.to_string()).or_default()
    }

    /// Resolve `module.function`, splitting on the final `.`.
    pub fn resolve(&self, reference: &str) -> Result<&dyn Handler, ResolutionError> {
        let (module, name) = reference
            .rsplit_once('.')
            .filter(|(module, name)| !module.is_empty() && !name.is_empty())
            .ok_or_else(|| ResolutionError::InvalidReference(reference.to_string()))?;

        let handlers = self
            .modules
            .get(module)
            .ok_or_else(|| ResolutionError::ModuleNotFound(module.to_string()))?;

        handlers
            .handlers
            .get(name)
            .map(|handler| handler.as_ref())
            .ok_or_else(|| ResolutionError::HandlerNotFound {
                module: module.to_string(),
                name: name.to_string(),
            })
    }
}
