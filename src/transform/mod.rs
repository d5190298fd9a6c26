//! Module-list transformers.
//!
//! Transformers run once, at commit, before the graph is built. Each one
//! receives the module list produced by the previous one and returns the list
//! handed to the next. They are the extension point for policy: strip a
//! binding, add a diagnostics module, refuse a kind of binding outright.
//!
//! Transformers must be pure functions of their input. Logging is the only
//! side effect they are allowed.

mod builtins;

pub use builtins::{AppendModules, BindingAudit, ExcludeBinding, OverrideWith, RejectBindings};

use crate::error::ConfigurationError;
use crate::module::ModuleList;

/// A pure function from a module list to a module list.
pub trait ModuleTransformer: Send + Sync + 'static {
    /// Name used in logs and error messages.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn transform(&self, modules: ModuleList) -> anyhow::Result<ModuleList>;
}

type TransformFn = Box<dyn Fn(ModuleList) -> anyhow::Result<ModuleList> + Send + Sync>;

/// A transformer defined by a closure.
pub struct FnTransformer {
    name: String,
    transform: TransformFn,
}

impl FnTransformer {
    pub fn new<F>(name: impl Into<String>, transform: F) -> Self
    where
        F: Fn(ModuleList) -> anyhow::Result<ModuleList> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            transform: Box::new(transform),
        }
    }
}

impl ModuleTransformer for FnTransformer {
    fn name(&self) -> &str {
        &self.name
    }

    fn transform(&self, modules: ModuleList) -> anyhow::Result<ModuleList> {
        (self.transform)(modules)
    }
}

/// Transformers in registration order.
#[derive(Default)]
pub struct ModuleTransformerChain {
    transformers: Vec<Box<dyn ModuleTransformer>>,
}

impl ModuleTransformerChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<T: ModuleTransformer>(&mut self, transformer: T) {
        self.transformers.push(Box::new(transformer));
    }

    pub fn with<T: ModuleTransformer>(mut self, transformer: T) -> Self {
        self.push(transformer);
        self
    }

    pub fn len(&self) -> usize {
        self.transformers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transformers.is_empty()
    }

    /// Fold the chain over `modules`, left to right.
    ///
    /// Duplicate bindings are left alone; they are settled by the graph build.
    pub fn apply(&self, mut modules: ModuleList) -> Result<ModuleList, ConfigurationError> {
        for transformer in &self.transformers {
            let before = modules.len();
            modules = transformer.transform(modules).map_err(|source| {
                match source.downcast::<ConfigurationError>() {
                    Ok(config) => config,
                    Err(source) => ConfigurationError::TransformerFailed {
                        transformer: transformer.name().to_string(),
                        source,
                    },
                }
            })?;

            if modules.is_empty() {
                tracing::warn!(
                    transformer = transformer.name(),
                    "Module transformer returned an empty module list; all bindings discarded"
                );
            } else {
                tracing::debug!(
                    transformer = transformer.name(),
                    before,
                    after = modules.len(),
                    "Module transformer applied"
                );
            }
        }
        Ok(modules)
    }
}

impl std::fmt::Debug for ModuleTransformerChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.transformers.iter().map(|t| t.name()).collect();
        f.debug_struct("ModuleTransformerChain")
            .field("transformers", &names)
            .finish()
    }
}
