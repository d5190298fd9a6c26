//! Modules: units of configuration that contribute bindings.
//!
//! A module never touches the graph directly. It declares bindings into a
//! [`Binder`], and the [`Environment`](crate::di::Environment) builds the
//! graph from every module's declarations once, at commit.

mod binder;
mod key;

pub use binder::{Binder, Binding, BindingBuilder, Provider};
pub(crate) use binder::Erased;
pub use key::Key;

use std::fmt;
use std::sync::Arc;

/// Ordered list of modules. Later modules override earlier ones under the
/// default conflict policy.
pub type ModuleList = Vec<Arc<dyn Module>>;

/// Trait for application modules
///
/// # Example
/// ```
/// use ignition::module::{Binder, Module};
///
/// struct DatabaseModule {
///     url: String,
/// }
///
/// impl Module for DatabaseModule {
///     fn name(&self) -> &str {
///         "DatabaseModule"
///     }
///
///     fn configure(&self, binder: &mut Binder) -> anyhow::Result<()> {
///         binder.bind::<String>().named("database.url").to_instance(self.url.clone());
///         Ok(())
///     }
/// }
/// ```
pub trait Module: Send + Sync + 'static {
    /// Name used for provenance and error messages.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Declare this module's bindings.
    fn configure(&self, binder: &mut Binder) -> anyhow::Result<()>;

    /// The bindings this module declares, in declaration order.
    fn bindings(&self) -> anyhow::Result<Vec<Binding>> {
        let mut binder = Binder::new(self.name());
        self.configure(&mut binder)?;
        Ok(binder.into_bindings())
    }
}

impl fmt::Debug for dyn Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Module").field(&self.name()).finish()
    }
}

type ConfigureFn = Box<dyn Fn(&mut Binder) -> anyhow::Result<()> + Send + Sync>;

/// A module defined by a closure.
pub struct FnModule {
    name: String,
    configure: ConfigureFn,
}

impl FnModule {
    pub fn new<F>(name: impl Into<String>, configure: F) -> Self
    where
        F: Fn(&mut Binder) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            configure: Box::new(configure),
        }
    }

    pub fn shared<F>(name: impl Into<String>, configure: F) -> Arc<dyn Module>
    where
        F: Fn(&mut Binder) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Arc::new(Self::new(name, configure))
    }
}

impl Module for FnModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn configure(&self, binder: &mut Binder) -> anyhow::Result<()> {
        (self.configure)(binder)
    }
}

impl fmt::Debug for FnModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnModule").field("name", &self.name).finish()
    }
}

/// A module that replays a fixed list of bindings.
///
/// Transformers use it to hand a rewritten module to the next stage while
/// keeping the original module's name.
#[derive(Debug, Clone)]
pub struct StaticModule {
    name: String,
    bindings: Vec<Binding>,
}

impl StaticModule {
    pub fn new(name: impl Into<String>, bindings: Vec<Binding>) -> Self {
        Self {
            name: name.into(),
            bindings,
        }
    }
}

impl Module for StaticModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn configure(&self, binder: &mut Binder) -> anyhow::Result<()> {
        for binding in &self.bindings {
            binder.add(binding.clone());
        }
        Ok(())
    }

    fn bindings(&self) -> anyhow::Result<Vec<Binding>> {
        Ok(self.bindings.clone())
    }
}
