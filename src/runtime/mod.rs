//! Application Bootstrap
//!
//! [`Runtime`] owns one [`Environment`], one [`LifecycleRegistry`] and one
//! [`EventDispatcher`] and drives them through the bootstrap sequence:
//! commit the graph, resolve the managed components, start them in order,
//! and later stop them again.

mod event;

pub use event::RuntimeEvent;

use crate::config::RuntimeConfig;
use crate::di::{ConflictPolicy, Environment, EnvironmentState};
use crate::error::{ConfigurationError, IgnitionError, Result};
use crate::lifecycle::{
    LifecycleError, LifecycleRegistry, ManagedComponent, ShutdownReport, TimeBounded,
    shutdown_signal,
};
use crate::messaging::EventDispatcher;
use crate::module::{FnModule, Module, ModuleList};
use crate::transform::{ModuleTransformer, ModuleTransformerChain};
use std::future::Future;
use std::sync::Arc;

type ManagedFactory =
    Box<dyn FnOnce(&Environment) -> anyhow::Result<Arc<dyn ManagedComponent>> + Send + Sync>;

/// A lifecycle entry waiting for the committed graph.
struct ManagedEntry {
    name: String,
    order: i32,
    factory: ManagedFactory,
}

/// Bootstrap sequence owner
///
/// # Example
///
/// ```rust,ignore
/// use ignition::prelude::*;
///
/// #[tokio::main]
/// async fn main() {
///     let mut runtime = Runtime::builder()
///         .config(RuntimeConfig::from_env().unwrap_or_default())
///         .module(AppModule)
///         .managed("database", 10, |env| {
///             let database: Arc<dyn ManagedComponent> = env.lookup::<DatabaseService>()?;
///             Ok(database)
///         })
///         .component(20, Arc::new(HttpListener::new()))
///         .build();
///
///     if let Err(err) = runtime.run_until_signal().await {
///         tracing::error!("{}", err);
///         std::process::exit(err.exit_code());
///     }
/// }
/// ```
pub struct Runtime {
    environment: Environment,
    registry: LifecycleRegistry,
    dispatcher: EventDispatcher,
    config: RuntimeConfig,
    managed: Vec<ManagedEntry>,
}

impl Runtime {
    /// Create a new runtime builder
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn registry(&self) -> &LifecycleRegistry {
        &self.registry
    }

    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Commit the environment, resolve managed components and boot them.
    ///
    /// Publishes [`RuntimeEvent::Started`] on success. On failure publishes
    /// [`RuntimeEvent::BootFailed`] and returns the error; any component that
    /// had started has been stopped again by then. A runtime starts once.
    pub async fn start(&mut self) -> Result<()> {
        if self.environment.state() != EnvironmentState::Uncommitted {
            return Err(ConfigurationError::AlreadyCommitted.into());
        }

        tracing::info!("Starting runtime...");
        match self.bring_up().await {
            Ok(()) => {
                let components = self.registry.targets();
                tracing::info!("Runtime started ({} managed components)", components.len());
                self.notify(&RuntimeEvent::Started { components });
                Ok(())
            }
            Err(err) => {
                let (target, order) = match &err {
                    IgnitionError::Lifecycle(LifecycleError::Boot(boot)) => {
                        (Some(boot.target.clone()), Some(boot.order))
                    }
                    IgnitionError::ManagedResolution { name, .. } => (Some(name.clone()), None),
                    _ => (None, None),
                };
                tracing::error!(exit_code = err.exit_code(), "Runtime failed to start: {}", err);
                self.notify(&RuntimeEvent::BootFailed {
                    target,
                    order,
                    error: err.to_string(),
                    exit_code: err.exit_code(),
                });
                Err(err)
            }
        }
    }

    async fn bring_up(&mut self) -> Result<()> {
        self.environment.commit()?;

        for ManagedEntry {
            name,
            order,
            factory,
        } in std::mem::take(&mut self.managed)
        {
            let component = factory(&self.environment).map_err(|source| {
                IgnitionError::ManagedResolution {
                    name: name.clone(),
                    source,
                }
            })?;
            let component = self.time_bounded(component);
            self.registry.register_named(name, component, order)?;
        }

        self.registry.boot().await?;
        Ok(())
    }

    fn time_bounded(&self, component: Arc<dyn ManagedComponent>) -> Arc<dyn ManagedComponent> {
        if !self.config.is_time_bounded() {
            return component;
        }
        Arc::new(TimeBounded::with_timeouts(
            component,
            self.config.start_timeout(),
            self.config.stop_timeout(),
        ))
    }

    /// Stop every started component, highest order first.
    ///
    /// Publishes [`RuntimeEvent::Stopping`] before the sweep and
    /// [`RuntimeEvent::Stopped`] after it.
    pub async fn shutdown(&self) -> ShutdownReport {
        tracing::info!("Shutting down runtime...");
        self.notify(&RuntimeEvent::Stopping);

        let report = self.registry.shutdown().await;

        self.notify(&RuntimeEvent::Stopped {
            report: report.clone(),
        });
        tracing::info!("Runtime shutdown complete");
        report
    }

    /// Start, wait for `signal`, then shut down.
    pub async fn run_until<F>(&mut self, signal: F) -> Result<ShutdownReport>
    where
        F: Future<Output = ()>,
    {
        self.start().await?;
        signal.await;
        Ok(self.shutdown().await)
    }

    /// Start, wait for Ctrl+C or SIGTERM, then shut down.
    ///
    /// Fails without starting anything if `install_signal_handler` is off.
    pub async fn run_until_signal(&mut self) -> Result<ShutdownReport> {
        if !self.config.install_signal_handler {
            return Err(IgnitionError::InvalidConfig(
                "install_signal_handler is disabled; use run_until".to_string(),
            ));
        }
        self.run_until(shutdown_signal()).await
    }

    fn notify(&self, event: &RuntimeEvent) {
        if let Err(e) = self.dispatcher.publish(event) {
            tracing::debug!(event = event.kind(), "Runtime event listeners failed: {}", e);
        }
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("environment", &self.environment.state())
            .field("registry", &self.registry)
            .field("config", &self.config)
            .field("unresolved", &self.managed.len())
            .finish()
    }
}

/// Builder for Runtime
pub struct RuntimeBuilder {
    modules: ModuleList,
    transformers: ModuleTransformerChain,
    conflict_policy: Option<ConflictPolicy>,
    config: RuntimeConfig,
    dispatcher: Option<EventDispatcher>,
    managed: Vec<ManagedEntry>,
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeBuilder {
    /// Create a new runtime builder
    pub fn new() -> Self {
        Self {
            modules: Vec::new(),
            transformers: ModuleTransformerChain::new(),
            conflict_policy: None,
            config: RuntimeConfig::default(),
            dispatcher: None,
            managed: Vec::new(),
        }
    }

    /// Add a module to the environment
    pub fn module<M: Module>(mut self, module: M) -> Self {
        self.modules.push(Arc::new(module));
        self
    }

    pub fn shared_module(mut self, module: Arc<dyn Module>) -> Self {
        self.modules.push(module);
        self
    }

    /// Add a transformer; transformers run in the order added
    pub fn transformer<T: ModuleTransformer>(mut self, transformer: T) -> Self {
        self.transformers.push(transformer);
        self
    }

    /// Override the conflict policy from the config
    pub fn conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.conflict_policy = Some(policy);
        self
    }

    /// Set the runtime configuration
    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Publish on an existing dispatcher instead of a fresh one
    pub fn dispatcher(mut self, dispatcher: EventDispatcher) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Register a managed component resolved from the committed graph
    ///
    /// `factory` runs once, during `start()`, after the environment is
    /// committed. Entries are registered in the order they were added.
    pub fn managed<F>(mut self, name: impl Into<String>, order: i32, factory: F) -> Self
    where
        F: FnOnce(&Environment) -> anyhow::Result<Arc<dyn ManagedComponent>>
            + Send
            + Sync
            + 'static,
    {
        self.managed.push(ManagedEntry {
            name: name.into(),
            order,
            factory: Box::new(factory),
        });
        self
    }

    /// Register an already constructed managed component under its own name
    pub fn component(self, order: i32, component: Arc<dyn ManagedComponent>) -> Self {
        let name = component.name().to_string();
        self.managed(name, order, move |_| Ok(component))
    }

    /// Assemble the runtime
    ///
    /// The dispatcher and the config are bound in the graph ahead of the
    /// user modules, so components can resolve them.
    pub fn build(self) -> Runtime {
        let dispatcher = self.dispatcher.unwrap_or_default();
        let policy = self.conflict_policy.unwrap_or(self.config.conflict_policy);

        let bound_dispatcher = dispatcher.clone();
        let bound_config = self.config.clone();
        let mut modules: ModuleList = vec![FnModule::shared("ignition::runtime", move |binder| {
            binder
                .instance(bound_dispatcher.clone())
                .instance(bound_config.clone());
            Ok(())
        })];
        modules.extend(self.modules);

        tracing::debug!(
            modules = modules.len(),
            transformers = self.transformers.len(),
            managed = self.managed.len(),
            %policy,
            "Runtime assembled"
        );

        Runtime {
            environment: Environment::from_parts(policy, modules, self.transformers),
            registry: LifecycleRegistry::new(),
            dispatcher,
            config: self.config,
            managed: self.managed,
        }
    }
}
