//! # Ignition
//!
//! Application bootstrap runtime.
//!
//! Ignition assembles an application from modules, freezes the resulting
//! dependency graph at a single commit point, starts long-lived components in
//! a declared order and stops them again in reverse.
//!
//! ## Features
//!
//! - **Environment**: modules contribute bindings until `commit()`; afterwards the graph is read-only
//! - **Module transformers**: rewrite the module list at commit (exclude, override, audit, reject)
//! - **Managed lifecycle**: ordered start, reverse stop, rollback on a failed start
//! - **Event dispatch**: synchronous in-process publish/subscribe with aggregated handler failures
//! - **Runtime**: one owner for all of the above, with signal-driven shutdown
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ignition::prelude::*;
//!
//! struct Database;
//!
//! #[async_trait]
//! impl ManagedComponent for Database {
//!     async fn start(&self) -> anyhow::Result<()> {
//!         tracing::info!("Opening database connections");
//!         Ok(())
//!     }
//!
//!     async fn stop(&self) -> anyhow::Result<()> {
//!         tracing::info!("Closing database connections");
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut runtime = Runtime::builder()
//!         .module(FnModule::new("Persistence", |binder| {
//!             binder.bind::<Database>().to_instance(Database);
//!             Ok(())
//!         }))
//!         .managed("database", 10, |env| {
//!             let database: Arc<dyn ManagedComponent> = env.lookup::<Database>()?;
//!             Ok(database)
//!         })
//!         .build();
//!
//!     if let Err(err) = runtime.run_until_signal().await {
//!         tracing::error!("{}", err);
//!         std::process::exit(err.exit_code());
//!     }
//! }
//! ```

pub mod config;
pub mod di;
pub mod error;
pub mod lifecycle;
pub mod messaging;
pub mod module;
pub mod runtime;
pub mod transform;

// Re-export core types
pub use config::{ConfigService, RuntimeConfig};
pub use di::{ConflictPolicy, Environment, EnvironmentState, Injector};
pub use error::{ConfigurationError, IgnitionError, Result};
pub use lifecycle::{LifecycleRegistry, ManagedComponent, ShutdownReport};
pub use messaging::EventDispatcher;
pub use module::{Binder, Key, Module};
pub use runtime::{Runtime, RuntimeBuilder, RuntimeEvent};
pub use transform::{ModuleTransformer, ModuleTransformerChain};

// Re-export commonly used types from dependencies
pub use async_trait::async_trait;

/// Prelude module for convenient imports
///
/// ```
/// use ignition::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::{ConfigService, RuntimeConfig};
    pub use crate::di::{ConflictPolicy, Environment, EnvironmentState, Injector, Resolver};
    pub use crate::error::{ConfigurationError, IgnitionError, Result};
    pub use crate::lifecycle::{
        BootError, LifecycleError, LifecycleRegistry, ManagedComponent, ShutdownReport,
        TargetState, TimeBounded, shutdown_signal,
    };
    pub use crate::messaging::{AggregateHandlerError, EventDispatcher, SubscriptionHandle};
    pub use crate::module::{Binder, Binding, FnModule, Key, Module, ModuleList, StaticModule};
    pub use crate::runtime::{Runtime, RuntimeBuilder, RuntimeEvent};
    pub use crate::transform::{
        AppendModules, BindingAudit, ExcludeBinding, FnTransformer, ModuleTransformer,
        ModuleTransformerChain, OverrideWith, RejectBindings,
    };
    pub use async_trait::async_trait;
    pub use std::sync::Arc;
}
