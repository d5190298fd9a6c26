//! Managed lifecycle
//!
//! Long-lived components (connection pools, listeners, background workers)
//! are registered with an integer order and driven through start and stop by
//! the [`LifecycleRegistry`].
//!
//! # Lifecycle Phases
//!
//! ```text
//! 1. Environment commit
//!    ↓
//! 2. register(component, order)   (any number of times)
//!    ↓
//! 3. boot()                       ← start, ascending order
//!    ↓                               on failure: stop what started, descending
//! [Running...]
//!    ↓
//! 4. Shutdown Signal (SIGTERM/SIGINT)
//!    ↓
//! 5. shutdown()                   ← stop, descending order
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use ignition::lifecycle::{LifecycleRegistry, ManagedComponent};
//! use async_trait::async_trait;
//!
//! pub struct DatabaseService { /* ... */ }
//!
//! #[async_trait]
//! impl ManagedComponent for DatabaseService {
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
//! let mut registry = LifecycleRegistry::new();
//! registry.register(Arc::new(DatabaseService { /* ... */ }), 10)?;
//! registry.boot().await?;
//! ```

mod error;
mod registry;
mod shutdown;
mod target;
mod timeout;
mod traits;

pub use error::{BootError, LifecycleError, Result};
pub use registry::LifecycleRegistry;
pub use shutdown::shutdown_signal;
pub use target::{ShutdownReport, StopFailure, TargetHandle, TargetState, TargetSummary};
pub use timeout::TimeBounded;
pub use traits::ManagedComponent;
