//! The managed-component contract.

use async_trait::async_trait;

/// A long-lived component with start/stop hooks, driven by the
/// [`LifecycleRegistry`](super::LifecycleRegistry).
///
/// Use `start` to:
/// - open connection pools
/// - bind listeners
/// - spawn background workers
///
/// and `stop` to release the same resources. Components that depend on each
/// other express that through their registration order: a pool registered at
/// order 10 starts before a server registered at order 20 and stops after it.
///
/// `start` is called at most once before a matching `stop`. `stop` must be
/// safe to call on a component whose `start` only partially succeeded.
///
/// # Example
///
/// ```rust
/// use ignition::lifecycle::ManagedComponent;
/// use async_trait::async_trait;
/// use std::sync::atomic::{AtomicBool, Ordering};
///
/// struct ConnectionPool {
///     open: AtomicBool,
/// }
///
/// #[async_trait]
/// impl ManagedComponent for ConnectionPool {
///     fn name(&self) -> &str {
///         "ConnectionPool"
///     }
///
///     async fn start(&self) -> anyhow::Result<()> {
///         self.open.store(true, Ordering::SeqCst);
///         Ok(())
///     }
///
///     async fn stop(&self) -> anyhow::Result<()> {
///         self.open.store(false, Ordering::SeqCst);
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait ManagedComponent: Send + Sync + 'static {
    /// Name used in logs, reports and errors
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Acquire resources and begin work
    async fn start(&self) -> anyhow::Result<()>;

    /// Release resources
    async fn stop(&self) -> anyhow::Result<()>;
}
