//! Time bounds for managed components.
//!
//! The registry never times out a `start` or `stop` on its own. Wrapping a
//! component in [`TimeBounded`] before registering it is how a caller opts in.

use super::{LifecycleError, ManagedComponent};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Decorates a component with optional start and stop deadlines.
///
/// A deadline that expires surfaces as [`LifecycleError::Timeout`] from the
/// wrapped call, which the registry then treats like any other failure.
pub struct TimeBounded {
    inner: Arc<dyn ManagedComponent>,
    start_timeout: Option<Duration>,
    stop_timeout: Option<Duration>,
}

impl TimeBounded {
    pub fn new(inner: Arc<dyn ManagedComponent>) -> Self {
        Self {
            inner,
            start_timeout: None,
            stop_timeout: None,
        }
    }

    pub fn start_timeout(mut self, timeout: Duration) -> Self {
        self.start_timeout = Some(timeout);
        self
    }

    pub fn stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = Some(timeout);
        self
    }

    pub fn with_timeouts(
        inner: Arc<dyn ManagedComponent>,
        start: Option<Duration>,
        stop: Option<Duration>,
    ) -> Self {
        Self {
            inner,
            start_timeout: start,
            stop_timeout: stop,
        }
    }
}

#[async_trait]
impl ManagedComponent for TimeBounded {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn start(&self) -> anyhow::Result<()> {
        match self.start_timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.inner.start())
                .await
                .map_err(|_| LifecycleError::timeout("start", self.name(), timeout))?,
            None => self.inner.start().await,
        }
    }

    async fn stop(&self) -> anyhow::Result<()> {
        match self.stop_timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.inner.stop())
                .await
                .map_err(|_| LifecycleError::timeout("stop", self.name(), timeout))?,
            None => self.inner.stop().await,
        }
    }
}
