//! Lifecycle-specific error types

use super::{ShutdownReport, TargetSummary};
use std::time::Duration;
use thiserror::Error;

/// A managed component failed to start.
///
/// By the time this is returned the registry has already stopped, in reverse
/// order, every component that had started; `rollback` records how that went.
#[derive(Debug, Error)]
#[error("Failed to start '{target}' (order {order}): {source:#}")]
pub struct BootError {
    /// Name of the component whose start failed
    pub target: String,
    /// Its declared order
    pub order: i32,
    /// Every target the boot touched, in start order, with its final state
    pub attempted: Vec<TargetSummary>,
    /// Result of stopping the components that had started
    pub rollback: ShutdownReport,
    /// The original start failure
    #[source]
    pub source: anyhow::Error,
}

/// Errors that can occur during lifecycle operations
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// `boot()` was called more than once
    #[error("Lifecycle registry already booted")]
    AlreadyBooted,

    /// A component was registered after boot began
    #[error("Cannot register '{target}': lifecycle registry already booted")]
    RegistrationClosed {
        /// Name of the rejected component
        target: String,
    },

    /// A component failed to start
    #[error(transparent)]
    Boot(#[from] BootError),

    /// A start or stop did not finish in time
    #[error("Timeout during {phase} of '{target}' after {timeout:?}")]
    Timeout {
        /// `start` or `stop`
        phase: &'static str,
        /// Name of the component
        target: String,
        /// The bound that was exceeded
        timeout: Duration,
    },
}

impl LifecycleError {
    /// Create a timeout error
    pub fn timeout(phase: &'static str, target: impl Into<String>, timeout: Duration) -> Self {
        Self::Timeout {
            phase,
            target: target.into(),
            timeout,
        }
    }

    /// The boot failure, if this is one.
    pub fn as_boot(&self) -> Option<&BootError> {
        match self {
            Self::Boot(err) => Some(err),
            _ => None,
        }
    }
}

/// A specialized Result type for lifecycle operations
pub type Result<T> = std::result::Result<T, LifecycleError>;
