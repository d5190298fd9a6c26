use crate::lifecycle::LifecycleError;
use crate::messaging::AggregateHandlerError;
use crate::module::Key;
use std::any::Any;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, IgnitionError>;

/// Errors raised while assembling or querying the injection graph.
///
/// Always fatal to the caller; none of these are retried.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Environment already committed")]
    AlreadyCommitted,

    #[error("Cannot {operation}: environment already committed")]
    MutateAfterCommit { operation: &'static str },

    #[error("Environment not committed yet")]
    Uncommitted,

    #[error("No binding for {key}")]
    NotBound { key: Key },

    #[error("Failed to downcast binding: {key}")]
    DowncastFailed { key: Key },

    #[error("Circular dependency detected: {cycle}")]
    CircularDependency { cycle: String },

    #[error("Duplicate binding for {key}: declared by '{first}' and again by '{second}'")]
    DuplicateBinding {
        key: Key,
        first: String,
        second: String,
    },

    #[error("Module '{module}' failed to configure: {source}")]
    ModuleFailed {
        module: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Module transformer '{transformer}' failed: {source}")]
    TransformerFailed {
        transformer: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Binding {key} from module '{module}' rejected: {reason}")]
    BindingRejected {
        key: Key,
        module: String,
        reason: String,
    },

    #[error("Provider for {key} failed: {source}")]
    ProviderFailed {
        key: Key,
        #[source]
        source: anyhow::Error,
    },
}

/// Top-level error for the bootstrap sequence.
#[derive(Debug, Error)]
pub enum IgnitionError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Handler(#[from] AggregateHandlerError),

    #[error("Failed to resolve managed component '{name}': {source:#}")]
    ManagedResolution {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Invalid runtime configuration: {0}")]
    InvalidConfig(String),
}

impl IgnitionError {
    /// Process exit status a hosting binary should terminate with.
    ///
    /// Follows the BSD `sysexits` convention: 78 for configuration problems,
    /// 70 for a component that failed at runtime.
    pub fn exit_code(&self) -> i32 {
        match self {
            IgnitionError::Configuration(_)
            | IgnitionError::ManagedResolution { .. }
            | IgnitionError::InvalidConfig(_) => 78,
            IgnitionError::Lifecycle(_) | IgnitionError::Handler(_) => 70,
        }
    }
}

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
