use crate::lifecycle::{ShutdownReport, TargetSummary};
use serde::Serialize;

/// Notifications the [`Runtime`](super::Runtime) publishes on its dispatcher.
///
/// Delivered synchronously: a `Started` handler runs before `start()`
/// returns, a `Stopped` handler before `shutdown()` returns.
#[derive(Debug, Clone, Serialize, strum_macros::IntoStaticStr)]
#[serde(tag = "event", rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RuntimeEvent {
    /// Every managed component started.
    Started { components: Vec<TargetSummary> },
    /// `start()` failed. Components that had started were already stopped.
    BootFailed {
        /// Component at fault, when the failure belongs to one
        target: Option<String>,
        order: Option<i32>,
        error: String,
        exit_code: i32,
    },
    /// The stop sweep is about to run.
    Stopping,
    /// The stop sweep finished.
    Stopped { report: ShutdownReport },
}

impl RuntimeEvent {
    /// Snake-case variant name, e.g. `boot_failed`.
    pub fn kind(&self) -> &'static str {
        self.into()
    }
}
