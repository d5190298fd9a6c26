//! Lifecycle targets and the reports built from them.

use super::ManagedComponent;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

/// State of a single managed component.
///
/// ```text
/// REGISTERED -> STARTING -> STARTED -> STOPPING -> STOPPED
///                  \
///                   -> START_FAILED
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, strum_macros::Display, strum_macros::AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum TargetState {
    Registered,
    Starting,
    Started,
    StartFailed,
    Stopping,
    Stopped,
}

impl TargetState {
    #[inline]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    #[inline]
    pub const fn from_u8(x: u8) -> Self {
        match x {
            1 => TargetState::Starting,
            2 => TargetState::Started,
            3 => TargetState::StartFailed,
            4 => TargetState::Stopping,
            5 => TargetState::Stopped,
            _ => TargetState::Registered,
        }
    }
}

/// A registered component: what to drive, in which order, and where it is now.
pub(crate) struct Target {
    pub(crate) name: String,
    pub(crate) order: i32,
    /// Registration index, the tie-breaker between equal orders.
    pub(crate) seq: usize,
    pub(crate) component: Arc<dyn ManagedComponent>,
    state: AtomicU8,
}

impl Target {
    pub(crate) fn new(
        name: String,
        order: i32,
        seq: usize,
        component: Arc<dyn ManagedComponent>,
    ) -> Self {
        Self {
            name,
            order,
            seq,
            component,
            state: AtomicU8::new(TargetState::Registered.as_u8()),
        }
    }

    #[inline]
    pub(crate) fn state(&self) -> TargetState {
        TargetState::from_u8(self.state.load(Ordering::Acquire))
    }

    #[inline]
    pub(crate) fn set_state(&self, state: TargetState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    /// Move `from -> to` only if the target is currently in `from`.
    #[inline]
    pub(crate) fn transition(&self, from: TargetState, to: TargetState) -> bool {
        self.state
            .compare_exchange(from.as_u8(), to.as_u8(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn summary(&self) -> TargetSummary {
        TargetSummary {
            name: self.name.clone(),
            order: self.order,
            state: self.state(),
        }
    }
}

/// Returned by registration; identifies one target in its registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetHandle {
    pub(crate) index: usize,
    name: String,
    order: i32,
}

impl TargetHandle {
    pub(crate) fn new(index: usize, name: String, order: i32) -> Self {
        Self { index, name, order }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn order(&self) -> i32 {
        self.order
    }
}

/// Point-in-time view of a target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetSummary {
    pub name: String,
    pub order: i32,
    pub state: TargetState,
}

/// A component whose `stop()` failed.
#[derive(Debug, Clone, Serialize)]
pub struct StopFailure {
    pub target: TargetSummary,
    pub error: String,
}

/// Outcome of a shutdown sweep.
///
/// `stopped` and `failed` are each in stop order (descending start order).
#[derive(Debug, Clone, Serialize)]
pub struct ShutdownReport {
    pub stopped: Vec<TargetSummary>,
    pub failed: Vec<StopFailure>,
    /// Every target a stop was attempted on, in attempt order.
    pub sequence: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ShutdownReport {
    pub(crate) fn begin() -> Self {
        let now = Utc::now();
        Self {
            stopped: Vec::new(),
            failed: Vec::new(),
            sequence: Vec::new(),
            started_at: now,
            finished_at: now,
        }
    }

    pub(crate) fn finish(mut self) -> Self {
        self.finished_at = Utc::now();
        self
    }

    /// True if every stop attempted succeeded.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    /// Number of stop attempts, successful or not.
    pub fn attempted(&self) -> usize {
        self.sequence.len()
    }
}
