use thiserror::Error;
use uuid::Uuid;

/// One handler that failed while an event was being delivered.
#[derive(Debug)]
pub struct HandlerFailure {
    pub subscription: Uuid,
    pub listener: String,
    pub error: anyhow::Error,
}

fn summarize(failures: &[HandlerFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{}: {:#}", f.listener, f.error))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Every handler failure from a single `publish`, collected after all
/// handlers ran.
#[derive(Debug, Error)]
#[error(
    "{} of {} handler(s) failed for {}: {}",
    .failures.len(),
    .delivered,
    .event_type,
    summarize(.failures)
)]
pub struct AggregateHandlerError {
    pub event_type: &'static str,
    /// Handlers invoked, including the failed ones.
    pub delivered: usize,
    pub failures: Vec<HandlerFailure>,
}

impl AggregateHandlerError {
    /// Listener names of the failed handlers, in delivery order.
    pub fn listeners(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.listener.as_str()).collect()
    }
}
