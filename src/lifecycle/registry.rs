//! Lifecycle Registry
//!
//! Orders managed components and drives them through start and stop.

use super::target::Target;
use super::{
    BootError, LifecycleError, ManagedComponent, Result, ShutdownReport, StopFailure,
    TargetHandle, TargetState, TargetSummary,
};
use crate::error::panic_message;
use std::sync::Arc;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};

/// Starts managed components in ascending order and stops them in reverse.
///
/// The LifecycleRegistry is responsible for:
/// - Collecting targets (a component plus its integer order) before boot
/// - Starting them sequentially, lowest order first, ties broken by
///   registration order
/// - Rolling back already-started components when one fails to start
/// - Stopping everything that started, highest order first
///
/// # Example
///
/// ```rust,ignore
/// use ignition::lifecycle::LifecycleRegistry;
///
/// let mut registry = LifecycleRegistry::new();
/// registry.register(pool, 10)?;
/// registry.register(server, 20)?;
///
/// registry.boot().await?;        // pool, then server
/// // ... application runs ...
/// let report = registry.shutdown().await; // server, then pool
/// ```
pub struct LifecycleRegistry {
    targets: Vec<Arc<Target>>,
    booted: AtomicBool,
    /// Indices into `targets` in start order, fixed at boot.
    start_sequence: OnceLock<Vec<usize>>,
}

impl Default for LifecycleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            targets: Vec::new(),
            booted: AtomicBool::new(false),
            start_sequence: OnceLock::new(),
        }
    }

    /// Register a component under its own name
    pub fn register(
        &mut self,
        component: Arc<dyn ManagedComponent>,
        order: i32,
    ) -> Result<TargetHandle> {
        let name = component.name().to_string();
        self.register_named(name, component, order)
    }

    /// Register a component under an explicit name
    pub fn register_named(
        &mut self,
        name: impl Into<String>,
        component: Arc<dyn ManagedComponent>,
        order: i32,
    ) -> Result<TargetHandle> {
        let name = name.into();
        if self.is_booted() {
            return Err(LifecycleError::RegistrationClosed { target: name });
        }

        let seq = self.targets.len();
        tracing::debug!(component = %name, order, "Registered managed component");
        self.targets
            .push(Arc::new(Target::new(name.clone(), order, seq, component)));
        Ok(TargetHandle::new(seq, name, order))
    }

    /// Start every registered component.
    ///
    /// Targets are started one at a time, sorted by `(order, registration index)`.
    /// If a start fails or panics, the remaining starts are skipped, every
    /// component that reached `STARTED` is stopped in reverse order, and the
    /// failure is returned as [`LifecycleError::Boot`].
    pub async fn boot(&self) -> Result<()> {
        if self.booted.swap(true, Ordering::AcqRel) {
            return Err(LifecycleError::AlreadyBooted);
        }

        let sequence = self.start_sequence.get_or_init(|| self.sorted_indices());
        tracing::info!("Booting {} managed components...", sequence.len());

        let mut attempted = Vec::with_capacity(sequence.len());
        for &index in sequence {
            let target = &self.targets[index];
            target.set_state(TargetState::Starting);
            tracing::debug!(component = %target.name, order = target.order, "Starting");

            match run_hook(&target.component, Hook::Start).await {
                Ok(()) => {
                    target.set_state(TargetState::Started);
                    attempted.push(target.summary());
                    tracing::debug!(component = %target.name, order = target.order, "Started");
                }
                Err(source) => {
                    target.set_state(TargetState::StartFailed);
                    attempted.push(target.summary());
                    tracing::error!(
                        component = %target.name,
                        order = target.order,
                        "Start failed, rolling back: {:#}",
                        source
                    );

                    let rollback = self.stop_started().await;
                    return Err(BootError {
                        target: target.name.clone(),
                        order: target.order,
                        attempted,
                        rollback,
                        source,
                    }
                    .into());
                }
            }
        }

        tracing::info!("Boot complete ({} components started)", sequence.len());
        Ok(())
    }

    /// Stop every component currently `STARTED`, highest order first.
    ///
    /// A failing or panicking `stop()` is logged and recorded in the report;
    /// the sweep always continues. Each component is stopped at most once, so a second
    /// call returns an empty report.
    pub async fn shutdown(&self) -> ShutdownReport {
        tracing::info!("Shutting down managed components...");
        let report = self.stop_started().await;
        tracing::info!(
            "Shutdown complete ({} stopped, {} failed)",
            report.stopped.len(),
            report.failed.len()
        );
        report
    }

    async fn stop_started(&self) -> ShutdownReport {
        let mut report = ShutdownReport::begin();
        let Some(sequence) = self.start_sequence.get() else {
            return report.finish();
        };

        for &index in sequence.iter().rev() {
            let target = &self.targets[index];
            if !target.transition(TargetState::Started, TargetState::Stopping) {
                continue;
            }

            tracing::debug!(component = %target.name, order = target.order, "Stopping");
            report.sequence.push(target.name.clone());
            let result = run_hook(&target.component, Hook::Stop).await;
            target.set_state(TargetState::Stopped);

            match result {
                Ok(()) => {
                    tracing::debug!(component = %target.name, order = target.order, "Stopped");
                    report.stopped.push(target.summary());
                }
                Err(e) => {
                    // Keep going: every started component gets its stop attempt.
                    tracing::error!(
                        component = %target.name,
                        order = target.order,
                        "Stop failed: {:#}",
                        e
                    );
                    report.failed.push(StopFailure {
                        target: target.summary(),
                        error: format!("{:#}", e),
                    });
                }
            }
        }

        report.finish()
    }

    fn sorted_indices(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..self.targets.len()).collect();
        indices.sort_by_key(|&i| (self.targets[i].order, self.targets[i].seq));
        indices
    }

    /// Current state of a target
    pub fn state(&self, handle: &TargetHandle) -> Option<TargetState> {
        self.targets.get(handle.index).map(|t| t.state())
    }

    /// Snapshot of all targets in start order
    pub fn targets(&self) -> Vec<TargetSummary> {
        let sorted;
        let sequence = match self.start_sequence.get() {
            Some(sequence) => sequence,
            None => {
                sorted = self.sorted_indices();
                &sorted
            }
        };
        sequence.iter().map(|&i| self.targets[i].summary()).collect()
    }

    /// Whether `boot()` has been called
    pub fn is_booted(&self) -> bool {
        self.booted.load(Ordering::Acquire)
    }

    /// Get the number of registered targets
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

#[derive(Clone, Copy, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
enum Hook {
    Start,
    Stop,
}

/// Run a lifecycle hook on its own task so a panic comes back as an error.
async fn run_hook(component: &Arc<dyn ManagedComponent>, hook: Hook) -> anyhow::Result<()> {
    let component = Arc::clone(component);
    let task = tokio::spawn(async move {
        match hook {
            Hook::Start => component.start().await,
            Hook::Stop => component.stop().await,
        }
    });

    match task.await {
        Ok(result) => result,
        Err(e) if e.is_panic() => {
            let payload = e.into_panic();
            Err(anyhow::anyhow!("{} panicked: {}", hook, panic_message(&*payload)))
        }
        Err(e) => Err(anyhow::anyhow!("{} task cancelled: {}", hook, e)),
    }
}

impl std::fmt::Debug for LifecycleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleRegistry")
            .field("targets", &self.targets())
            .field("booted", &self.is_booted())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tokio::sync::RwLock;

    type Journal = Arc<RwLock<Vec<String>>>;

    struct Recorder {
        name: String,
        journal: Journal,
        fail_start: bool,
        fail_stop: bool,
    }

    impl Recorder {
        fn new(name: &str, journal: &Journal) -> Arc<Self> {
            Self::build(name, journal, false, false)
        }

        fn build(name: &str, journal: &Journal, fail_start: bool, fail_stop: bool) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                journal: Arc::clone(journal),
                fail_start,
                fail_stop,
            })
        }
    }

    #[async_trait]
    impl ManagedComponent for Recorder {
        fn name(&self) -> &str {
            &self.name
        }

        async fn start(&self) -> anyhow::Result<()> {
            self.journal.write().await.push(format!("start:{}", self.name));
            if self.fail_start {
                anyhow::bail!("{} refused to start", self.name);
            }
            Ok(())
        }

        async fn stop(&self) -> anyhow::Result<()> {
            self.journal.write().await.push(format!("stop:{}", self.name));
            if self.fail_stop {
                anyhow::bail!("{} refused to stop", self.name);
            }
            Ok(())
        }
    }

    /// Panics from `start()` or `stop()` instead of returning an error.
    struct Panicker {
        name: &'static str,
        journal: Journal,
        on_start: bool,
    }

    #[async_trait]
    impl ManagedComponent for Panicker {
        fn name(&self) -> &str {
            self.name
        }

        async fn start(&self) -> anyhow::Result<()> {
            self.journal.write().await.push(format!("start:{}", self.name));
            if self.on_start {
                panic!("{} exploded", self.name);
            }
            Ok(())
        }

        async fn stop(&self) -> anyhow::Result<()> {
            self.journal.write().await.push(format!("stop:{}", self.name));
            if !self.on_start {
                panic!("{} exploded", self.name);
            }
            Ok(())
        }
    }

    async fn entries(journal: &Journal) -> Vec<String> {
        journal.read().await.clone()
    }

    #[tokio::test]
    async fn test_boot_ascending_shutdown_descending() {
        let journal = Journal::default();
        let mut registry = LifecycleRegistry::new();
        registry.register(Recorder::new("three", &journal), 3).unwrap();
        registry.register(Recorder::new("one", &journal), 1).unwrap();
        registry.register(Recorder::new("two", &journal), 2).unwrap();

        registry.boot().await.unwrap();
        let report = registry.shutdown().await;

        assert_eq!(
            entries(&journal).await,
            vec![
                "start:one",
                "start:two",
                "start:three",
                "stop:three",
                "stop:two",
                "stop:one"
            ]
        );
        assert!(report.is_clean());
        assert_eq!(report.sequence, vec!["three", "two", "one"]);
    }

    #[tokio::test]
    async fn test_equal_orders_keep_registration_order() {
        let journal = Journal::default();
        let mut registry = LifecycleRegistry::new();
        registry.register(Recorder::new("A", &journal), 5).unwrap();
        registry.register(Recorder::new("B", &journal), 5).unwrap();

        registry.boot().await.unwrap();
        registry.shutdown().await;

        assert_eq!(
            entries(&journal).await,
            vec!["start:A", "start:B", "stop:B", "stop:A"]
        );
    }

    #[tokio::test]
    async fn test_failed_start_rolls_back_started_targets() {
        let journal = Journal::default();
        let mut registry = LifecycleRegistry::new();
        let third = registry.register(Recorder::new("three", &journal), 3).unwrap();
        let first = registry.register(Recorder::new("one", &journal), 1).unwrap();
        let second = registry
            .register(Recorder::build("two", &journal, true, false), 2)
            .unwrap();

        let err = registry.boot().await.unwrap_err();
        let boot = err.as_boot().expect("boot error");

        assert_eq!(boot.target, "two");
        assert_eq!(boot.order, 2);
        assert!(err.to_string().contains("two refused to start"));
        assert_eq!(boot.rollback.sequence, vec!["one"]);
        assert_eq!(
            boot.attempted
                .iter()
                .map(|t| (t.name.as_str(), t.state))
                .collect::<Vec<_>>(),
            vec![("one", TargetState::Started), ("two", TargetState::StartFailed)]
        );
        assert_eq!(
            entries(&journal).await,
            vec!["start:one", "start:two", "stop:one"]
        );

        assert_eq!(registry.state(&first), Some(TargetState::Stopped));
        assert_eq!(registry.state(&second), Some(TargetState::StartFailed));
        assert_eq!(registry.state(&third), Some(TargetState::Registered));

        // Nothing left running, so a later shutdown is a no-op.
        assert_eq!(registry.shutdown().await.attempted(), 0);
    }

    #[tokio::test]
    async fn test_stop_failure_does_not_abort_shutdown() {
        let journal = Journal::default();
        let mut registry = LifecycleRegistry::new();
        registry.register(Recorder::new("pool", &journal), 1).unwrap();
        registry
            .register(Recorder::build("server", &journal, false, true), 2)
            .unwrap();
        registry.register(Recorder::new("metrics", &journal), 3).unwrap();

        registry.boot().await.unwrap();
        let report = registry.shutdown().await;

        assert_eq!(report.sequence, vec!["metrics", "server", "pool"]);
        assert_eq!(report.stopped.len(), 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].target.name, "server");
        assert!(report.failed[0].error.contains("server refused to stop"));
        assert!(!report.is_clean());
    }

    #[tokio::test]
    async fn test_shutdown_stops_each_target_once() {
        let journal = Journal::default();
        let mut registry = LifecycleRegistry::new();
        registry.register(Recorder::new("only", &journal), 0).unwrap();

        registry.boot().await.unwrap();
        assert_eq!(registry.shutdown().await.attempted(), 1);
        assert_eq!(registry.shutdown().await.attempted(), 0);
        assert_eq!(entries(&journal).await, vec!["start:only", "stop:only"]);
    }

    #[tokio::test]
    async fn test_boot_and_register_are_one_shot() {
        let journal = Journal::default();
        let mut registry = LifecycleRegistry::new();
        registry.boot().await.unwrap();

        assert!(matches!(
            registry.boot().await,
            Err(LifecycleError::AlreadyBooted)
        ));
        assert!(matches!(
            registry.register(Recorder::new("late", &journal), 0),
            Err(LifecycleError::RegistrationClosed { .. })
        ));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_targets_snapshot_is_in_start_order() {
        let journal = Journal::default();
        let mut registry = LifecycleRegistry::new();
        registry.register(Recorder::new("b", &journal), 2).unwrap();
        registry
            .register_named("a", Recorder::new("ignored", &journal), 1)
            .unwrap();

        let names: Vec<String> = registry.targets().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_panicking_start_rolls_back_started_targets() {
        let journal = Journal::default();
        let mut registry = LifecycleRegistry::new();
        let pool = registry.register(Recorder::new("pool", &journal), 1).unwrap();
        let server = registry
            .register(
                Arc::new(Panicker {
                    name: "server",
                    journal: Arc::clone(&journal),
                    on_start: true,
                }),
                2,
            )
            .unwrap();

        let err = registry.boot().await.unwrap_err();
        let boot = err.as_boot().expect("boot error");

        assert_eq!(boot.target, "server");
        assert!(err.to_string().contains("start panicked: server exploded"));
        assert_eq!(boot.rollback.sequence, vec!["pool"]);
        assert_eq!(
            entries(&journal).await,
            vec!["start:pool", "start:server", "stop:pool"]
        );
        assert_eq!(registry.state(&pool), Some(TargetState::Stopped));
        assert_eq!(registry.state(&server), Some(TargetState::StartFailed));
    }

    #[tokio::test]
    async fn test_panicking_stop_does_not_abort_shutdown() {
        let journal = Journal::default();
        let mut registry = LifecycleRegistry::new();
        let pool = registry.register(Recorder::new("pool", &journal), 1).unwrap();
        let server = registry
            .register(
                Arc::new(Panicker {
                    name: "server",
                    journal: Arc::clone(&journal),
                    on_start: false,
                }),
                2,
            )
            .unwrap();

        registry.boot().await.unwrap();
        let report = registry.shutdown().await;

        assert_eq!(report.sequence, vec!["server", "pool"]);
        assert_eq!(report.stopped.len(), 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].target.name, "server");
        assert!(report.failed[0].error.contains("stop panicked: server exploded"));
        assert_eq!(
            entries(&journal).await,
            vec!["start:pool", "start:server", "stop:server", "stop:pool"]
        );
        assert_eq!(registry.state(&pool), Some(TargetState::Stopped));
        assert_eq!(registry.state(&server), Some(TargetState::Stopped));
    }
}
