use super::{ConflictPolicy, Injector};
use crate::error::ConfigurationError;
use crate::module::{Binding, Key, Module, ModuleList};
use crate::transform::{ModuleTransformer, ModuleTransformerChain};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

/// Commit state of an [`Environment`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum EnvironmentState {
    /// Modules and transformers may still be added.
    Uncommitted,
    /// A commit is building the graph.
    Committing,
    /// The graph is built and queryable.
    Committed,
    /// A commit started but the transformers or the graph build failed.
    Failed,
}

impl EnvironmentState {
    #[inline]
    const fn as_u8(self) -> u8 {
        self as u8
    }

    #[inline]
    const fn from_u8(x: u8) -> Self {
        match x {
            1 => EnvironmentState::Committing,
            2 => EnvironmentState::Committed,
            3 => EnvironmentState::Failed,
            _ => EnvironmentState::Uncommitted,
        }
    }
}

#[derive(Default)]
struct Pending {
    modules: ModuleList,
    transformers: ModuleTransformerChain,
}

/// Dependency-injection environment with a single commit point.
///
/// Modules are accumulated while the environment is uncommitted. [`commit`]
/// runs the transformer chain over them, builds the [`Injector`] and freezes
/// the environment; from then on only lookups are allowed.
///
/// # Example
/// ```
/// use ignition::di::Environment;
/// use ignition::module::FnModule;
///
/// let env = Environment::new();
/// env.add_module(FnModule::new("Settings", |binder| {
///     binder.bind::<u16>().named("port").to_instance(8080);
///     Ok(())
/// }))
/// .unwrap();
///
/// env.commit().unwrap();
/// assert_eq!(*env.lookup_named::<u16>("port").unwrap(), 8080);
/// assert!(env.commit().is_err());
/// ```
///
/// [`commit`]: Environment::commit
pub struct Environment {
    state: AtomicU8,
    policy: ConflictPolicy,
    pending: Mutex<Pending>,
    injector: OnceLock<Injector>,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    pub fn new() -> Self {
        Self::with_policy(ConflictPolicy::default())
    }

    pub fn with_policy(policy: ConflictPolicy) -> Self {
        Self {
            state: AtomicU8::new(EnvironmentState::Uncommitted.as_u8()),
            policy,
            pending: Mutex::new(Pending::default()),
            injector: OnceLock::new(),
        }
    }

    /// An uncommitted environment pre-loaded with modules and transformers.
    pub(crate) fn from_parts(
        policy: ConflictPolicy,
        modules: ModuleList,
        transformers: ModuleTransformerChain,
    ) -> Self {
        let env = Self::with_policy(policy);
        *env.lock_pending() = Pending {
            modules,
            transformers,
        };
        env
    }

    pub fn state(&self) -> EnvironmentState {
        EnvironmentState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn policy(&self) -> ConflictPolicy {
        self.policy
    }

    pub fn is_committed(&self) -> bool {
        self.state() == EnvironmentState::Committed
    }

    /// Append a module.
    pub fn add_module<M: Module>(&self, module: M) -> Result<(), ConfigurationError> {
        self.add_shared_module(Arc::new(module))
    }

    /// Append an already shared module.
    pub fn add_shared_module(&self, module: Arc<dyn Module>) -> Result<(), ConfigurationError> {
        let mut pending = self.open_pending("add module")?;
        tracing::debug!(module = module.name(), "module added");
        pending.modules.push(module);
        Ok(())
    }

    /// Append a transformer to the chain run at commit.
    pub fn add_transformer<T: ModuleTransformer>(
        &self,
        transformer: T,
    ) -> Result<(), ConfigurationError> {
        let mut pending = self.open_pending("add transformer")?;
        tracing::debug!(transformer = transformer.name(), "module transformer added");
        pending.transformers.push(transformer);
        Ok(())
    }

    /// Number of modules accumulated so far. Zero after commit.
    pub fn pending_modules(&self) -> usize {
        self.lock_pending().modules.len()
    }

    /// Transform the accumulated modules, build the graph and freeze the environment.
    ///
    /// Exactly one call can succeed. Every later or concurrent call fails
    /// with [`ConfigurationError::AlreadyCommitted`], including after a failed
    /// commit: a failed environment stays unusable.
    pub fn commit(&self) -> Result<(), ConfigurationError> {
        self.state
            .compare_exchange(
                EnvironmentState::Uncommitted.as_u8(),
                EnvironmentState::Committing.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map_err(|_| ConfigurationError::AlreadyCommitted)?;
        let _unwind = FailOnUnwind(&self.state);

        let Pending {
            modules,
            transformers,
        } = std::mem::take(&mut *self.lock_pending());

        tracing::info!(
            modules = modules.len(),
            transformers = transformers.len(),
            "Committing environment..."
        );

        let built = transformers
            .apply(modules)
            .and_then(|modules| Injector::build(&modules, self.policy));

        match built {
            Ok(injector) => {
                let count = injector.len();
                self.injector
                    .set(injector)
                    .map_err(|_| ConfigurationError::AlreadyCommitted)?;
                self.store_state(EnvironmentState::Committed);
                tracing::info!(bindings = count, "Environment committed");
                Ok(())
            }
            Err(e) => {
                self.store_state(EnvironmentState::Failed);
                tracing::error!("Environment commit failed: {}", e);
                Err(e)
            }
        }
    }

    /// The built graph.
    pub fn injector(&self) -> Result<&Injector, ConfigurationError> {
        self.injector.get().ok_or(ConfigurationError::Uncommitted)
    }

    pub fn lookup<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>, ConfigurationError> {
        self.injector()?.get::<T>()
    }

    pub fn lookup_named<T: ?Sized + Send + Sync + 'static>(
        &self,
        name: &str,
    ) -> Result<Arc<T>, ConfigurationError> {
        self.injector()?.get_named::<T>(name)
    }

    pub fn lookup_key<T: ?Sized + Send + Sync + 'static>(
        &self,
        key: &Key,
    ) -> Result<Arc<T>, ConfigurationError> {
        self.injector()?.get_key::<T>(key)
    }

    pub fn contains<T: ?Sized + 'static>(&self) -> bool {
        self.injector
            .get()
            .is_some_and(|injector| injector.contains(&Key::of::<T>()))
    }

    /// Bindings of the committed graph with their provenance.
    pub fn bindings(&self) -> Result<&[Binding], ConfigurationError> {
        Ok(self.injector()?.bindings())
    }

    fn store_state(&self, state: EnvironmentState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    fn lock_pending(&self) -> MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock the pending set, refusing once a commit has begun.
    ///
    /// The state is checked under the lock so a module cannot slip in after
    /// `commit` has taken the pending list.
    fn open_pending(
        &self,
        operation: &'static str,
    ) -> Result<MutexGuard<'_, Pending>, ConfigurationError> {
        let pending = self.lock_pending();
        if self.state() != EnvironmentState::Uncommitted {
            return Err(ConfigurationError::MutateAfterCommit { operation });
        }
        Ok(pending)
    }
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("state", &self.state())
            .field("policy", &self.policy)
            .field("injector", &self.injector.get())
            .finish()
    }
}

/// Moves a commit that unwinds out of `COMMITTING` into `FAILED`.
struct FailOnUnwind<'a>(&'a AtomicU8);

impl Drop for FailOnUnwind<'_> {
    fn drop(&mut self) {
        if self
            .0
            .compare_exchange(
                EnvironmentState::Committing.as_u8(),
                EnvironmentState::Failed.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
        {
            tracing::error!("Environment commit panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::FnModule;
    use crate::transform::{AppendModules, ExcludeBinding, FnTransformer};
    use std::panic::AssertUnwindSafe;
    use std::sync::Barrier;
    use std::sync::atomic::AtomicUsize;

    #[derive(Debug)]
    struct X;
    #[derive(Debug)]
    struct Logger;

    fn module_a() -> FnModule {
        FnModule::new("ModuleA", |binder| {
            binder.instance(X);
            binder.instance(1u8);
            Ok(())
        })
    }

    #[test]
    fn test_lookup_before_commit_fails() {
        let env = Environment::new();
        env.add_module(module_a()).unwrap();
        assert!(matches!(
            env.lookup::<u8>(),
            Err(ConfigurationError::Uncommitted)
        ));
        assert_eq!(env.state(), EnvironmentState::Uncommitted);
    }

    #[test]
    fn test_double_commit_fails_and_keeps_first_graph() {
        let env = Environment::new();
        env.add_module(module_a()).unwrap();
        env.add_transformer(ExcludeBinding::new(Key::of::<X>()))
            .unwrap();

        env.commit().unwrap();
        assert!(matches!(
            env.commit(),
            Err(ConfigurationError::AlreadyCommitted)
        ));

        assert!(!env.contains::<X>());
        assert_eq!(*env.lookup::<u8>().unwrap(), 1);
        assert_eq!(env.bindings().unwrap().len(), 1);
    }

    #[test]
    fn test_mutation_after_commit_fails() {
        let env = Environment::new();
        env.commit().unwrap();

        let err = env.add_module(module_a()).unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::MutateAfterCommit {
                operation: "add module"
            }
        ));
        assert!(
            env.add_transformer(FnTransformer::new("noop", Ok))
                .is_err()
        );
    }

    #[test]
    fn test_unbound_lookup_after_commit() {
        let env = Environment::new();
        env.add_module(module_a()).unwrap();
        env.commit().unwrap();
        assert!(matches!(
            env.lookup::<String>(),
            Err(ConfigurationError::NotBound { .. })
        ));
    }

    #[test]
    fn test_transformers_applied_in_order() {
        let env = Environment::new();
        env.add_module(module_a()).unwrap();
        env.add_module(FnModule::new("ModuleB", |binder| {
            binder.instance(2u16);
            Ok(())
        }))
        .unwrap();
        env.add_transformer(AppendModules::new(vec![FnModule::shared(
            "Logging",
            |binder| {
                binder.instance(Logger);
                Ok(())
            },
        )]))
        .unwrap();
        env.add_transformer(ExcludeBinding::new(Key::of::<X>()))
            .unwrap();
        env.commit().unwrap();

        assert!(env.contains::<Logger>());
        assert!(!env.contains::<X>());
        assert_eq!(*env.lookup::<u16>().unwrap(), 2);
        assert_eq!(env.pending_modules(), 0);
    }

    #[test]
    fn test_failed_commit_is_terminal() {
        let env = Environment::new();
        env.add_module(FnModule::new("Broken", |_| anyhow::bail!("no url")))
            .unwrap();

        let err = env.commit().unwrap_err();
        assert!(matches!(err, ConfigurationError::ModuleFailed { .. }));
        assert_eq!(env.state(), EnvironmentState::Failed);
        assert!(matches!(
            env.commit(),
            Err(ConfigurationError::AlreadyCommitted)
        ));
        assert!(matches!(
            env.lookup::<u8>(),
            Err(ConfigurationError::Uncommitted)
        ));
    }

    #[test]
    fn test_panicking_module_fails_commit() {
        let env = Environment::new();
        env.add_module(FnModule::new("Exploding", |_| panic!("configure blew up")))
            .unwrap();

        let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| env.commit()));
        assert!(outcome.is_err());
        assert_eq!(env.state(), EnvironmentState::Failed);
        assert!(matches!(
            env.commit(),
            Err(ConfigurationError::AlreadyCommitted)
        ));
    }

    #[test]
    fn test_concurrent_commit_builds_once() {
        let env = Arc::new(Environment::new());
        let builds = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&builds);
        env.add_module(FnModule::new("Counted", move |binder| {
            counter.fetch_add(1, Ordering::SeqCst);
            binder.instance(5u32);
            Ok(())
        }))
        .unwrap();

        let barrier = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let env = Arc::clone(&env);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    env.commit().is_ok()
                })
            })
            .collect();

        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(successes, 1);
        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert_eq!(*env.lookup::<u32>().unwrap(), 5);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(EnvironmentState::Committed.to_string(), "COMMITTED");
        assert_eq!(EnvironmentState::Uncommitted.to_string(), "UNCOMMITTED");
    }
}
