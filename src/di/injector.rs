use super::ConflictPolicy;
use crate::error::ConfigurationError;
use crate::module::{Binding, Erased, Key, Module, Provider};
use dashmap::DashMap;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

/// The built injection graph.
///
/// Bindings are fixed at construction. Factory bindings are resolved lazily
/// and cached in a concurrent map, so lookups never take a global lock.
pub struct Injector {
    bindings: Vec<Binding>,
    index: HashMap<Key, usize>,
    singletons: DashMap<Key, Erased>,
}

impl Injector {
    /// Build the graph from `modules`, in order.
    ///
    /// Duplicate keys are settled here and nowhere else, according to `policy`.
    /// Under [`ConflictPolicy::LastWriteWins`] the winning binding takes the
    /// slot of the first declaration so the listing order stays stable.
    pub(crate) fn build(
        modules: &[Arc<dyn Module>],
        policy: ConflictPolicy,
    ) -> Result<Self, ConfigurationError> {
        let mut bindings: Vec<Binding> = Vec::new();
        let mut index: HashMap<Key, usize> = HashMap::new();

        for module in modules {
            let declared = module
                .bindings()
                .map_err(|source| ConfigurationError::ModuleFailed {
                    module: module.name().to_string(),
                    source,
                })?;

            for binding in declared {
                let Some(&slot) = index.get(binding.key()) else {
                    index.insert(binding.key().clone(), bindings.len());
                    bindings.push(binding);
                    continue;
                };

                let first = bindings[slot].source().to_string();
                match policy {
                    ConflictPolicy::Reject => {
                        return Err(ConfigurationError::DuplicateBinding {
                            key: binding.key().clone(),
                            first,
                            second: binding.source().to_string(),
                        });
                    }
                    ConflictPolicy::LastWriteWins => {
                        tracing::debug!(
                            key = %binding.key(),
                            previous = %first,
                            source = %binding.source(),
                            "binding overridden"
                        );
                        bindings[slot] = binding;
                    }
                }
            }
        }

        Ok(Self {
            bindings,
            index,
            singletons: DashMap::new(),
        })
    }

    /// A fresh resolver with an empty resolution path.
    pub fn resolver(&self) -> Resolver<'_> {
        Resolver {
            injector: self,
            path: RefCell::new(Vec::new()),
        }
    }

    pub fn get<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>, ConfigurationError> {
        self.resolver().get::<T>()
    }

    pub fn get_named<T: ?Sized + Send + Sync + 'static>(
        &self,
        name: &str,
    ) -> Result<Arc<T>, ConfigurationError> {
        self.resolver().get_named::<T>(name)
    }

    pub fn get_key<T: ?Sized + Send + Sync + 'static>(
        &self,
        key: &Key,
    ) -> Result<Arc<T>, ConfigurationError> {
        self.resolver().get_key::<T>(key)
    }

    pub fn contains(&self, key: &Key) -> bool {
        self.index.contains_key(key)
    }

    /// Final bindings with their provenance, after conflict resolution.
    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

impl std::fmt::Debug for Injector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys: Vec<String> = self.bindings.iter().map(|b| b.key().to_string()).collect();
        f.debug_struct("Injector")
            .field("bindings", &keys)
            .field("singletons", &self.singletons.len())
            .finish()
    }
}

/// Resolves keys against an [`Injector`], tracking the chain of factories
/// currently being built.
///
/// Factories receive a resolver for their own dependencies. Asking for a key
/// that is already on the path fails with
/// [`ConfigurationError::CircularDependency`].
pub struct Resolver<'a> {
    injector: &'a Injector,
    path: RefCell<Vec<Key>>,
}

impl<'a> Resolver<'a> {
    pub fn get<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>, ConfigurationError> {
        self.get_key::<T>(&Key::of::<T>())
    }

    pub fn get_named<T: ?Sized + Send + Sync + 'static>(
        &self,
        name: &str,
    ) -> Result<Arc<T>, ConfigurationError> {
        self.get_key::<T>(&Key::named::<T>(name))
    }

    pub fn get_key<T: ?Sized + Send + Sync + 'static>(
        &self,
        key: &Key,
    ) -> Result<Arc<T>, ConfigurationError> {
        if !key.is::<T>() {
            return Err(ConfigurationError::DowncastFailed { key: key.clone() });
        }
        let erased = self.resolve(key)?;
        erased
            .downcast::<Arc<T>>()
            .map(|wrapper| Arc::clone(&*wrapper))
            .map_err(|_| ConfigurationError::DowncastFailed { key: key.clone() })
    }

    pub fn contains(&self, key: &Key) -> bool {
        self.injector.contains(key)
    }

    fn resolve(&self, key: &Key) -> Result<Erased, ConfigurationError> {
        let slot = self
            .injector
            .index
            .get(key)
            .ok_or_else(|| ConfigurationError::NotBound { key: key.clone() })?;

        let factory = match self.injector.bindings[*slot].provider() {
            Provider::Instance(value) => return Ok(Arc::clone(value)),
            Provider::Factory(factory) => Arc::clone(factory),
        };

        if let Some(cached) = self.injector.singletons.get(key) {
            return Ok(Arc::clone(cached.value()));
        }

        self.enter(key)?;
        let built = (*factory)(self);
        self.path.borrow_mut().pop();

        let value = built.map_err(|source| match source.downcast::<ConfigurationError>() {
            // Keep the cycle report intact instead of nesting it per factory.
            Ok(cycle @ ConfigurationError::CircularDependency { .. }) => cycle,
            Ok(other) => ConfigurationError::ProviderFailed {
                key: key.clone(),
                source: other.into(),
            },
            Err(source) => ConfigurationError::ProviderFailed {
                key: key.clone(),
                source,
            },
        })?;

        // Racing initializers may both run; the first stored instance wins.
        let stored = self.injector.singletons.entry(key.clone()).or_insert(value);
        tracing::trace!(key = %key, "singleton created");
        Ok(Arc::clone(stored.value()))
    }

    fn enter(&self, key: &Key) -> Result<(), ConfigurationError> {
        let mut path = self.path.borrow_mut();
        if let Some(start) = path.iter().position(|k| k == key) {
            let cycle = path[start..]
                .iter()
                .chain(std::iter::once(key))
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" -> ");
            return Err(ConfigurationError::CircularDependency { cycle });
        }
        path.push(key.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::FnModule;
    use std::sync::atomic::{AtomicUsize, Ordering};

    trait Repository: Send + Sync {
        fn url(&self) -> String;
    }

    struct SqlRepository {
        url: Arc<String>,
    }

    impl Repository for SqlRepository {
        fn url(&self) -> String {
            self.url.to_string()
        }
    }

    #[derive(Debug)]
    struct A;
    #[derive(Debug)]
    struct B;

    fn build(modules: Vec<Arc<dyn Module>>, policy: ConflictPolicy) -> Injector {
        Injector::build(&modules, policy).unwrap()
    }

    #[test]
    fn test_factory_resolves_dependencies() {
        let module = FnModule::shared("Repo", |binder| {
            binder
                .bind::<String>()
                .named("url")
                .to_instance("postgres://localhost".to_string());
            binder.bind::<dyn Repository>().to_provider(|r| {
                let url = r.get_named::<String>("url")?;
                Ok(Arc::new(SqlRepository { url }) as Arc<dyn Repository>)
            });
            Ok(())
        });

        let injector = build(vec![module], ConflictPolicy::LastWriteWins);
        let repo = injector.get::<dyn Repository>().unwrap();
        assert_eq!(repo.url(), "postgres://localhost");
    }

    #[test]
    fn test_factory_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let module = FnModule::shared("Counter", move |binder| {
            let counter = Arc::clone(&counter);
            binder.bind::<u64>().to_provider(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(42))
            });
            Ok(())
        });

        let injector = build(vec![module], ConflictPolicy::LastWriteWins);
        let first = injector.get::<u64>().unwrap();
        let second = injector.get::<u64>().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_last_write_wins() {
        let first = FnModule::shared("First", |binder| {
            binder.instance(1u32);
            binder.instance("kept".to_string());
            Ok(())
        });
        let second = FnModule::shared("Second", |binder| {
            binder.instance(2u32);
            Ok(())
        });

        let injector = build(vec![first, second], ConflictPolicy::LastWriteWins);
        assert_eq!(*injector.get::<u32>().unwrap(), 2);
        assert_eq!(injector.len(), 2);
        assert_eq!(injector.bindings()[0].source(), "Second");
    }

    #[test]
    fn test_reject_policy_reports_both_modules() {
        let first = FnModule::shared("First", |binder| {
            binder.instance(1u32);
            Ok(())
        });
        let second = FnModule::shared("Second", |binder| {
            binder.instance(2u32);
            Ok(())
        });

        let err = Injector::build(&[first, second], ConflictPolicy::Reject).unwrap_err();
        match err {
            ConfigurationError::DuplicateBinding { first, second, .. } => {
                assert_eq!(first, "First");
                assert_eq!(second, "Second");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_cycle_detected() {
        let module = FnModule::shared("Cyclic", |binder| {
            binder.bind::<A>().to_provider(|r| {
                r.get::<B>()?;
                Ok(Arc::new(A))
            });
            binder.bind::<B>().to_provider(|r| {
                r.get::<A>()?;
                Ok(Arc::new(B))
            });
            Ok(())
        });

        let injector = build(vec![module], ConflictPolicy::LastWriteWins);
        match injector.get::<A>().unwrap_err() {
            ConfigurationError::CircularDependency { cycle } => {
                let parts: Vec<&str> = cycle.split(" -> ").collect();
                assert_eq!(parts.len(), 3);
                assert!(parts[0].ends_with("::A"));
                assert!(parts[1].ends_with("::B"));
                assert!(parts[2].ends_with("::A"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unbound_key_is_error() {
        let injector = build(Vec::new(), ConflictPolicy::LastWriteWins);
        assert!(matches!(
            injector.get::<String>(),
            Err(ConfigurationError::NotBound { .. })
        ));
        assert!(injector.is_empty());
    }

    #[test]
    fn test_provider_failure_names_key() {
        let module = FnModule::shared("Failing", |binder| {
            binder
                .bind::<String>()
                .to_provider(|_| anyhow::bail!("connection refused"));
            Ok(())
        });

        let injector = build(vec![module], ConflictPolicy::LastWriteWins);
        let err = injector.get::<String>().unwrap_err();
        assert!(matches!(err, ConfigurationError::ProviderFailed { .. }));
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn test_module_failure_names_module() {
        let module = FnModule::shared("Misconfigured", |_| anyhow::bail!("bad url"));
        let err = Injector::build(&[module], ConflictPolicy::LastWriteWins).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Module 'Misconfigured' failed to configure: bad url"
        );
    }
}
