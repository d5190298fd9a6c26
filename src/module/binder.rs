use super::{Key, Module};
use crate::di::Resolver;
use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Type-erased bound value. Always holds an `Arc<T>` so that `dyn Trait`
/// bindings round-trip through `Any`.
pub(crate) type Erased = Arc<dyn Any + Send + Sync>;

type FactoryFn = Arc<dyn Fn(&Resolver<'_>) -> anyhow::Result<Erased> + Send + Sync>;

/// How a binding produces its value.
#[derive(Clone)]
pub enum Provider {
    /// A ready value.
    Instance(Erased),
    /// Built on first lookup, then cached for the life of the graph.
    Factory(FactoryFn),
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Instance(_) => f.write_str("Instance"),
            Provider::Factory(_) => f.write_str("Factory"),
        }
    }
}

/// A single binding declaration together with the module that made it.
#[derive(Clone, Debug)]
pub struct Binding {
    key: Key,
    provider: Provider,
    source: String,
}

impl Binding {
    pub fn key(&self) -> &Key {
        &self.key
    }

    pub fn provider(&self) -> &Provider {
        &self.provider
    }

    /// Name of the module that declared this binding.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_factory(&self) -> bool {
        matches!(self.provider, Provider::Factory(_))
    }
}

/// Collects the bindings a module declares.
///
/// # Example
/// ```
/// use ignition::module::Binder;
/// use std::sync::Arc;
///
/// trait Greeter: Send + Sync {
///     fn greet(&self) -> String;
/// }
/// struct English;
/// impl Greeter for English {
///     fn greet(&self) -> String { "hello".into() }
/// }
///
/// let mut binder = Binder::new("GreetingModule");
/// binder.bind::<dyn Greeter>().to_arc(Arc::new(English));
/// binder.bind::<u16>().named("port").to_instance(8080);
/// assert_eq!(binder.len(), 2);
/// ```
pub struct Binder {
    source: String,
    bindings: Vec<Binding>,
}

impl Binder {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            bindings: Vec::new(),
        }
    }

    /// Start a binding for `T`.
    pub fn bind<T: ?Sized + Send + Sync + 'static>(&mut self) -> BindingBuilder<'_, T> {
        BindingBuilder {
            key: Key::of::<T>(),
            binder: self,
            _marker: PhantomData,
        }
    }

    /// Shorthand for `bind::<T>().to_instance(value)`.
    pub fn instance<T: Send + Sync + 'static>(&mut self, value: T) -> &mut Self {
        self.bind::<T>().to_instance(value);
        self
    }

    /// Configure `module` and append its bindings, keeping its own name as provenance.
    pub fn install(&mut self, module: &dyn Module) -> anyhow::Result<()> {
        let nested = module.bindings()?;
        self.bindings.extend(nested);
        Ok(())
    }

    /// Append an already built binding (used by transformers that rewrite modules).
    pub fn add(&mut self, binding: Binding) {
        self.bindings.push(binding);
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn into_bindings(self) -> Vec<Binding> {
        self.bindings
    }

    fn push(&mut self, key: Key, provider: Provider) {
        tracing::trace!(key = %key, source = %self.source, "binding declared");
        self.bindings.push(Binding {
            key,
            provider,
            source: self.source.clone(),
        });
    }
}

/// Fluent builder returned by [`Binder::bind`].
pub struct BindingBuilder<'a, T: ?Sized> {
    binder: &'a mut Binder,
    key: Key,
    _marker: PhantomData<fn() -> Arc<T>>,
}

impl<'a, T: ?Sized + Send + Sync + 'static> BindingBuilder<'a, T> {
    /// Qualify the binding with a name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.key = Key::named::<T>(name);
        self
    }

    /// Bind to a shared instance. Works for `dyn Trait` targets.
    pub fn to_arc(self, value: Arc<T>) {
        let erased: Erased = Arc::new(value);
        self.binder.push(self.key, Provider::Instance(erased));
    }

    /// Bind to a lazily built singleton.
    ///
    /// The factory receives a [`Resolver`] for its own dependencies and runs
    /// the first time the key is looked up.
    pub fn to_provider<F>(self, factory: F)
    where
        F: Fn(&Resolver<'_>) -> anyhow::Result<Arc<T>> + Send + Sync + 'static,
    {
        let factory: FactoryFn = Arc::new(move |resolver: &Resolver<'_>| {
            let value = factory(resolver)?;
            let erased: Erased = Arc::new(value);
            Ok(erased)
        });
        self.binder.push(self.key, Provider::Factory(factory));
    }
}

impl<'a, T: Send + Sync + 'static> BindingBuilder<'a, T> {
    pub fn to_instance(self, value: T) {
        self.to_arc(Arc::new(value));
    }
}
