use super::ModuleTransformer;
use crate::error::ConfigurationError;
use crate::module::{Binding, Key, Module, ModuleList, StaticModule};
use anyhow::Context;
use std::collections::HashSet;
use std::sync::Arc;

fn bindings_of(module: &Arc<dyn Module>) -> anyhow::Result<Vec<Binding>> {
    module
        .bindings()
        .with_context(|| format!("module '{}' failed to configure", module.name()))
}

/// Rewrite every module, dropping the bindings `drop` matches.
///
/// Modules that lose nothing are passed through untouched.
fn retain_bindings<F>(modules: ModuleList, drop: F) -> anyhow::Result<ModuleList>
where
    F: Fn(&Binding) -> bool,
{
    modules
        .into_iter()
        .map(|module| -> anyhow::Result<Arc<dyn Module>> {
            let bindings = bindings_of(&module)?;
            if !bindings.iter().any(&drop) {
                return Ok(module);
            }
            let kept: Vec<Binding> = bindings.into_iter().filter(|b| !drop(b)).collect();
            Ok(Arc::new(StaticModule::new(module.name(), kept)))
        })
        .collect()
}

/// Removes every binding for one key from every module.
#[derive(Debug, Clone)]
pub struct ExcludeBinding {
    key: Key,
}

impl ExcludeBinding {
    pub fn new(key: Key) -> Self {
        Self { key }
    }

    pub fn of<T: ?Sized + 'static>() -> Self {
        Self::new(Key::of::<T>())
    }
}

impl ModuleTransformer for ExcludeBinding {
    fn name(&self) -> &str {
        "ExcludeBinding"
    }

    fn transform(&self, modules: ModuleList) -> anyhow::Result<ModuleList> {
        tracing::debug!(key = %self.key, "excluding binding");
        retain_bindings(modules, |b| b.key() == &self.key)
    }
}

/// Appends modules after the existing ones.
#[derive(Clone)]
pub struct AppendModules {
    modules: ModuleList,
}

impl AppendModules {
    pub fn new(modules: ModuleList) -> Self {
        Self { modules }
    }
}

impl ModuleTransformer for AppendModules {
    fn name(&self) -> &str {
        "AppendModules"
    }

    fn transform(&self, mut modules: ModuleList) -> anyhow::Result<ModuleList> {
        modules.extend(self.modules.iter().cloned());
        Ok(modules)
    }
}

/// Replaces the bindings of earlier modules with those of the overriding modules.
///
/// Keys bound by an override are stripped from every incoming module and the
/// overrides are appended, so the result holds a single binding per
/// overridden key and builds under any conflict policy.
#[derive(Clone)]
pub struct OverrideWith {
    overrides: ModuleList,
}

impl OverrideWith {
    pub fn new(overrides: ModuleList) -> Self {
        Self { overrides }
    }
}

impl ModuleTransformer for OverrideWith {
    fn name(&self) -> &str {
        "OverrideWith"
    }

    fn transform(&self, modules: ModuleList) -> anyhow::Result<ModuleList> {
        let mut overridden = HashSet::new();
        for module in &self.overrides {
            for binding in bindings_of(module)? {
                overridden.insert(binding.key().clone());
            }
        }

        let mut out = retain_bindings(modules, |b| overridden.contains(b.key()))?;
        out.extend(self.overrides.iter().cloned());
        Ok(out)
    }
}

type RejectPredicate = Box<dyn Fn(&Binding) -> bool + Send + Sync>;

/// Fails the commit if any binding matches a predicate.
///
/// # Example
/// ```
/// use ignition::transform::RejectBindings;
///
/// // Refuse eagerly constructed instances; everything must be a factory.
/// let policy = RejectBindings::new("instances are not allowed", |b| !b.is_factory());
/// ```
pub struct RejectBindings {
    reason: String,
    predicate: RejectPredicate,
}

impl RejectBindings {
    pub fn new<F>(reason: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Binding) -> bool + Send + Sync + 'static,
    {
        Self {
            reason: reason.into(),
            predicate: Box::new(predicate),
        }
    }
}

impl ModuleTransformer for RejectBindings {
    fn name(&self) -> &str {
        "RejectBindings"
    }

    fn transform(&self, modules: ModuleList) -> anyhow::Result<ModuleList> {
        for module in &modules {
            if let Some(binding) = bindings_of(module)?.iter().find(|b| (self.predicate)(*b)) {
                return Err(ConfigurationError::BindingRejected {
                    key: binding.key().clone(),
                    module: binding.source().to_string(),
                    reason: self.reason.clone(),
                }
                .into());
            }
        }
        Ok(modules)
    }
}

/// Logs every declared binding with its provenance and returns the list unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct BindingAudit;

impl ModuleTransformer for BindingAudit {
    fn name(&self) -> &str {
        "BindingAudit"
    }

    fn transform(&self, modules: ModuleList) -> anyhow::Result<ModuleList> {
        for module in &modules {
            for binding in bindings_of(module)? {
                tracing::debug!(
                    key = %binding.key(),
                    source = binding.source(),
                    provider = ?binding.provider(),
                    "binding"
                );
            }
        }
        tracing::info!(modules = modules.len(), "Binding audit complete");
        Ok(modules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::di::{ConflictPolicy, Environment};
    use crate::module::FnModule;

    trait Clock: Send + Sync {
        fn now(&self) -> u64;
    }

    struct SystemClock;
    impl Clock for SystemClock {
        fn now(&self) -> u64 {
            1
        }
    }

    struct FixedClock(u64);
    impl Clock for FixedClock {
        fn now(&self) -> u64 {
            self.0
        }
    }

    fn clock_module() -> Arc<dyn Module> {
        FnModule::shared("ClockModule", |binder| {
            binder
                .bind::<dyn Clock>()
                .to_arc(Arc::new(SystemClock));
            binder.instance(10u32);
            Ok(())
        })
    }

    #[test]
    fn test_exclude_keeps_untouched_modules() {
        let untouched = FnModule::shared("Other", |binder| {
            binder.instance(1u8);
            Ok(())
        });
        let out = ExcludeBinding::of::<u32>()
            .transform(vec![clock_module(), Arc::clone(&untouched)])
            .unwrap();

        assert!(Arc::ptr_eq(&out[1], &untouched));
        let bindings = out[0].bindings().unwrap();
        assert_eq!(bindings.len(), 1);
        assert!(bindings[0].key().is::<dyn Clock>());
        assert_eq!(out[0].name(), "ClockModule");
    }

    #[test]
    fn test_override_builds_under_reject_policy() {
        let env = Environment::with_policy(ConflictPolicy::Reject);
        env.add_shared_module(clock_module()).unwrap();
        env.add_transformer(OverrideWith::new(vec![FnModule::shared(
            "TestClock",
            |binder| {
                binder
                    .bind::<dyn Clock>()
                    .to_arc(Arc::new(FixedClock(99)));
                Ok(())
            },
        )]))
        .unwrap();
        env.commit().unwrap();

        assert_eq!(env.lookup::<dyn Clock>().unwrap().now(), 99);
        assert_eq!(*env.lookup::<u32>().unwrap(), 10);
    }

    #[test]
    fn test_reject_names_module_and_key() {
        let policy = RejectBindings::new("trait objects must come from factories", |b| {
            b.key().is::<dyn Clock>() && !b.is_factory()
        });
        let Err(err) = policy.transform(vec![clock_module()]) else {
            panic!("factory-less trait binding should be rejected");
        };
        let config = err.downcast::<ConfigurationError>().unwrap();
        match config {
            ConfigurationError::BindingRejected { module, reason, .. } => {
                assert_eq!(module, "ClockModule");
                assert_eq!(reason, "trait objects must come from factories");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_reject_surfaces_through_commit() {
        let env = Environment::new();
        env.add_shared_module(clock_module()).unwrap();
        env.add_transformer(RejectBindings::new("no u32", |b| b.key().is::<u32>()))
            .unwrap();
        assert!(matches!(
            env.commit(),
            Err(ConfigurationError::BindingRejected { .. })
        ));
    }

    #[test]
    fn test_audit_is_identity() {
        let input = vec![clock_module()];
        let out = BindingAudit.transform(input.clone()).unwrap();
        assert_eq!(out.len(), 1);
        assert!(Arc::ptr_eq(&out[0], &input[0]));
    }
}
