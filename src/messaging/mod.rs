//! In-process publish/subscribe.
//!
//! Delivery is synchronous and in registration order: `publish` returns only
//! after every handler for the event's type has run. Startup and shutdown
//! coordination relies on that ordering.

mod error;

pub use error::{AggregateHandlerError, HandlerFailure};

use crate::error::panic_message;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::any::{Any, TypeId};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use uuid::Uuid;

type HandlerFn = Arc<dyn Fn(&(dyn Any + Send + Sync)) -> anyhow::Result<()> + Send + Sync>;

#[derive(Clone)]
struct Subscriber {
    id: Uuid,
    listener: String,
    handler: HandlerFn,
}

/// Identifies one subscription; pass it to [`EventDispatcher::unsubscribe`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionHandle {
    id: Uuid,
    event_type: TypeId,
    event_name: &'static str,
    listener: String,
}

impl SubscriptionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn event_name(&self) -> &'static str {
        self.event_name
    }

    pub fn listener(&self) -> &str {
        &self.listener
    }
}

/// A synchronous in-memory event bus
///
/// Subscribers are kept per event type in copy-on-write lists: `subscribe`
/// and `unsubscribe` swap in a new list, `publish` works on the list as it
/// was when dispatch began. Handlers may therefore subscribe or unsubscribe
/// from inside a handler without affecting the delivery in progress.
///
/// # Example
/// ```
/// use ignition::messaging::EventDispatcher;
///
/// struct ServerBound {
///     port: u16,
/// }
///
/// let dispatcher = EventDispatcher::new();
/// dispatcher.subscribe_named("announce", |event: &ServerBound| {
///     assert_eq!(event.port, 8080);
///     Ok(())
/// });
///
/// assert_eq!(dispatcher.publish(&ServerBound { port: 8080 }).unwrap(), 1);
/// ```
#[derive(Clone, Default)]
pub struct EventDispatcher {
    // Map of Event Type -> subscribers in registration order
    channels: Arc<DashMap<TypeId, Arc<Vec<Subscriber>>>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to events of type `E`. The listener is named after the subscription id.
    pub fn subscribe<E, F>(&self, handler: F) -> SubscriptionHandle
    where
        E: Any + Send + Sync,
        F: Fn(&E) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = Uuid::new_v4();
        self.insert::<E, F>(id, id.to_string(), handler)
    }

    /// Subscribe to events of type `E` under a listener name used in failure reports.
    pub fn subscribe_named<E, F>(&self, listener: impl Into<String>, handler: F) -> SubscriptionHandle
    where
        E: Any + Send + Sync,
        F: Fn(&E) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.insert::<E, F>(Uuid::new_v4(), listener.into(), handler)
    }

    fn insert<E, F>(&self, id: Uuid, listener: String, handler: F) -> SubscriptionHandle
    where
        E: Any + Send + Sync,
        F: Fn(&E) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let handler: HandlerFn = Arc::new(move |event: &(dyn Any + Send + Sync)| {
            match event.downcast_ref::<E>() {
                Some(event) => handler(event),
                None => Ok(()),
            }
        });
        let subscriber = Subscriber {
            id,
            listener: listener.clone(),
            handler,
        };

        let event_type = TypeId::of::<E>();
        match self.channels.entry(event_type) {
            Entry::Occupied(mut entry) => {
                let mut next = (**entry.get()).clone();
                next.push(subscriber);
                entry.insert(Arc::new(next));
            }
            Entry::Vacant(entry) => {
                entry.insert(Arc::new(vec![subscriber]));
            }
        }

        let event_name = std::any::type_name::<E>();
        tracing::debug!(event = event_name, listener = %listener, "Subscribed");
        SubscriptionHandle {
            id,
            event_type,
            event_name,
            listener,
        }
    }

    /// Deliver `event` to every subscriber of `E`, in registration order.
    ///
    /// A handler that returns an error or panics does not stop delivery to
    /// the rest. All failures are returned together once every handler has
    /// run. On success, returns the number of handlers invoked.
    pub fn publish<E: Any + Send + Sync>(&self, event: &E) -> Result<usize, AggregateHandlerError> {
        let event_type = std::any::type_name::<E>();
        let snapshot = match self.channels.get(&TypeId::of::<E>()) {
            Some(list) => Arc::clone(list.value()),
            None => {
                tracing::trace!(event = event_type, "No subscribers");
                return Ok(0);
            }
        };

        let erased: &(dyn Any + Send + Sync) = event;
        let mut failures = Vec::new();
        for subscriber in snapshot.iter() {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| (subscriber.handler)(erased)));
            let error = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e,
                Err(payload) => anyhow::anyhow!("handler panicked: {}", panic_message(&*payload)),
            };
            tracing::warn!(
                event = event_type,
                listener = %subscriber.listener,
                "Event handler failed: {:#}",
                error
            );
            failures.push(HandlerFailure {
                subscription: subscriber.id,
                listener: subscriber.listener.clone(),
                error,
            });
        }

        tracing::debug!(
            event = event_type,
            delivered = snapshot.len(),
            failed = failures.len(),
            "Event published"
        );

        if failures.is_empty() {
            Ok(snapshot.len())
        } else {
            Err(AggregateHandlerError {
                event_type,
                delivered: snapshot.len(),
                failures,
            })
        }
    }

    /// Remove a subscription. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        let Some(mut list) = self.channels.get_mut(&handle.event_type) else {
            return false;
        };
        if !list.iter().any(|s| s.id == handle.id) {
            return false;
        }

        let next: Vec<Subscriber> = list.iter().filter(|s| s.id != handle.id).cloned().collect();
        *list = Arc::new(next);
        tracing::debug!(event = handle.event_name, listener = %handle.listener, "Unsubscribed");
        true
    }

    /// Number of handlers currently subscribed to `E`.
    pub fn subscriber_count<E: Any>(&self) -> usize {
        self.channels
            .get(&TypeId::of::<E>())
            .map_or(0, |list| list.len())
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("event_types", &self.channels.len())
            .finish()
    }
}
