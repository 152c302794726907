//! Callback registry mapping subscription ids to interested handlers.
//!
//! The registry is the shared state between the subscription lifecycle (which
//! registers and unregisters handlers) and the NOTIFY dispatch path (which
//! queues incoming events for delivery). Each registration owns an ordered
//! delivery queue drained by one long-lived task, so events for a
//! subscription reach each handler in the order their NOTIFY requests were
//! accepted, while handlers stay isolated from one another.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::event::Event;

/// Error type a callback may fail with. Failures are logged and isolated;
/// they never reach the HTTP layer or other callbacks.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

type CallbackFn = dyn Fn(Arc<Event>) -> BoxFuture<'static, Result<(), CallbackError>>
    + Send
    + Sync;

/// A cloneable handle to an async event callback.
///
/// Each handle created through [`EventCallback::new`] gets a unique identity;
/// clones share it. Identity, not closure equality, is what gives the
/// registry its set semantics: registering the same handle twice is a no-op,
/// and unregistering is done by handle.
#[derive(Clone)]
pub struct EventCallback {
    id: Uuid,
    handler: Arc<CallbackFn>,
}

impl EventCallback {
    /// Wrap an async closure into a callback handle.
    pub fn new<F, Fut>(handler: F) -> Self
    where
        F: Fn(Arc<Event>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<(), CallbackError>> + Send + 'static,
    {
        Self {
            id: Uuid::new_v4(),
            handler: Arc::new(move |event| Box::pin(handler(event))),
        }
    }

    /// Invoke the callback with an event.
    pub fn invoke(&self, event: Arc<Event>) -> BoxFuture<'static, Result<(), CallbackError>> {
        (self.handler)(event)
    }

    /// The handle's identity.
    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl fmt::Debug for EventCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventCallback").field("id", &self.id).finish()
    }
}

/// Errors from registry operations
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The callback was never registered for the given subscription id.
    /// This signals a lifecycle bug in the caller, not a transient state.
    #[error("callback {callback_id} is not registered for subscription '{sid}'")]
    CallbackNotRegistered {
        /// The subscription id the unregistration targeted
        sid: String,
        /// Identity of the callback handle
        callback_id: Uuid,
    },
}

/// One registered handler and the sending side of its delivery queue.
///
/// Dropping the registration closes the queue; its worker drains whatever was
/// already queued and exits.
struct Registration {
    callback: EventCallback,
    queue: mpsc::UnboundedSender<Arc<Event>>,
}

/// Maps subscription ids to the set of callbacks interested in them.
///
/// Dispatch goes through [`deliver`](Self::deliver), which only enqueues:
/// each registration's worker invokes the callback one event at a time, so
/// per-subscription ordering holds no matter how the runtime schedules
/// tasks, and a slow handler only ever delays its own queue.
#[derive(Default)]
pub struct CallbackRegistry {
    registrations: RwLock<HashMap<String, Vec<Registration>>>,
}

impl CallbackRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for events with subscription id `sid`.
    ///
    /// Registering the same handle twice for the same sid is idempotent.
    pub async fn register(&self, sid: &str, callback: EventCallback) {
        let mut registrations = self.registrations.write().await;
        let entry = registrations.entry(sid.to_string()).or_default();
        if entry.iter().any(|r| r.callback.id == callback.id) {
            return;
        }

        let (queue, events) = mpsc::unbounded_channel();
        spawn_delivery_worker(sid.to_string(), callback.clone(), events);
        entry.push(Registration { callback, queue });
    }

    /// Remove `callback` from `sid`'s handler set.
    ///
    /// Events already queued for the handler are still delivered; its worker
    /// exits once the queue runs dry.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::CallbackNotRegistered`] when the handle was
    /// never registered for that sid.
    pub async fn unregister(
        &self,
        sid: &str,
        callback: &EventCallback,
    ) -> Result<(), RegistryError> {
        let mut registrations = self.registrations.write().await;
        let entry = registrations
            .get_mut(sid)
            .ok_or_else(|| RegistryError::CallbackNotRegistered {
                sid: sid.to_string(),
                callback_id: callback.id,
            })?;

        let before = entry.len();
        entry.retain(|r| r.callback.id != callback.id);
        if entry.len() == before {
            return Err(RegistryError::CallbackNotRegistered {
                sid: sid.to_string(),
                callback_id: callback.id,
            });
        }
        if entry.is_empty() {
            registrations.remove(sid);
        }
        Ok(())
    }

    /// Queue `event` for every callback registered for `sid`, in arrival
    /// order, and return how many handlers it was queued for.
    ///
    /// A sid with no registrations queues to nobody; that is a valid,
    /// non-error state. Enqueueing never waits on handler execution.
    pub async fn deliver(&self, sid: &str, event: Arc<Event>) -> usize {
        let registrations = self.registrations.read().await;
        let Some(entry) = registrations.get(sid) else {
            return 0;
        };
        for registration in entry {
            // Send only fails once the worker is gone, which means the
            // registration was already removed.
            let _ = registration.queue.send(event.clone());
        }
        entry.len()
    }

    /// Snapshot the callback handles registered for `sid`.
    pub async fn callbacks_for(&self, sid: &str) -> Vec<EventCallback> {
        let registrations = self.registrations.read().await;
        registrations
            .get(sid)
            .map(|entry| entry.iter().map(|r| r.callback.clone()).collect())
            .unwrap_or_default()
    }
}

/// Start the long-lived delivery task for one registration.
///
/// The worker awaits each invocation before taking the next event, which is
/// what serializes delivery per handler. Each invocation still runs as its
/// own task so a panicking callback surfaces as a `JoinError` instead of
/// killing the delivery loop.
fn spawn_delivery_worker(
    sid: String,
    callback: EventCallback,
    mut events: mpsc::UnboundedReceiver<Arc<Event>>,
) {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let invocation = tokio::spawn(callback.invoke(event));
            match invocation.await {
                Ok(Ok(())) => {}
                Ok(Err(error)) => {
                    tracing::error!(
                        sid = %sid,
                        callback = %callback.id,
                        error = %error,
                        "event callback failed"
                    );
                }
                Err(join_error) => {
                    tracing::error!(
                        sid = %sid,
                        callback = %callback.id,
                        "event callback panicked: {join_error}"
                    );
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_callback() -> EventCallback {
        EventCallback::new(|_event| async { Ok(()) })
    }

    fn event(seq: &str) -> Arc<Event> {
        Arc::new(Event {
            sid: "uuid:sub-1".to_string(),
            seq: seq.to_string(),
            variables: Default::default(),
        })
    }

    #[tokio::test]
    async fn test_register_is_idempotent_per_handle() {
        let registry = CallbackRegistry::new();
        let callback = noop_callback();

        registry.register("uuid:sub-1", callback.clone()).await;
        registry.register("uuid:sub-1", callback.clone()).await;

        assert_eq!(registry.callbacks_for("uuid:sub-1").await.len(), 1);
    }

    #[tokio::test]
    async fn test_distinct_handles_accumulate() {
        let registry = CallbackRegistry::new();
        registry.register("uuid:sub-1", noop_callback()).await;
        registry.register("uuid:sub-1", noop_callback()).await;

        assert_eq!(registry.callbacks_for("uuid:sub-1").await.len(), 2);
    }

    #[tokio::test]
    async fn test_unregister_removes_handle() {
        let registry = CallbackRegistry::new();
        let callback = noop_callback();
        registry.register("uuid:sub-1", callback.clone()).await;

        registry.unregister("uuid:sub-1", &callback).await.unwrap();
        assert!(registry.callbacks_for("uuid:sub-1").await.is_empty());
    }

    #[tokio::test]
    async fn test_unregister_unknown_handle_fails() {
        let registry = CallbackRegistry::new();
        let registered = noop_callback();
        let stranger = noop_callback();
        registry.register("uuid:sub-1", registered).await;

        let result = registry.unregister("uuid:sub-1", &stranger).await;
        assert!(matches!(
            result,
            Err(RegistryError::CallbackNotRegistered { .. })
        ));
    }

    #[tokio::test]
    async fn test_unregister_unknown_sid_fails() {
        let registry = CallbackRegistry::new();
        let result = registry.unregister("uuid:nowhere", &noop_callback()).await;
        assert!(matches!(
            result,
            Err(RegistryError::CallbackNotRegistered { .. })
        ));
    }

    #[tokio::test]
    async fn test_unknown_sid_delivers_to_nobody() {
        let registry = CallbackRegistry::new();
        assert_eq!(registry.deliver("uuid:nobody", event("0")).await, 0);
    }

    #[tokio::test]
    async fn test_delivery_is_serialized_per_handler() {
        let registry = CallbackRegistry::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        // A handler that dawdles on the first event. Were invocations run
        // concurrently, later events would overtake it.
        let callback = EventCallback::new(move |event: Arc<Event>| {
            let tx = tx.clone();
            async move {
                if event.seq == "0" {
                    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                }
                let _ = tx.send(event.seq.clone());
                Ok(())
            }
        });
        registry.register("uuid:sub-1", callback).await;

        for seq in 0..3 {
            registry.deliver("uuid:sub-1", event(&seq.to_string())).await;
        }

        for expected in 0..3 {
            assert_eq!(rx.recv().await.as_deref(), Some(expected.to_string().as_str()));
        }
    }
}
