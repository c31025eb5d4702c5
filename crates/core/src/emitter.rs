use crate::sync::lock;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

/// Callback invoked with an event's payload.
pub type Listener = Arc<dyn Fn(Value) -> BoxFuture<'static, ()> + Send + Sync>;

/// Identifies one registration so it can be removed later.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Wrap an async closure as a [`Listener`].
pub fn listener<F, Fut>(f: F) -> Listener
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |payload| f(payload).boxed())
}

/// Wrap a plain closure as a [`Listener`].
pub fn sync_listener<F>(f: F) -> Listener
where
    F: Fn(Value) + Send + Sync + 'static,
{
    Arc::new(move |payload| {
        f(payload);
        futures::future::ready(()).boxed()
    })
}

struct Registration {
    id: ListenerId,
    once: bool,
    listener: Listener,
}

#[derive(Default)]
struct EmitterInner {
    next_id: u64,
    listeners: HashMap<String, Vec<Registration>>,
}

/// Named-event listener registry shared by every transport binding.
#[derive(Default)]
pub struct EventEmitter {
    inner: Mutex<EmitterInner>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&self, event: &str, listener: Listener) -> ListenerId {
        self.register(event, listener, false)
    }

    /// Register a listener that is dropped after its first invocation.
    pub fn once(&self, event: &str, listener: Listener) -> ListenerId {
        self.register(event, listener, true)
    }

    /// Returns false if no such registration existed.
    pub fn remove_listener(&self, event: &str, id: ListenerId) -> bool {
        let mut inner = lock(&self.inner);
        let Some(registrations) = inner.listeners.get_mut(event) else {
            return false;
        };

        let before = registrations.len();
        registrations.retain(|r| r.id != id);
        let removed = registrations.len() != before;

        if registrations.is_empty() {
            inner.listeners.remove(event);
        }

        removed
    }

    pub fn remove_all_listeners(&self) {
        lock(&self.inner).listeners.clear();
    }

    pub fn listener_count(&self, event: &str) -> usize {
        lock(&self.inner).listeners.get(event).map_or(0, Vec::len)
    }

    /// Invoke every listener registered for `event`, in registration order,
    /// awaiting each one. Returns how many listeners ran.
    ///
    /// The listener set is snapshotted first, so listeners may add or
    /// remove registrations (including their own) while running.
    pub async fn emit(&self, event: &str, payload: Value) -> usize {
        let snapshot: Vec<Listener> = {
            let mut inner = lock(&self.inner);
            match inner.listeners.get_mut(event) {
                Some(registrations) => {
                    let snapshot = registrations
                        .iter()
                        .map(|r| Arc::clone(&r.listener))
                        .collect();
                    registrations.retain(|r| !r.once);
                    snapshot
                }
                None => Vec::new(),
            }
        };

        for listener in &snapshot {
            listener(payload.clone()).await;
        }

        snapshot.len()
    }

    fn register(&self, event: &str, listener: Listener, once: bool) -> ListenerId {
        let mut inner = lock(&self.inner);
        let id = ListenerId(inner.next_id);
        inner.next_id += 1;
        inner
            .listeners
            .entry(event.to_owned())
            .or_default()
            .push(Registration { id, once, listener });
        id
    }
}
