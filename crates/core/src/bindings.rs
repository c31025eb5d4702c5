//! Network-event handlers declared as a table and attached to transports
//! by an owned [`Bindings`] component.

use crate::emitter::{Listener, ListenerId};
use crate::sync::lock;
use crate::transport::Transport;
use crate::types::TransportId;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

/// Handler for one named network event. `C` is the context the owner
/// supplies when attaching, e.g. the game and the originating transport.
pub type Handler<C> = Arc<dyn Fn(C, Value) -> BoxFuture<'static, ()> + Send + Sync>;

/// Declarative list of `(event name, handler)` pairs.
pub struct EventTable<C> {
    entries: Vec<(String, Handler<C>)>,
}

impl<C> Clone for EventTable<C> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}

impl<C> Default for EventTable<C> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<C: Send + 'static> EventTable<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handler for `event`.
    pub fn on<F, Fut>(mut self, event: &str, handler: F) -> Self
    where
        F: Fn(C, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler: Handler<C> = Arc::new(move |ctx, payload| handler(ctx, payload).boxed());
        self.entries.push((event.to_owned(), handler));
        self
    }

    pub fn event_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Attaches an [`EventTable`] to transports and remembers exactly which
/// listeners it installed on each one, so `detach` removes only those.
pub struct Bindings<C> {
    table: EventTable<C>,
    attached: Mutex<HashMap<TransportId, Vec<(String, ListenerId)>>>,
}

impl<C: Clone + Send + Sync + 'static> Bindings<C> {
    pub fn new(table: EventTable<C>) -> Self {
        Self {
            table,
            attached: Mutex::new(HashMap::new()),
        }
    }

    pub fn table(&self) -> &EventTable<C> {
        &self.table
    }

    /// Install every handler on `transport`. Re-attaching to the same
    /// transport replaces the previous registrations.
    pub fn attach(&self, transport: &dyn Transport, ctx: C) {
        self.detach(transport);

        let registered = self
            .table
            .entries
            .iter()
            .map(|(event, handler)| {
                let handler = Arc::clone(handler);
                let ctx = ctx.clone();
                let listener: Listener = Arc::new(move |payload| handler(ctx.clone(), payload));
                (event.clone(), transport.events().on(event, listener))
            })
            .collect();

        lock(&self.attached).insert(transport.id(), registered);
    }

    /// Remove whatever this component installed on `transport`.
    pub fn detach(&self, transport: &dyn Transport) {
        let registered = lock(&self.attached).remove(&transport.id());
        for (event, id) in registered.into_iter().flatten() {
            transport.events().remove_listener(&event, id);
        }
    }

    /// Drop the bookkeeping for a transport whose listeners were cleared
    /// elsewhere.
    pub fn forget(&self, transport: TransportId) {
        lock(&self.attached).remove(&transport);
    }

    pub fn is_attached(&self, transport: TransportId) -> bool {
        lock(&self.attached).contains_key(&transport)
    }
}
