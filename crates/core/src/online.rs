use crate::action::ActionEvent;
use crate::bindings::{Bindings, EventTable};
use crate::machine::PhaseMachine;
use crate::phase::{EndOutcome, Phase, StartOutcome};
use crate::sync::lock;
use crate::transport::Transport;
use crate::types::PhaseArgs;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// A phase that also owns network-event handlers, attached to every
/// connected transport while it is the current phase.
pub trait NetworkPhase<C>: Phase {
    fn bindings(&self) -> &Bindings<C>;
}

/// Wraps a plain [`Phase`] together with the handler table it exposes
/// while active.
pub struct OnlinePhase<P, C> {
    phase: P,
    bindings: Bindings<C>,
}

impl<P, C> OnlinePhase<P, C>
where
    P: Phase,
    C: Clone + Send + Sync + 'static,
{
    pub fn new(phase: P, events: EventTable<C>) -> Self {
        Self {
            phase,
            bindings: Bindings::new(events),
        }
    }

    pub fn inner(&self) -> &P {
        &self.phase
    }
}

#[async_trait]
impl<P, C> Phase for OnlinePhase<P, C>
where
    P: Phase,
    C: Send + Sync,
{
    fn id(&self) -> &str {
        self.phase.id()
    }

    fn class_name(&self) -> String {
        self.phase.class_name()
    }

    fn display_value(&self) -> &str {
        self.phase.display_value()
    }

    async fn on_start(&self, args: PhaseArgs) -> StartOutcome {
        self.phase.on_start(args).await
    }

    async fn on_end(&self) -> EndOutcome {
        self.phase.on_end().await
    }

    fn handles_actions(&self) -> bool {
        self.phase.handles_actions()
    }

    fn on_action(&self, event: &ActionEvent) {
        self.phase.on_action(event)
    }
}

impl<P, C> NetworkPhase<C> for OnlinePhase<P, C>
where
    P: Phase,
    C: Clone + Send + Sync + 'static,
{
    fn bindings(&self) -> &Bindings<C> {
        &self.bindings
    }
}

/// Move network handlers from the outgoing phase to the incoming one on
/// every given transport. Runs before the local transition so no transport
/// ever carries two phases' handlers.
pub fn rebind_phase<C>(
    previous: Option<&Arc<dyn NetworkPhase<C>>>,
    next: &Arc<dyn NetworkPhase<C>>,
    transports: &[(Arc<dyn Transport>, C)],
) where
    C: Clone + Send + Sync + 'static,
{
    if let Some(previous) = previous {
        for (transport, _) in transports {
            previous.bindings().detach(transport.as_ref());
        }
    }

    for (transport, ctx) in transports {
        next.bindings().attach(transport.as_ref(), ctx.clone());
    }
}

/// Records which phase's handlers are on the transports and runs
/// transitions one at a time, so a transport joining or leaving mid
/// transition is bound to the same phase as everyone else.
pub struct PhaseBinder<C> {
    transition: tokio::sync::Mutex<()>,
    bound: Mutex<Option<Arc<dyn NetworkPhase<C>>>>,
}

impl<C> Default for PhaseBinder<C> {
    fn default() -> Self {
        Self {
            transition: tokio::sync::Mutex::new(()),
            bound: Mutex::new(None),
        }
    }
}

impl<C> PhaseBinder<C>
where
    C: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Phase whose handlers are currently attached. Ahead of
    /// `PhaseMachine::current_phase` while a transition is ending the
    /// outgoing phase.
    pub fn bound_phase(&self) -> Option<Arc<dyn NetworkPhase<C>>> {
        lock(&self.bound).clone()
    }

    /// Rebind the transports listed by `transports` to `target`, then run
    /// the local transition. A second call waits for the first to finish,
    /// so it must not be made from a phase callback of the same machine.
    pub async fn transition<F>(
        &self,
        machine: &PhaseMachine<dyn NetworkPhase<C>>,
        target: Arc<dyn NetworkPhase<C>>,
        args: PhaseArgs,
        transports: F,
    ) where
        F: FnOnce() -> Vec<(Arc<dyn Transport>, C)>,
    {
        let _transition = self.transition.lock().await;
        {
            let mut bound = lock(&self.bound);
            rebind_phase(bound.as_ref(), &target, &transports());
            *bound = Some(Arc::clone(&target));
        }
        machine.go_to(target, args).await;
    }

    /// Attach the bound phase's handlers to a transport that just joined.
    pub fn attach(&self, transport: &dyn Transport, ctx: C) {
        if let Some(phase) = lock(&self.bound).as_ref() {
            phase.bindings().attach(transport, ctx);
        }
    }

    pub fn detach(&self, transport: &dyn Transport) {
        if let Some(phase) = lock(&self.bound).as_ref() {
            phase.bindings().detach(transport);
        }
    }
}
