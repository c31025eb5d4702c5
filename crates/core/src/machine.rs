use crate::action::{find_action_target, ActionEvent, ActionTree, ActivationEvent, NodeId};
use crate::errors::PhaseError;
use crate::phase::{EndOutcome, Phase, StartOutcome};
use crate::surface::{HeadlessSurface, Surface, CONTAINER_CLASS};
use crate::sync::lock;
use crate::types::PhaseArgs;
use std::sync::{Arc, Mutex};

struct MachineState<P: ?Sized> {
    current: Option<Arc<P>>,
    /// Phases whose activation listener is attached, in attach order.
    listening: Vec<Arc<P>>,
}

fn same_phase<P: ?Sized>(a: &Arc<P>, b: &Arc<P>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

/// Single active-phase state machine.
///
/// Phases are kept in registration order and the first one is where
/// `start` goes. Locks are only held between suspension points, so a
/// phase callback may inspect the machine or even trigger another
/// transition.
pub struct PhaseMachine<P: ?Sized + Phase> {
    phases: Mutex<Vec<Arc<P>>>,
    state: Mutex<MachineState<P>>,
    surface: Arc<dyn Surface>,
    activation: ActivationEvent,
}

impl<P: ?Sized + Phase> PhaseMachine<P> {
    pub fn new(surface: Arc<dyn Surface>, activation: ActivationEvent) -> Self {
        surface.add_class(CONTAINER_CLASS);
        Self {
            phases: Mutex::new(Vec::new()),
            state: Mutex::new(MachineState {
                current: None,
                listening: Vec::new(),
            }),
            surface,
            activation,
        }
    }

    /// Machine backed by a [`HeadlessSurface`], listening for clicks.
    pub fn headless() -> Self {
        Self::new(Arc::new(HeadlessSurface::new()), ActivationEvent::Click)
    }

    pub fn surface(&self) -> &Arc<dyn Surface> {
        &self.surface
    }

    pub fn activation_event(&self) -> ActivationEvent {
        self.activation
    }

    /// Register a phase. Identifiers must be non-empty and unique.
    pub fn register(&self, phase: Arc<P>) -> Result<(), PhaseError> {
        let id = phase.id().to_owned();
        if id.is_empty() {
            return Err(PhaseError::InvalidPhase);
        }

        let mut phases = lock(&self.phases);
        if phases.iter().any(|p| p.id() == id) {
            return Err(PhaseError::AlreadyRegistered(id));
        }

        self.surface
            .register_phase_class(&phase.class_name(), phase.display_value());
        phases.push(phase);
        tracing::debug!(phase = %id, "phase registered");

        Ok(())
    }

    /// Register phases in order, stopping at the first failure.
    pub fn register_all<I>(&self, phases: I) -> Result<(), PhaseError>
    where
        I: IntoIterator<Item = Arc<P>>,
    {
        for phase in phases {
            self.register(phase)?;
        }
        Ok(())
    }

    pub fn phase(&self, id: &str) -> Option<Arc<P>> {
        lock(&self.phases).iter().find(|p| p.id() == id).cloned()
    }

    pub fn phases(&self) -> Vec<Arc<P>> {
        lock(&self.phases).clone()
    }

    pub fn current_phase(&self) -> Option<Arc<P>> {
        lock(&self.state).current.clone()
    }

    pub fn current_phase_id(&self) -> Option<String> {
        lock(&self.state).current.as_ref().map(|p| p.id().to_owned())
    }

    /// Go to the first registered phase.
    pub async fn start(&self, args: PhaseArgs) -> Result<(), PhaseError> {
        let first = lock(&self.phases).first().cloned().ok_or(PhaseError::NoPhases)?;
        self.go_to(first, args).await;
        Ok(())
    }

    /// End the current phase, then make `target` current and start it.
    pub async fn go_to(&self, target: Arc<P>, args: PhaseArgs) {
        let previous = lock(&self.state).current.clone();

        if let Some(previous) = previous {
            self.end_phase(&previous).await;
        }

        tracing::debug!(phase = %target.id(), "entering phase");
        lock(&self.state).current = Some(Arc::clone(&target));
        self.start_phase(&target, args).await;
    }

    pub async fn go_to_by_id(&self, id: &str, args: PhaseArgs) -> Result<(), PhaseError> {
        let target = self
            .phase(id)
            .ok_or_else(|| PhaseError::UnknownPhase(id.to_owned()))?;
        self.go_to(target, args).await;
        Ok(())
    }

    /// Route an activation on `node` to every phase with an attached
    /// listener. Returns false when nothing handled it, including when no
    /// marked node exists in the ancestor chain.
    pub fn dispatch_activation(&self, tree: &dyn ActionTree, node: NodeId) -> bool {
        let listening = lock(&self.state).listening.clone();
        if listening.is_empty() {
            return false;
        }

        let Some(target) = find_action_target(tree, node) else {
            return false;
        };

        let event = ActionEvent {
            action: tree.action(target).unwrap_or_default().to_owned(),
            event: self.activation,
            target,
        };

        for phase in &listening {
            phase.on_action(&event);
        }

        true
    }

    async fn start_phase(&self, phase: &Arc<P>, args: PhaseArgs) {
        if phase.on_start(args).await == StartOutcome::Veto {
            tracing::debug!(phase = %phase.id(), "start vetoed, skipping listener and class");
            return;
        }

        if phase.handles_actions() {
            self.surface.attach_activation(self.activation);
            lock(&self.state).listening.push(Arc::clone(phase));
        }

        self.surface.add_class(&phase.class_name());
    }

    async fn end_phase(&self, phase: &Arc<P>) {
        if phase.on_end().await == EndOutcome::Veto {
            tracing::debug!(phase = %phase.id(), "end vetoed, keeping listener and class");
            return;
        }

        if phase.handles_actions() {
            let mut state = lock(&self.state);
            let before = state.listening.len();
            state.listening.retain(|p| !same_phase(p, phase));
            if state.listening.len() != before {
                self.surface.detach_activation(self.activation);
            }
        }

        self.surface.remove_class(&phase.class_name());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ElementTree;
    use async_trait::async_trait;
    use std::time::Duration;

    type Log = Arc<Mutex<Vec<String>>>;

    struct TestPhase {
        id: String,
        log: Log,
        start: StartOutcome,
        end_delay: Option<Duration>,
        actions: bool,
    }

    impl TestPhase {
        fn new(id: &str, log: &Log) -> Self {
            Self {
                id: id.to_owned(),
                log: Arc::clone(log),
                start: StartOutcome::Proceed,
                end_delay: None,
                actions: false,
            }
        }
    }

    #[async_trait]
    impl Phase for TestPhase {
        fn id(&self) -> &str {
            &self.id
        }

        async fn on_start(&self, args: PhaseArgs) -> StartOutcome {
            lock(&self.log).push(format!("start:{}:{}", self.id, args.len()));
            self.start
        }

        async fn on_end(&self) -> EndOutcome {
            lock(&self.log).push(format!("end-begin:{}", self.id));
            if let Some(delay) = self.end_delay {
                tokio::time::sleep(delay).await;
            }
            lock(&self.log).push(format!("end-done:{}", self.id));
            EndOutcome::Proceed
        }

        fn handles_actions(&self) -> bool {
            self.actions
        }

        fn on_action(&self, event: &ActionEvent) {
            lock(&self.log).push(format!("action:{}:{}", self.id, event.action));
        }
    }

    fn machine() -> (PhaseMachine<dyn Phase>, Arc<HeadlessSurface>) {
        let surface = Arc::new(HeadlessSurface::new());
        let machine = PhaseMachine::new(surface.clone(), ActivationEvent::Click);
        (machine, surface)
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let log = Log::default();
        let (machine, _) = machine();

        machine.register(Arc::new(TestPhase::new("Menu", &log))).unwrap();
        let err = machine
            .register(Arc::new(TestPhase::new("Menu", &log)))
            .unwrap_err();

        assert_eq!(err, PhaseError::AlreadyRegistered("Menu".into()));
        assert_eq!(machine.phases().len(), 1);
    }

    #[test]
    fn test_same_id_on_two_machines() {
        let log = Log::default();
        let (first, _) = machine();
        let (second, _) = machine();

        assert!(first.register(Arc::new(TestPhase::new("Menu", &log))).is_ok());
        assert!(second.register(Arc::new(TestPhase::new("Menu", &log))).is_ok());
    }

    #[test]
    fn test_empty_id_rejected() {
        let log = Log::default();
        let (machine, _) = machine();

        let err = machine.register(Arc::new(TestPhase::new("", &log))).unwrap_err();
        assert_eq!(err, PhaseError::InvalidPhase);
    }

    #[test]
    fn test_registration_installs_visibility_rule() {
        let log = Log::default();
        let (machine, surface) = machine();

        machine
            .register_all([
                Arc::new(TestPhase::new("MenuPhase", &log)) as Arc<dyn Phase>,
                Arc::new(TestPhase::new("PlayPhase", &log)) as Arc<dyn Phase>,
            ])
            .unwrap();

        assert_eq!(surface.phase_classes(), vec!["menu-phase", "play-phase"]);
        assert_eq!(surface.display_for("menu-phase").as_deref(), Some("block"));
        assert!(surface.has_class(CONTAINER_CLASS));
    }

    struct Board;

    #[async_trait]
    impl Phase for Board {
        fn id(&self) -> &str {
            "BoardPhase"
        }

        fn display_value(&self) -> &str {
            "flex"
        }
    }

    #[test]
    fn test_visibility_rule_uses_display_value() {
        let (machine, surface) = machine();

        machine.register(Arc::new(Board)).unwrap();

        assert_eq!(surface.display_for("board-phase").as_deref(), Some("flex"));
    }

    #[tokio::test]
    async fn test_start_goes_to_first_phase() {
        let log = Log::default();
        let (machine, surface) = machine();
        machine.register(Arc::new(TestPhase::new("Menu", &log))).unwrap();
        machine.register(Arc::new(TestPhase::new("Play", &log))).unwrap();

        machine.start(vec![1.into(), 2.into()]).await.unwrap();

        assert_eq!(machine.current_phase_id().as_deref(), Some("Menu"));
        assert_eq!(*lock(&log), vec!["start:Menu:2"]);
        assert!(surface.has_class("menu"));
    }

    #[tokio::test]
    async fn test_start_without_phases() {
        let (machine, _) = machine();
        assert_eq!(machine.start(Vec::new()).await, Err(PhaseError::NoPhases));
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_completes_before_next_start() {
        let log = Log::default();
        let (machine, surface) = machine();
        let mut slow = TestPhase::new("Slow", &log);
        slow.end_delay = Some(Duration::from_millis(50));
        machine.register(Arc::new(slow)).unwrap();
        machine.register(Arc::new(TestPhase::new("Next", &log))).unwrap();

        machine.start(Vec::new()).await.unwrap();
        machine.go_to_by_id("Next", Vec::new()).await.unwrap();

        assert_eq!(
            *lock(&log),
            vec!["start:Slow:0", "end-begin:Slow", "end-done:Slow", "start:Next:0"]
        );
        assert!(!surface.has_class("slow"));
        assert!(surface.has_class("next"));
    }

    #[tokio::test]
    async fn test_vetoed_start_keeps_phase_current() {
        let log = Log::default();
        let (machine, surface) = machine();
        let mut vetoing = TestPhase::new("Loading", &log);
        vetoing.start = StartOutcome::Veto;
        vetoing.actions = true;
        machine.register(Arc::new(vetoing)).unwrap();

        machine.start(Vec::new()).await.unwrap();

        assert_eq!(machine.current_phase_id().as_deref(), Some("Loading"));
        assert_eq!(surface.listener_count(), 0);
        assert!(!surface.has_class("loading"));

        let mut tree = ElementTree::new();
        let button = tree.append(tree.root(), Some("go"));
        assert!(!machine.dispatch_activation(&tree, button));
    }

    #[tokio::test]
    async fn test_go_to_unknown_phase() {
        let (machine, _) = machine();
        let err = machine.go_to_by_id("Nope", Vec::new()).await.unwrap_err();
        assert_eq!(err, PhaseError::UnknownPhase("Nope".into()));
    }

    #[tokio::test]
    async fn test_action_dispatch_to_active_phase() {
        let log = Log::default();
        let (machine, surface) = machine();
        let mut menu = TestPhase::new("Menu", &log);
        menu.actions = true;
        let mut play = TestPhase::new("Play", &log);
        play.actions = true;
        machine.register(Arc::new(menu)).unwrap();
        machine.register(Arc::new(play)).unwrap();

        let mut tree = ElementTree::new();
        let button = tree.append(tree.root(), Some("start-game"));
        let label = tree.append(button, None);
        let plain = tree.append(tree.root(), None);

        machine.start(Vec::new()).await.unwrap();
        assert_eq!(surface.listener_count(), 1);
        assert!(machine.dispatch_activation(&tree, label));
        assert!(!machine.dispatch_activation(&tree, plain));

        machine.go_to_by_id("Play", Vec::new()).await.unwrap();
        assert_eq!(surface.listener_count(), 1);
        assert!(machine.dispatch_activation(&tree, button));

        let actions: Vec<String> = lock(&log)
            .iter()
            .filter(|entry| entry.starts_with("action:"))
            .cloned()
            .collect();
        assert_eq!(actions, vec!["action:Menu:start-game", "action:Play:start-game"]);
    }
}
