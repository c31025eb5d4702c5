use crate::action::ActivationEvent;
use crate::sync::lock;
use std::sync::Mutex;

/// Class added to every game's root container.
pub const CONTAINER_CLASS: &str = "ludumjs-game-container";

/// The game's root visual container, as seen by the phase machine.
///
/// Browser hosts map these calls onto the DOM; headless hosts record them.
pub trait Surface: Send + Sync {
    /// Install the visibility rule for elements tagged with this phase
    /// class: hidden unless the container carries the class, then shown
    /// with `display`.
    fn register_phase_class(&self, _class: &str, _display: &str) {}

    fn add_class(&self, class: &str);

    fn remove_class(&self, class: &str);

    fn attach_activation(&self, _event: ActivationEvent) {}

    fn detach_activation(&self, _event: ActivationEvent) {}
}

#[derive(Default)]
struct SurfaceState {
    classes: Vec<String>,
    phase_classes: Vec<(String, String)>,
    listeners: usize,
}

/// In-memory surface for servers and tests.
#[derive(Default)]
pub struct HeadlessSurface {
    state: Mutex<SurfaceState>,
}

impl HeadlessSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_class(&self, class: &str) -> bool {
        lock(&self.state).classes.iter().any(|c| c == class)
    }

    pub fn classes(&self) -> Vec<String> {
        lock(&self.state).classes.clone()
    }

    /// Classes that got a visibility rule, in registration order.
    pub fn phase_classes(&self) -> Vec<String> {
        lock(&self.state)
            .phase_classes
            .iter()
            .map(|(class, _)| class.clone())
            .collect()
    }

    /// `display` value registered for `class`.
    pub fn display_for(&self, class: &str) -> Option<String> {
        lock(&self.state)
            .phase_classes
            .iter()
            .find(|(c, _)| c == class)
            .map(|(_, display)| display.clone())
    }

    /// Number of activation listeners currently attached.
    pub fn listener_count(&self) -> usize {
        lock(&self.state).listeners
    }
}

impl Surface for HeadlessSurface {
    fn register_phase_class(&self, class: &str, display: &str) {
        lock(&self.state)
            .phase_classes
            .push((class.to_owned(), display.to_owned()));
    }

    fn add_class(&self, class: &str) {
        let mut state = lock(&self.state);
        if !state.classes.iter().any(|c| c == class) {
            state.classes.push(class.to_owned());
        }
    }

    fn remove_class(&self, class: &str) {
        lock(&self.state).classes.retain(|c| c != class);
    }

    fn attach_activation(&self, _event: ActivationEvent) {
        lock(&self.state).listeners += 1;
    }

    fn detach_activation(&self, _event: ActivationEvent) {
        let mut state = lock(&self.state);
        state.listeners = state.listeners.saturating_sub(1);
    }
}
