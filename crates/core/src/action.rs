//! Generic "action" input: activation events on the game container are
//! resolved to the nearest ancestor carrying an action marker.

use std::fmt;

/// The single activation event a game listens to, chosen once at startup.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ActivationEvent {
    Click,
    TouchStart,
}

impl ActivationEvent {
    /// Pick `touchstart` on touch-capable hosts and `click` everywhere else.
    pub fn detect(touch_capable: bool) -> Self {
        if touch_capable {
            ActivationEvent::TouchStart
        } else {
            ActivationEvent::Click
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ActivationEvent::Click => "click",
            ActivationEvent::TouchStart => "touchstart",
        }
    }
}

impl fmt::Display for ActivationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Handle to a node of the host's element tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(pub usize);

/// Read access to the element tree an activation event happened in.
pub trait ActionTree {
    /// Value of the node's action marker, if it carries one.
    fn action(&self, node: NodeId) -> Option<&str>;

    fn parent(&self, node: NodeId) -> Option<NodeId>;
}

/// Payload handed to a phase's action handler.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActionEvent {
    pub action: String,
    pub event: ActivationEvent,
    /// The marked node, which may be an ancestor of the node that was hit.
    pub target: NodeId,
}

/// Walk from `node` up through its ancestors and return the first one
/// carrying an action marker.
pub fn find_action_target(tree: &dyn ActionTree, node: NodeId) -> Option<NodeId> {
    let mut current = Some(node);

    while let Some(candidate) = current {
        if tree.action(candidate).is_some() {
            return Some(candidate);
        }
        current = tree.parent(candidate);
    }

    None
}

struct Element {
    action: Option<String>,
    parent: Option<NodeId>,
}

/// Minimal arena-backed element tree, for headless hosts and tests.
pub struct ElementTree {
    elements: Vec<Element>,
}

impl ElementTree {
    /// Create a tree holding only the root container.
    pub fn new() -> Self {
        Self {
            elements: vec![Element {
                action: None,
                parent: None,
            }],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Append a child under `parent`, optionally marked with an action.
    pub fn append(&mut self, parent: NodeId, action: Option<&str>) -> NodeId {
        let id = NodeId(self.elements.len());
        self.elements.push(Element {
            action: action.map(str::to_owned),
            parent: Some(parent),
        });
        id
    }
}

impl Default for ElementTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionTree for ElementTree {
    fn action(&self, node: NodeId) -> Option<&str> {
        self.elements.get(node.0)?.action.as_deref()
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.elements.get(node.0)?.parent
    }
}
