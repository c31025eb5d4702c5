pub mod action;
pub mod bindings;
pub mod emitter;
pub mod errors;
pub mod machine;
pub mod online;
pub mod phase;
pub mod protocol;
pub mod surface;
pub mod sync;
pub mod transport;
pub mod types;
pub mod uniq_id;

pub use action::{find_action_target, ActionEvent, ActionTree, ActivationEvent, ElementTree, NodeId};
pub use bindings::{Bindings, EventTable, Handler};
pub use emitter::{listener, sync_listener, EventEmitter, Listener, ListenerId};
pub use errors::{PhaseError, TransportError};
pub use machine::PhaseMachine;
pub use online::{rebind_phase, NetworkPhase, OnlinePhase, PhaseBinder};
pub use phase::{class_name, EndOutcome, Phase, StartOutcome};
pub use surface::{HeadlessSurface, Surface, CONTAINER_CLASS};
pub use transport::{LocalTransport, Transport, DISCONNECT_EVENT};
pub use protocol::ControlEvent;
pub use types::{GameId, PhaseArgs, PlayerId, TransportId};
pub use uniq_id::{to_base36, GlobalIdGenerator, IdGenerator, MonotonicIdGenerator, SequentialIdGenerator};
