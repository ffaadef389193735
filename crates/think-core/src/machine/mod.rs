//! State machine de flujos: vocabulario de eventos, tabla de transición,
//! historial append-only y motor de efectos secundarios.

pub mod core;
pub mod event;
pub mod history;
pub mod table;

pub use self::core::FlowStateMachine;
pub use event::FlowEvent;
pub use history::{TransitionHistory, TransitionRecord};
pub use table::next_state;
