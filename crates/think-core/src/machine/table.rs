//! Tabla de transición (estado, evento) -> estado destino.
//!
//! Match exhaustivo sobre el par; todo lo no listado es ilegal salvo los dos
//! escapes que resuelve el motor: `ManualOverride` con destino explícito y
//! `Error` (siempre legal, fuerza `Failed`).

use crate::machine::event::FlowEvent;
use crate::model::FlowStatus;

pub fn next_state(current: FlowStatus, event: FlowEvent) -> Option<FlowStatus> {
    use FlowEvent as E;
    use FlowStatus as S;
    match (current, event) {
        (S::Initialized, E::Start) => Some(S::Running),
        (S::Initialized, E::Reset) => Some(S::Initialized),
        (S::Initialized, E::Cancel) => Some(S::Cancelled),

        // Eventos con alcance de step: el flujo sigue Running.
        (S::Running, e) if e.is_step_scoped() => Some(S::Running),
        (S::Running, E::Pause) => Some(S::Paused),
        (S::Running, E::Timeout) => Some(S::Paused),
        (S::Running, E::Error) => Some(S::Failed),
        (S::Running, E::Complete) => Some(S::Completed),
        (S::Running, E::Cancel) => Some(S::Cancelled),

        (S::Paused, E::Resume) => Some(S::Running),
        (S::Paused, E::Timeout) => Some(S::Failed),
        (S::Paused, E::Reset) => Some(S::Initialized),
        (S::Paused, E::Cancel) => Some(S::Cancelled),

        (S::Completed, E::Reset) => Some(S::Initialized),
        (S::Failed, E::Reset) => Some(S::Initialized),
        (S::Cancelled, E::Reset) => Some(S::Initialized),
        (S::Failed, E::Recover) => Some(S::Running),

        _ => None,
    }
}
