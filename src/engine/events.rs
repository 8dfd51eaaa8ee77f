use crate::vr::{AdapterLuid, InputState};
use serde::Serialize;
use std::collections::VecDeque;

/// Controller snapshot forwarded to the host once per tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ControllerStateEvent {
    pub tick: u64,
    pub state: InputState,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    ControllerState(ControllerStateEvent),
    /// The device runs on a different adapter than the system default.
    AdapterMismatch {
        device: AdapterLuid,
        system: AdapterLuid,
    },
    /// The runtime ended the session; no further ticks will render.
    SessionEnded,
}

/// Events produced during ticks, drained by the host.
#[derive(Debug, Default)]
pub struct EventQueue {
    pending: VecDeque<PipelineEvent>,
}

impl EventQueue {
    pub fn push(&mut self, event: PipelineEvent) {
        self.pending.push_back(event);
    }

    pub fn drain(&mut self) -> Vec<PipelineEvent> {
        self.pending.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
