use super::events::{ControllerStateEvent, EventQueue, PipelineEvent};
use super::stats::PipelineStats;
use crate::vr::{ControllerType, DeviceSession, HmdRuntime, SessionStatus};

/// What the rest of the tick should do after the status poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickControl {
    /// Carries the status that requested the quit.
    Quit(SessionStatus),
    Proceed(SessionStatus),
}

/// Polls session status and controller input at the start of each tick.
#[derive(Debug, Clone, Copy)]
pub struct StatusHandler {
    enable_controllers: bool,
    controller_type: ControllerType,
}

impl StatusHandler {
    pub fn new(enable_controllers: bool, controller_type: ControllerType) -> Self {
        Self {
            enable_controllers,
            controller_type,
        }
    }

    /// Handles quit and recenter requests, then forwards controller state.
    ///
    /// An unreadable status is treated as "not visible" so the tick still
    /// runs without producing a headset frame.
    pub fn poll<R: HmdRuntime>(
        &self,
        session: &mut DeviceSession<R>,
        tick: u64,
        events: &mut EventQueue,
        stats: &mut PipelineStats,
    ) -> TickControl {
        let status = match session.status() {
            Ok(status) => status,
            Err(err) => {
                stats.status_query_failures += 1;
                log::warn!("[status] session status query failed: {err}");
                SessionStatus::default()
            }
        };

        if status.should_quit {
            log::info!("[status] runtime requested quit at tick {tick}");
            return TickControl::Quit(status);
        }

        if status.should_recenter {
            match session.recenter() {
                Ok(()) => {
                    stats.recenters += 1;
                    log::debug!("[status] tracking origin recentered");
                }
                Err(err) => log::warn!("[status] recenter failed: {err}"),
            }
        }

        if self.enable_controllers {
            match session.input_state(self.controller_type) {
                Ok(state) => events.push(PipelineEvent::ControllerState(ControllerStateEvent {
                    tick,
                    state,
                })),
                Err(err) => {
                    stats.input_query_failures += 1;
                    log::warn!(
                        "[status] input state for {:?} failed: {err}",
                        self.controller_type
                    );
                }
            }
        }

        TickControl::Proceed(status)
    }
}
