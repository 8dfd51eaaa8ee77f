use super::events::PipelineEvent;
use super::scene::SceneRenderer;
use super::{HeadsetOutcome, StereoPipeline};
use crate::render::GraphicsContext;
use crate::vr::HmdRuntime;
use std::thread;
use std::time::{Duration, Instant};

/// Why [`TickScheduler::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Quit,
    TickLimit,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduleSummary {
    pub ticks_run: u64,
    pub headset_frames: u64,
    pub stop_reason: StopReason,
    pub elapsed: Duration,
    pub slowest_tick: Duration,
}

impl ScheduleSummary {
    pub fn slowest_tick_ms(&self) -> f32 {
        self.slowest_tick.as_secs_f64() as f32 * 1000.0
    }
}

/// Fixed-interval host loop standing in for a UI timer.
///
/// Each tick runs to completion before the next one starts; a tick that
/// overruns the interval is followed immediately by the next.
#[derive(Debug, Clone, Copy)]
pub struct TickScheduler {
    interval: Duration,
}

impl TickScheduler {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Ticks until the pipeline quits or `max_ticks` ticks have run.
    ///
    /// After every tick the pipeline's pending events are drained into
    /// `on_events`, so the queue never outlives a tick.
    pub fn run<R, G, S>(
        &self,
        pipeline: &mut StereoPipeline<R, G, S>,
        max_ticks: Option<u64>,
        mut on_events: impl FnMut(Vec<PipelineEvent>),
    ) -> ScheduleSummary
    where
        R: HmdRuntime,
        G: GraphicsContext,
        S: SceneRenderer,
    {
        let started = Instant::now();
        let mut ticks_run = 0;
        let mut headset_frames = 0;
        let mut slowest_tick = Duration::ZERO;

        let stop_reason = loop {
            if max_ticks.is_some_and(|limit| ticks_run >= limit) {
                break StopReason::TickLimit;
            }

            let tick_started = Instant::now();
            let report = pipeline.tick();
            let events = pipeline.drain_events();
            if !events.is_empty() {
                on_events(events);
            }
            if report.quit {
                log::info!("[schedule] pipeline quit after {ticks_run} ticks");
                break StopReason::Quit;
            }
            ticks_run += 1;
            if matches!(report.headset, HeadsetOutcome::Submitted { .. }) {
                headset_frames += 1;
            }

            let spent = tick_started.elapsed();
            slowest_tick = slowest_tick.max(spent);
            if let Some(remaining) = self.interval.checked_sub(spent) {
                if !remaining.is_zero() {
                    thread::sleep(remaining);
                }
            } else {
                log::debug!(
                    "[schedule] tick took {:.2}ms, over the {:?} interval",
                    spent.as_secs_f64() * 1000.0,
                    self.interval
                );
            }
        };

        ScheduleSummary {
            ticks_run,
            headset_frames,
            stop_reason,
            elapsed: started.elapsed(),
            slowest_tick,
        }
    }
}
