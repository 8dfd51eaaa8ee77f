use hmd_stereo::engine::events::PipelineEvent;
use hmd_stereo::engine::scene::{EyePass, RenderDestination, SceneRenderer};
use hmd_stereo::engine::schedule::TickScheduler;
use hmd_stereo::logging::{LoggingConfig, init_logging};
use hmd_stereo::render::{GraphicsContext, RecordingGraphics};
use hmd_stereo::vr::{SessionStatus, SimulatedRuntime};
use hmd_stereo::{PipelineConfig, StereoPipeline};
use std::env;

const DEFAULT_TICKS: u64 = 90;

/// Scene that only tracks what it was asked to draw.
#[derive(Default)]
struct GridScene {
    updates: u64,
    headset_passes: u64,
    preview_passes: u64,
}

impl SceneRenderer for GridScene {
    fn initialize_scene(&mut self, gfx: &mut dyn GraphicsContext) {
        log::info!("[preview] scene initialized on {}", gfx.label());
    }

    fn update_scene(&mut self, status: &SessionStatus) {
        self.updates += 1;
        if !status.hmd_mounted {
            log::debug!("[preview] headset not mounted");
        }
    }

    fn draw_eye(&mut self, gfx: &mut dyn GraphicsContext, pass: &EyePass) {
        gfx.set_viewport(pass.viewport);
        match pass.destination {
            RenderDestination::Headset => self.headset_passes += 1,
            RenderDestination::PreviewWindow => self.preview_passes += 1,
        }
    }
}

fn main() {
    init_logging(LoggingConfig::default());
    if let Err(err) = run() {
        eprintln!("[preview] error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = env::args().skip(1);
    let config = match args.next() {
        Some(path) => PipelineConfig::load(&path)?,
        None => PipelineConfig::default(),
    };
    let ticks = match args.next() {
        Some(count) => count.parse()?,
        None => DEFAULT_TICKS,
    };

    let scheduler = TickScheduler::new(config.tick_interval());
    let mut pipeline = StereoPipeline::start(
        SimulatedRuntime::new(),
        RecordingGraphics::new(),
        GridScene::default(),
        config,
    )?;

    let mut controller_events = 0u64;
    let summary = scheduler.run(&mut pipeline, Some(ticks), |events| {
        for event in events {
            match event {
                PipelineEvent::ControllerState(_) => controller_events += 1,
                other => log::info!("[preview] event {other:?}"),
            }
        }
    });

    let scene = pipeline.scene();
    println!(
        "[preview] {} ticks ({:?}), {} headset passes, {} preview passes, \
         {} controller events, slowest tick {:.2}ms",
        summary.ticks_run,
        summary.stop_reason,
        scene.headset_passes,
        scene.preview_passes,
        controller_events,
        summary.slowest_tick_ms()
    );
    println!("{}", pipeline.stats().to_json()?);
    pipeline.shutdown();
    Ok(())
}
