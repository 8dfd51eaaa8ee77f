use hmd_stereo::engine::events::PipelineEvent;
use hmd_stereo::engine::scene::{EyePass, RenderDestination, SceneRenderer};
use hmd_stereo::render::{
    Attachment, FramebufferId, GraphicsCall, GraphicsContext, RecordingGraphics,
};
use hmd_stereo::vr::{
    AdapterLuid, Eye, InputState, RuntimeCall, RuntimeErrorKind, SessionStatus, SimulatedRuntime,
    TextureFormat, VrError,
};
use hmd_stereo::{HeadsetOutcome, PipelineConfig, PreviewStrategy, StereoPipeline};
use proptest::prelude::*;

#[derive(Default)]
struct RecordingScene {
    initialized: u32,
    updates: u32,
    passes: Vec<(Eye, RenderDestination)>,
}

impl SceneRenderer for RecordingScene {
    fn initialize_scene(&mut self, _gfx: &mut dyn GraphicsContext) {
        self.initialized += 1;
    }

    fn update_scene(&mut self, _status: &SessionStatus) {
        self.updates += 1;
    }

    fn draw_eye(&mut self, _gfx: &mut dyn GraphicsContext, pass: &EyePass) {
        self.passes.push((pass.eye, pass.destination));
    }
}

type Pipeline = StereoPipeline<SimulatedRuntime, RecordingGraphics, RecordingScene>;

fn start_with(runtime: SimulatedRuntime, config: PipelineConfig) -> Pipeline {
    let graphics = RecordingGraphics::new();
    match StereoPipeline::start(runtime, graphics, RecordingScene::default(), config) {
        Ok(pipeline) => pipeline,
        Err(err) => panic!("pipeline failed to start: {err}"),
    }
}

fn headset_only() -> PipelineConfig {
    PipelineConfig {
        show_preview_window: false,
        enable_controllers: false,
        ..PipelineConfig::default()
    }
}

fn with_preview() -> PipelineConfig {
    PipelineConfig {
        enable_controllers: false,
        ..PipelineConfig::default()
    }
}

fn visible() -> SessionStatus {
    SessionStatus {
        is_visible: true,
        hmd_present: true,
        hmd_mounted: true,
        ..SessionStatus::default()
    }
}

fn submit_count(pipeline: &Pipeline) -> usize {
    pipeline
        .runtime()
        .count_calls(|call| matches!(call, RuntimeCall::SubmitFrame { .. }))
}

#[test]
fn frame_index_advances_only_on_accepted_submissions() {
    let mut pipeline = start_with(SimulatedRuntime::new(), headset_only());
    pipeline.tick();
    assert_eq!(pipeline.frame_index(), 1);

    pipeline
        .runtime_mut()
        .fail_submissions(3, RuntimeErrorKind::DisplayLost);
    for _ in 0..3 {
        let report = pipeline.tick();
        assert_eq!(report.headset, HeadsetOutcome::SubmitFailed { frame_index: 1 });
        assert!(!report.quit);
    }
    assert_eq!(pipeline.frame_index(), 1);

    let report = pipeline.tick();
    assert!(matches!(
        report.headset,
        HeadsetOutcome::Submitted { frame_index: 1, .. }
    ));
    assert_eq!(pipeline.frame_index(), 2);
    assert_eq!(pipeline.stats().submission_failures, 3);
    assert_eq!(pipeline.runtime().pose_frame_indices(), vec![0, 1, 1, 1, 1]);
}

#[test]
fn invisible_tick_skips_headset_but_still_previews() {
    let mut pipeline = start_with(SimulatedRuntime::new(), with_preview());
    pipeline.graphics_mut().take_calls();
    pipeline.runtime_mut().queue_status(SessionStatus {
        is_visible: false,
        hmd_present: true,
        ..SessionStatus::default()
    });

    let report = pipeline.tick();
    assert_eq!(report.headset, HeadsetOutcome::Skipped);
    assert!(report.preview_rendered);
    assert_eq!(submit_count(&pipeline), 0);
    assert_eq!(pipeline.frame_index(), 0);
    assert_eq!(pipeline.scene().updates, 0);
    assert_eq!(
        pipeline.scene().passes,
        vec![
            (Eye::Left, RenderDestination::PreviewWindow),
            (Eye::Right, RenderDestination::PreviewWindow)
        ]
    );

    let targets = pipeline.targets().expect("targets");
    let eye_framebuffers: Vec<_> = targets.iter().map(|target| target.framebuffer()).collect();
    let bound_eye_target = pipeline.graphics().count(|call| {
        matches!(call, GraphicsCall::BindFramebuffer(fb) if eye_framebuffers.contains(fb))
    });
    assert_eq!(bound_eye_target, 0);
    assert_eq!(pipeline.stats().skipped_invisible_ticks, 1);
}

#[test]
fn preview_never_commits_or_advances_the_frame() {
    let mut pipeline = start_with(SimulatedRuntime::new(), with_preview());
    for _ in 0..3 {
        pipeline.tick();
    }

    assert_eq!(pipeline.frame_index(), 3);
    let targets = pipeline.targets().expect("targets");
    for target in targets.iter() {
        let color = target.color_chain().expect("color chain");
        let depth = target.depth_chain().expect("depth chain");
        assert_eq!(pipeline.runtime().commit_count(color), 3);
        assert_eq!(pipeline.runtime().commit_count(depth), 3);
    }
    assert_eq!(pipeline.stats().preview_frames, 3);
}

#[test]
fn preview_predicts_one_frame_behind_the_headset() {
    let mut pipeline = start_with(SimulatedRuntime::new(), with_preview());
    pipeline.runtime_mut().queue_status(SessionStatus::default());
    pipeline.tick();
    pipeline.tick();
    pipeline.tick();

    // The preview runs after the headset frame of the same tick has been
    // submitted, so it asks for the pose of the frame just sent.
    assert_eq!(pipeline.runtime().pose_frame_indices(), vec![-1, 0, 0, 1, 1]);
}

#[test]
fn quit_halts_without_rendering_and_later_ticks_are_inert() {
    let mut pipeline = start_with(SimulatedRuntime::new(), with_preview());
    pipeline.runtime_mut().queue_status(visible());
    pipeline.runtime_mut().queue_status(visible());
    pipeline.runtime_mut().queue_status(SessionStatus {
        should_quit: true,
        ..visible()
    });

    assert!(!pipeline.tick().quit);
    assert!(!pipeline.tick().quit);
    let passes_before_quit = pipeline.scene().passes.len();

    let report = pipeline.tick();
    assert!(report.quit);
    assert_eq!(report.status.map(|status| status.should_quit), Some(true));
    assert!(!report.preview_rendered);
    assert_eq!(pipeline.scene().passes.len(), passes_before_quit);
    assert_eq!(submit_count(&pipeline), 2);

    let status_polls = pipeline
        .runtime()
        .count_calls(|call| matches!(call, RuntimeCall::SessionStatus));
    let after_quit = pipeline.tick();
    assert!(after_quit.quit);
    assert_eq!(after_quit.status, None);
    assert_eq!(
        pipeline
            .runtime()
            .count_calls(|call| matches!(call, RuntimeCall::SessionStatus)),
        status_polls
    );
    assert_eq!(submit_count(&pipeline), 2);
    assert!(pipeline.is_halted());
}

/// `Some(true)` for a color texture attached to `framebuffer`, `Some(false)`
/// for its color attachment being cleared.
fn color_attachment(call: &GraphicsCall, framebuffer: FramebufferId) -> Option<bool> {
    match call {
        GraphicsCall::Attach {
            framebuffer: target,
            attachment: Attachment::Color,
            texture,
        } if *target == framebuffer => Some(texture.is_some()),
        _ => None,
    }
}

#[test]
fn eye_targets_are_acquired_drawn_and_detached_in_order() {
    let mut pipeline = start_with(SimulatedRuntime::new(), headset_only());
    pipeline.graphics_mut().take_calls();
    pipeline.tick();

    let targets = pipeline.targets().expect("targets");
    let calls = pipeline.graphics().calls();
    for eye in Eye::BOTH {
        let framebuffer = targets.get(eye).framebuffer();
        let bound = calls
            .iter()
            .position(|call| *call == GraphicsCall::BindFramebuffer(framebuffer))
            .expect("eye framebuffer bound");
        let attached = calls
            .iter()
            .position(|call| color_attachment(call, framebuffer) == Some(true))
            .expect("color attached");
        let detached = calls
            .iter()
            .position(|call| color_attachment(call, framebuffer) == Some(false))
            .expect("color detached");
        assert!(bound < attached && attached < detached);
    }

    let runtime_calls = pipeline.runtime().calls();
    let submit = runtime_calls
        .iter()
        .position(|call| matches!(call, RuntimeCall::SubmitFrame { .. }))
        .expect("submitted");
    let commits: Vec<_> = runtime_calls
        .iter()
        .enumerate()
        .filter(|(_, call)| matches!(call, RuntimeCall::CommitSwapChain(_)))
        .map(|(index, _)| index)
        .collect();
    assert_eq!(commits.len(), 4);
    assert!(commits.iter().all(|index| *index < submit));
    assert_eq!(
        pipeline.scene().passes,
        vec![
            (Eye::Left, RenderDestination::Headset),
            (Eye::Right, RenderDestination::Headset)
        ]
    );
}

#[test]
fn adapter_mismatch_is_reported_but_rendering_continues() {
    let runtime = SimulatedRuntime::new().with_adapter(AdapterLuid([7; 8]));
    let mut pipeline = start_with(runtime, headset_only());

    let events = pipeline.drain_events();
    assert_eq!(
        events,
        vec![PipelineEvent::AdapterMismatch {
            device: AdapterLuid([7; 8]),
            system: AdapterLuid::default(),
        }]
    );
    assert!(matches!(
        pipeline.tick().headset,
        HeadsetOutcome::Submitted { .. }
    ));
}

#[test]
fn controller_state_is_emitted_each_tick_when_enabled() {
    let mut pipeline = start_with(SimulatedRuntime::new(), PipelineConfig::default());
    let input = InputState {
        buttons: 1,
        thumbstick: [[0.25, -0.5], [0.0, 0.0]],
        ..InputState::default()
    };
    pipeline.runtime_mut().set_input(input);
    pipeline.tick();
    pipeline.tick();

    let ticks: Vec<u64> = pipeline
        .drain_events()
        .into_iter()
        .filter_map(|event| match event {
            PipelineEvent::ControllerState(state) => {
                assert_eq!(state.state, input);
                Some(state.tick)
            }
            _ => None,
        })
        .collect();
    assert_eq!(ticks, vec![1, 2]);
}

#[test]
fn recenter_request_is_honoured() {
    let mut pipeline = start_with(SimulatedRuntime::new(), headset_only());
    pipeline.runtime_mut().queue_status(SessionStatus {
        should_recenter: true,
        ..visible()
    });
    pipeline.tick();

    assert_eq!(pipeline.stats().recenters, 1);
    assert_eq!(
        pipeline
            .runtime()
            .count_calls(|call| matches!(call, RuntimeCall::Recenter)),
        1
    );
}

#[test]
fn pose_failure_still_submits_with_identity_poses() {
    let mut pipeline = start_with(SimulatedRuntime::new(), headset_only());
    pipeline.tick();
    pipeline.runtime_mut().fail_pose_queries(1);

    assert!(matches!(
        pipeline.tick().headset,
        HeadsetOutcome::Submitted { frame_index: 1, .. }
    ));
    assert_eq!(pipeline.stats().pose_query_failures, 1);
    let frame = &pipeline.runtime().submitted_frames()[1];
    assert_eq!(frame.layer.sensor_sample_time, 0.0);
    assert_eq!(frame.layer.render_pose, [hmd_stereo::vr::Pose::IDENTITY; 2]);
}

#[test]
fn startup_failures_map_to_distinct_errors() {
    let result = StereoPipeline::start(
        SimulatedRuntime::new().fail_initialize("service not running"),
        RecordingGraphics::new(),
        RecordingScene::default(),
        headset_only(),
    );
    assert!(matches!(result, Err(VrError::RuntimeInit(_))));

    let result = StereoPipeline::start(
        SimulatedRuntime::new().without_device(),
        RecordingGraphics::new(),
        RecordingScene::default(),
        headset_only(),
    );
    assert!(matches!(
        result,
        Err(VrError::SessionCreate(message)) if message.contains("no device")
    ));

    let result = StereoPipeline::start(
        SimulatedRuntime::new().reject_swap_chains(TextureFormat::D32Float),
        RecordingGraphics::new(),
        RecordingScene::default(),
        headset_only(),
    );
    assert!(matches!(
        result,
        Err(VrError::TextureChainsMissing { eye: Eye::Left })
    ));
}

#[test]
fn shutdown_tears_everything_down_and_halts() {
    let mut pipeline = start_with(SimulatedRuntime::new(), headset_only());
    pipeline.tick();
    pipeline.shutdown();

    assert_eq!(pipeline.runtime().live_swap_chains(), 0);
    assert!(!pipeline.runtime().has_session());
    assert!(pipeline.tick().quit);
}

#[test]
fn dropping_the_pipeline_releases_borrowed_graphics_resources() {
    let mut graphics = RecordingGraphics::new();
    let config = PipelineConfig {
        preview_strategy: PreviewStrategy::Mirror,
        enable_controllers: false,
        ..PipelineConfig::default()
    };
    {
        let started = StereoPipeline::start(
            SimulatedRuntime::new(),
            &mut graphics,
            RecordingScene::default(),
            config,
        );
        let mut pipeline = match started {
            Ok(pipeline) => pipeline,
            Err(err) => panic!("pipeline failed to start: {err}"),
        };
        pipeline.tick();
        // Two eye targets plus the mirror's read framebuffer.
        assert_eq!(pipeline.graphics().live_framebuffers().len(), 3);
    }

    assert!(graphics.live_framebuffers().is_empty());
    assert_eq!(
        graphics.count(|call| matches!(call, GraphicsCall::DeleteFramebuffer(_))),
        3
    );
}

proptest! {
    #[test]
    fn frame_index_counts_accepted_submissions(
        outcomes in prop::collection::vec(any::<bool>(), 1..24)
    ) {
        let mut pipeline = start_with(SimulatedRuntime::new(), headset_only());
        let mut accepted = 0i64;

        for accept in outcomes {
            if !accept {
                pipeline.runtime_mut().fail_submissions(1, RuntimeErrorKind::Other);
            }
            let report = pipeline.tick();
            if accept {
                let submitted = match report.headset {
                    HeadsetOutcome::Submitted { frame_index, .. } => Some(frame_index),
                    _ => None,
                };
                prop_assert_eq!(submitted, Some(accepted));
                accepted += 1;
            } else {
                let expected = HeadsetOutcome::SubmitFailed { frame_index: accepted };
                prop_assert_eq!(report.headset, expected);
            }
            prop_assert_eq!(pipeline.frame_index(), accepted);
        }
    }
}
