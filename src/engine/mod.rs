pub mod config;
pub mod events;
pub mod scene;
pub mod schedule;
pub mod stats;
pub mod status;

use self::config::{PipelineConfig, PreviewStrategy};
use self::events::{EventQueue, PipelineEvent};
use self::scene::{EyePass, RenderDestination, SceneRenderer};
use self::stats::PipelineStats;
use self::status::{StatusHandler, TickControl};
use crate::render::{EyeTargetPool, FramebufferId, GraphicsContext, MirrorSurface, Rect};
use crate::vr::{
    AdapterAffinity, DeviceSession, Eye, EyeFovDepthLayer, EyeRenderDesc, HmdDescription,
    HmdRuntime, PoseResolver, RuntimeErrorKind, SessionStatus, SubmitOutcome,
    TimewarpProjectionDesc, VrError, VrResult,
};
use glam::Vec3;

const EYE_SAMPLE_COUNT: u32 = 1;

impl RenderDestination {
    /// Frame index to predict poses for. The preview lags one submitted frame
    /// and must not consume the pose the headset frame will use.
    pub fn pose_frame_index(self, current: i64) -> i64 {
        match self {
            RenderDestination::Headset => current,
            RenderDestination::PreviewWindow => current - 1,
        }
    }
}

/// What happened to the headset frame during a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadsetOutcome {
    /// Not visible this tick, or the pipeline has halted.
    Skipped,
    Submitted {
        frame_index: i64,
        outcome: SubmitOutcome,
    },
    /// The compositor rejected the frame; retried on the next tick.
    SubmitFailed { frame_index: i64 },
    /// An eye target could not be acquired or committed.
    TargetFailed,
    SessionEnded,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickReport {
    pub status: Option<SessionStatus>,
    pub headset: HeadsetOutcome,
    pub preview_rendered: bool,
    pub quit: bool,
}

impl TickReport {
    fn halted() -> Self {
        Self {
            status: None,
            headset: HeadsetOutcome::Skipped,
            preview_rendered: false,
            quit: true,
        }
    }
}

/// Drives one HMD session: per tick it polls status, renders both eyes into
/// the compositor's swap chains, submits the layer, and optionally previews
/// the scene in the window.
pub struct StereoPipeline<R: HmdRuntime, G: GraphicsContext, S: SceneRenderer> {
    config: PipelineConfig,
    session: DeviceSession<R>,
    graphics: G,
    scene: S,
    targets: Option<EyeTargetPool>,
    mirror: Option<MirrorSurface>,
    description: HmdDescription,
    resolver: PoseResolver,
    status_handler: StatusHandler,
    events: EventQueue,
    stats: PipelineStats,
    frame_index: i64,
    window_size: [u32; 2],
    halted: bool,
}

impl<R: HmdRuntime, G: GraphicsContext, S: SceneRenderer> StereoPipeline<R, G, S> {
    /// Opens the session, allocates eye targets and initializes the scene.
    ///
    /// Anything created before a failure is torn down again before the error
    /// is returned.
    pub fn start(runtime: R, mut graphics: G, scene: S, config: PipelineConfig) -> VrResult<Self> {
        let mut session = DeviceSession::new(runtime);
        let mut events = EventQueue::default();

        let description = match open_session(&mut session, &graphics, &mut events) {
            Ok(description) => description,
            Err(err) => {
                log::error!("[pipeline] failed to open device session: {err}");
                session.shutdown();
                return Err(err);
            }
        };

        graphics.enable_scene_state();
        let targets = match create_targets(&mut session, &mut graphics, &description, &config) {
            Ok(targets) => targets,
            Err(err) => {
                log::error!("[pipeline] failed to create eye targets: {err}");
                session.shutdown();
                return Err(err);
            }
        };

        let resolver = PoseResolver::new(config.body_yaw, Vec3::from(config.initial_body_position));
        let status_handler = StatusHandler::new(config.enable_controllers, config.controller_type);
        let window_size = description.resolution;

        let mut pipeline = Self {
            config,
            session,
            graphics,
            scene,
            targets: Some(targets),
            mirror: None,
            description,
            resolver,
            status_handler,
            events,
            stats: PipelineStats::default(),
            frame_index: 0,
            window_size,
            halted: false,
        };

        if pipeline.config.show_preview_window
            && pipeline.config.preview_strategy == PreviewStrategy::Mirror
        {
            let mirror =
                MirrorSurface::create(&mut pipeline.session, &mut pipeline.graphics, window_size);
            match mirror {
                Ok(mirror) => pipeline.mirror = Some(mirror),
                Err(err) => log::warn!(
                    "[pipeline] mirror texture unavailable ({err}); previewing side by side"
                ),
            }
        }

        // The compositor paces frames.
        pipeline.graphics.set_swap_interval(0);

        if let Err(err) = pipeline
            .session
            .set_tracking_origin(pipeline.config.tracking_origin)
        {
            log::error!("[pipeline] failed to set tracking origin: {err}");
            pipeline.shutdown();
            return Err(err);
        }

        pipeline.scene.initialize_scene(&mut pipeline.graphics);
        log::info!(
            "[pipeline] started on {} ({:?}), preview {}",
            pipeline.description.product_name,
            pipeline.description.resolution,
            if pipeline.config.show_preview_window { "on" } else { "off" }
        );
        Ok(pipeline)
    }

    /// Runs one full pipeline pass. After a quit every further call is a
    /// no-op reporting `quit`.
    pub fn tick(&mut self) -> TickReport {
        if self.halted {
            return TickReport::halted();
        }

        self.stats.ticks += 1;
        let tick = self.stats.ticks;
        let status = match self.status_handler.poll(
            &mut self.session,
            tick,
            &mut self.events,
            &mut self.stats,
        ) {
            TickControl::Quit(status) => {
                self.halted = true;
                return TickReport {
                    status: Some(status),
                    ..TickReport::halted()
                };
            }
            TickControl::Proceed(status) => status,
        };

        let headset = if status.is_visible {
            self.scene.update_scene(&status);
            self.render_headset(&status)
        } else {
            self.stats.skipped_invisible_ticks += 1;
            log::trace!("[pipeline] tick {tick} not visible; headset frame skipped");
            HeadsetOutcome::Skipped
        };

        if headset == HeadsetOutcome::SessionEnded {
            self.halted = true;
            return TickReport {
                status: Some(status),
                headset,
                preview_rendered: false,
                quit: true,
            };
        }

        let preview_rendered = self.config.show_preview_window && self.render_preview(&status);

        TickReport {
            status: Some(status),
            headset,
            preview_rendered,
            quit: false,
        }
    }

    fn eye_render_descs(&self) -> Option<[EyeRenderDesc; 2]> {
        match self.session.eye_render_descs(&self.description.default_eye_fov) {
            Ok(descs) => Some(descs),
            Err(err) => {
                log::warn!("[pipeline] eye render description unavailable: {err}");
                None
            }
        }
    }

    fn render_headset(&mut self, status: &SessionStatus) -> HeadsetOutcome {
        let Some(render_descs) = self.eye_render_descs() else {
            return HeadsetOutcome::TargetFailed;
        };
        let hmd_to_eye = render_descs.map(|desc| desc.hmd_to_eye_pose);
        let frame_index = RenderDestination::Headset.pose_frame_index(self.frame_index);
        let resolved = self
            .resolver
            .resolve_poses(&mut self.session, frame_index, &hmd_to_eye);
        if resolved.fallback {
            self.stats.pose_query_failures += 1;
        }

        let Some(targets) = self.targets.as_mut() else {
            return HeadsetOutcome::TargetFailed;
        };

        let mut projection_desc = TimewarpProjectionDesc::default();
        for eye in Eye::BOTH {
            let index = eye.index();
            let target = targets.get_mut(eye);
            if let Err(err) = target.acquire_and_clear(&self.session, &mut self.graphics) {
                log::error!("[pipeline] {eye:?} eye target unavailable: {err}");
                self.stats.target_failures += 1;
                return HeadsetOutcome::TargetFailed;
            }

            let fov = render_descs[index].fov;
            let transforms = self
                .resolver
                .compute_transforms(&resolved.poses.poses[index], &fov);
            projection_desc = TimewarpProjectionDesc::from_projection(&transforms.projection);

            self.scene.draw_eye(
                &mut self.graphics,
                &EyePass {
                    status: *status,
                    eye,
                    view: transforms.view,
                    projection: transforms.projection,
                    destination: RenderDestination::Headset,
                    viewport: Rect::from_size(target.size()),
                },
            );

            let finished = target
                .detach(&mut self.graphics)
                .and_then(|()| target.commit(&mut self.session));
            if let Err(err) = finished {
                log::error!("[pipeline] {eye:?} eye target commit failed: {err}");
                self.stats.target_failures += 1;
                return HeadsetOutcome::TargetFailed;
            }
        }

        let color = Eye::BOTH.map(|eye| targets.get(eye).color_chain());
        let depth = Eye::BOTH.map(|eye| targets.get(eye).depth_chain());
        let ([Some(left_color), Some(right_color)], [Some(left_depth), Some(right_depth)]) =
            (color, depth)
        else {
            return HeadsetOutcome::TargetFailed;
        };

        let layer = EyeFovDepthLayer {
            texture_origin_at_bottom_left: true,
            color: [left_color, right_color],
            depth: [left_depth, right_depth],
            viewport: Eye::BOTH.map(|eye| Rect::from_size(targets.get(eye).size())),
            fov: render_descs.map(|desc| desc.fov),
            render_pose: resolved.poses.poses,
            sensor_sample_time: resolved.poses.sensor_sample_time,
            projection_desc,
        };

        let submitted_index = self.frame_index;
        match self.session.submit_frame(submitted_index, &layer) {
            Ok(outcome) => {
                self.frame_index += 1;
                self.stats.headset_frames_submitted += 1;
                if outcome == SubmitOutcome::NotVisible {
                    self.stats.not_visible_submissions += 1;
                }
                log::trace!("[pipeline] submitted frame {submitted_index} ({outcome:?})");
                HeadsetOutcome::Submitted {
                    frame_index: submitted_index,
                    outcome,
                }
            }
            Err(VrError::Runtime(err)) if err.kind == RuntimeErrorKind::SessionEnded => {
                log::warn!(
                    "[pipeline] session ended during submit of frame {submitted_index}: {err}"
                );
                self.events.push(PipelineEvent::SessionEnded);
                HeadsetOutcome::SessionEnded
            }
            Err(err) => {
                self.stats.submission_failures += 1;
                let transient = match &err {
                    VrError::Runtime(runtime_err) => runtime_err.is_retryable(),
                    _ => false,
                };
                if transient {
                    log::warn!(
                        "[pipeline] submit of frame {submitted_index} failed: {err}; retrying"
                    );
                } else {
                    log::error!(
                        "[pipeline] submit of frame {submitted_index} failed: {err}; \
                         not expected to recover, retrying next tick"
                    );
                }
                HeadsetOutcome::SubmitFailed {
                    frame_index: submitted_index,
                }
            }
        }
    }

    /// Draws the preview into the window's default framebuffer. Never touches
    /// eye targets or the frame index.
    fn render_preview(&mut self, status: &SessionStatus) -> bool {
        self.graphics.make_current();
        if let Some(mirror) = &self.mirror {
            mirror.blit(&mut self.graphics);
            self.graphics.done_current();
            self.stats.preview_frames += 1;
            return true;
        }

        let Some(render_descs) = self.eye_render_descs() else {
            self.graphics.done_current();
            return false;
        };

        self.graphics.bind_framebuffer(FramebufferId::WINDOW);
        self.graphics.clear();

        let hmd_to_eye = render_descs.map(|desc| desc.hmd_to_eye_pose);
        let frame_index = RenderDestination::PreviewWindow.pose_frame_index(self.frame_index);
        let resolved = self
            .resolver
            .resolve_poses(&mut self.session, frame_index, &hmd_to_eye);
        if resolved.fallback {
            self.stats.pose_query_failures += 1;
        }

        let half_width = (self.window_size[0] / 2) as i32;
        let height = self.window_size[1] as i32;
        for eye in Eye::BOTH {
            let index = eye.index();
            let viewport = Rect::new(index as i32 * half_width, 0, half_width, height);
            self.graphics.set_viewport(viewport);

            let transforms = self
                .resolver
                .compute_transforms(&resolved.poses.poses[index], &render_descs[index].fov);
            self.scene.draw_eye(
                &mut self.graphics,
                &EyePass {
                    status: *status,
                    eye,
                    view: transforms.view,
                    projection: transforms.projection,
                    destination: RenderDestination::PreviewWindow,
                    viewport,
                },
            );
        }

        self.graphics.done_current();
        self.stats.preview_frames += 1;
        true
    }

    /// Updates the preview window size and resets the window viewport.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.window_size = [width, height];
        self.graphics
            .set_viewport(Rect::new(0, 0, width as i32, height as i32));
    }

    pub fn drain_events(&mut self) -> Vec<PipelineEvent> {
        self.events.drain()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn frame_index(&self) -> i64 {
        self.frame_index
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn hmd_description(&self) -> &HmdDescription {
        &self.description
    }

    pub fn initial_body_position(&self) -> Vec3 {
        self.resolver.body_position()
    }

    pub fn window_size(&self) -> [u32; 2] {
        self.window_size
    }

    pub fn targets(&self) -> Option<&EyeTargetPool> {
        self.targets.as_ref()
    }

    pub fn session(&self) -> &DeviceSession<R> {
        &self.session
    }

    pub fn runtime(&self) -> &R {
        self.session.runtime()
    }

    pub fn runtime_mut(&mut self) -> &mut R {
        self.session.runtime_mut()
    }

    pub fn graphics(&self) -> &G {
        &self.graphics
    }

    pub fn graphics_mut(&mut self) -> &mut G {
        &mut self.graphics
    }

    pub fn scene(&self) -> &S {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut S {
        &mut self.scene
    }

    /// Releases eye targets and the mirror, then closes the session and the
    /// runtime. Safe to call more than once; also run on drop.
    pub fn shutdown(&mut self) {
        self.halted = true;
        if let Some(mut targets) = self.targets.take() {
            targets.release(&mut self.session, &mut self.graphics);
        }
        if let Some(mut mirror) = self.mirror.take() {
            mirror.release(&mut self.session, &mut self.graphics);
        }
        self.session.shutdown();
    }
}

impl<R: HmdRuntime, G: GraphicsContext, S: SceneRenderer> Drop for StereoPipeline<R, G, S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn open_session<R: HmdRuntime>(
    session: &mut DeviceSession<R>,
    graphics: &dyn GraphicsContext,
    events: &mut EventQueue,
) -> VrResult<HmdDescription> {
    session.initialize()?;
    session.create_session()?;

    if let AdapterAffinity::Mismatch { device, system } =
        session.check_adapter_affinity(graphics.default_adapter_luid())?
    {
        events.push(PipelineEvent::AdapterMismatch { device, system });
    }

    session.query_display_description()
}

fn create_targets<R: HmdRuntime>(
    session: &mut DeviceSession<R>,
    graphics: &mut dyn GraphicsContext,
    description: &HmdDescription,
    config: &PipelineConfig,
) -> VrResult<EyeTargetPool> {
    let mut sizes = [[0; 2]; 2];
    for eye in Eye::BOTH {
        sizes[eye.index()] = session.ideal_texture_size(
            eye,
            description.default_eye_fov[eye.index()],
            config.pixels_per_display_pixel,
        )?;
    }
    EyeTargetPool::create(session, graphics, sizes, EYE_SAMPLE_COUNT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{GraphicsCall, RecordingGraphics};
    use crate::vr::{RuntimeCall, SimulatedRuntime};

    #[derive(Default)]
    struct CountingScene {
        initialized: u32,
        updates: u32,
        passes: Vec<(Eye, RenderDestination, Rect)>,
    }

    impl SceneRenderer for CountingScene {
        fn initialize_scene(&mut self, _gfx: &mut dyn GraphicsContext) {
            self.initialized += 1;
        }

        fn update_scene(&mut self, _status: &SessionStatus) {
            self.updates += 1;
        }

        fn draw_eye(&mut self, _gfx: &mut dyn GraphicsContext, pass: &EyePass) {
            self.passes.push((pass.eye, pass.destination, pass.viewport));
        }
    }

    type TestPipeline = StereoPipeline<SimulatedRuntime, RecordingGraphics, CountingScene>;

    fn start(runtime: SimulatedRuntime, config: PipelineConfig) -> TestPipeline {
        StereoPipeline::start(runtime, RecordingGraphics::new(), CountingScene::default(), config)
            .map_err(|err| err.to_string())
            .expect("pipeline should start")
    }

    fn headset_only() -> PipelineConfig {
        PipelineConfig {
            show_preview_window: false,
            enable_controllers: false,
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn preview_lags_headset_by_one_frame() {
        assert_eq!(RenderDestination::Headset.pose_frame_index(5), 5);
        assert_eq!(RenderDestination::PreviewWindow.pose_frame_index(5), 4);
        assert_eq!(RenderDestination::PreviewWindow.pose_frame_index(0), -1);
    }

    #[test]
    fn start_initializes_scene_once_after_targets() {
        let pipeline = start(SimulatedRuntime::new(), headset_only());
        assert_eq!(pipeline.scene().initialized, 1);
        assert!(pipeline.targets().is_some());
        assert_eq!(pipeline.window_size(), [2160, 1200]);
        assert_eq!(pipeline.initial_body_position(), Vec3::new(0.0, 0.0, -5.0));

        let calls = pipeline.graphics().calls();
        assert!(calls.contains(&GraphicsCall::EnableSceneState));
        assert!(calls.contains(&GraphicsCall::SetSwapInterval(0)));
        assert!(pipeline
            .runtime()
            .calls()
            .contains(&RuntimeCall::SetTrackingOrigin(crate::vr::TrackingOrigin::FloorLevel)));
    }

    #[test]
    fn headset_frame_draws_both_eyes_at_target_size() {
        let mut pipeline = start(SimulatedRuntime::new(), headset_only());
        let report = pipeline.tick();

        assert_eq!(
            report.headset,
            HeadsetOutcome::Submitted {
                frame_index: 0,
                outcome: SubmitOutcome::Presented
            }
        );
        assert_eq!(pipeline.frame_index(), 1);
        assert_eq!(pipeline.scene().updates, 1);

        let targets = pipeline.targets().expect("targets");
        let passes = &pipeline.scene().passes;
        assert_eq!(passes.len(), 2);
        for (pass, eye) in passes.iter().zip(Eye::BOTH) {
            assert_eq!(pass.0, eye);
            assert_eq!(pass.1, RenderDestination::Headset);
            assert_eq!(pass.2, Rect::from_size(targets.get(eye).size()));
        }

        let frame = &pipeline.runtime().submitted_frames()[0];
        assert!(frame.layer.texture_origin_at_bottom_left);
        assert_eq!(frame.layer.viewport[1], Rect::from_size(targets.get(Eye::Right).size()));
        assert_eq!(frame.layer.projection_desc.projection32, -1.0);
    }

    #[test]
    fn not_visible_submission_still_advances() {
        let mut runtime = SimulatedRuntime::new();
        runtime.set_submit_outcome(SubmitOutcome::NotVisible);
        let mut pipeline = start(runtime, headset_only());

        pipeline.tick();
        assert_eq!(pipeline.frame_index(), 1);
        assert_eq!(pipeline.stats().not_visible_submissions, 1);
    }

    #[test]
    fn session_end_on_submit_halts_pipeline() {
        let mut pipeline = start(SimulatedRuntime::new(), PipelineConfig::default());
        pipeline
            .runtime_mut()
            .fail_submissions(1, RuntimeErrorKind::SessionEnded);

        let report = pipeline.tick();
        assert!(report.quit);
        assert_eq!(report.headset, HeadsetOutcome::SessionEnded);
        assert!(!report.preview_rendered);
        assert_eq!(pipeline.frame_index(), 0);
        assert!(pipeline.drain_events().contains(&PipelineEvent::SessionEnded));

        let after = pipeline.tick();
        assert!(after.quit);
        assert_eq!(pipeline.stats().ticks, 1);
    }

    #[test]
    fn unrecoverable_submit_error_is_retried_not_quit() {
        let mut pipeline = start(SimulatedRuntime::new(), headset_only());
        pipeline
            .runtime_mut()
            .fail_submissions(1, RuntimeErrorKind::NoDevice);

        let report = pipeline.tick();
        assert!(!report.quit);
        assert_eq!(report.headset, HeadsetOutcome::SubmitFailed { frame_index: 0 });
        assert!(!pipeline.is_halted());

        assert!(matches!(
            pipeline.tick().headset,
            HeadsetOutcome::Submitted { frame_index: 0, .. }
        ));
        assert_eq!(pipeline.stats().submission_failures, 1);
    }

    #[test]
    fn mirror_strategy_blits_instead_of_rerendering() {
        let config = PipelineConfig {
            preview_strategy: PreviewStrategy::Mirror,
            enable_controllers: false,
            ..PipelineConfig::default()
        };
        let mut pipeline = start(SimulatedRuntime::new(), config);
        pipeline.graphics_mut().take_calls();

        let report = pipeline.tick();
        assert!(report.preview_rendered);
        assert_eq!(pipeline.scene().passes.len(), 2);
        assert!(pipeline
            .scene()
            .passes
            .iter()
            .all(|pass| pass.1 == RenderDestination::Headset));
        assert_eq!(
            pipeline
                .graphics()
                .count(|call| matches!(call, GraphicsCall::Blit { .. })),
            1
        );
    }

    #[test]
    fn unavailable_mirror_falls_back_to_side_by_side() {
        let config = PipelineConfig {
            preview_strategy: PreviewStrategy::Mirror,
            enable_controllers: false,
            ..PipelineConfig::default()
        };
        let mut pipeline = start(SimulatedRuntime::new().reject_mirror_textures(), config);

        pipeline.tick();
        let preview_passes = pipeline
            .scene()
            .passes
            .iter()
            .filter(|pass| pass.1 == RenderDestination::PreviewWindow)
            .count();
        assert_eq!(preview_passes, 2);
    }

    #[test]
    fn resize_changes_preview_viewports() {
        let config = PipelineConfig {
            enable_controllers: false,
            ..PipelineConfig::default()
        };
        let mut pipeline = start(SimulatedRuntime::new(), config);
        pipeline.resize(800, 600);
        pipeline.tick();

        let preview: Vec<Rect> = pipeline
            .scene()
            .passes
            .iter()
            .filter(|pass| pass.1 == RenderDestination::PreviewWindow)
            .map(|pass| pass.2)
            .collect();
        assert_eq!(preview, vec![Rect::new(0, 0, 400, 600), Rect::new(400, 0, 400, 600)]);
    }

    #[test]
    fn shutdown_releases_in_reverse_order() {
        let mut pipeline = start(SimulatedRuntime::new(), headset_only());
        pipeline.tick();
        pipeline.shutdown();
        pipeline.shutdown();

        let runtime = pipeline.runtime();
        assert_eq!(runtime.live_swap_chains(), 0);
        assert!(!runtime.has_session());
        assert!(!runtime.is_initialized());

        let calls = runtime.calls();
        let last_chain = calls
            .iter()
            .rposition(|call| matches!(call, RuntimeCall::DestroySwapChain(_)))
            .expect("chains destroyed");
        let destroy = calls
            .iter()
            .position(|call| matches!(call, RuntimeCall::DestroySession))
            .expect("session destroyed");
        assert!(last_chain < destroy);
        assert_eq!(calls.last(), Some(&RuntimeCall::Shutdown));
        assert!(pipeline.graphics().live_framebuffers().is_empty());
    }
}
