use super::{
    AdapterLuid, ControllerType, Eye, EyeFovDepthLayer, EyePoses, EyeRenderDesc, FovPort,
    HmdDescription, HmdRuntime, InputState, MirrorTextureDesc, MirrorTextureHandle, Pose,
    RuntimeError, RuntimeErrorKind, RuntimeResult, SessionHandle, SessionStatus, SubmitOutcome,
    SwapChainDesc, SwapChainHandle, TextureFormat, TrackingOrigin,
};
use crate::render::TextureId;
use glam::{Quat, Vec3};
use std::collections::{HashMap, VecDeque};

const SWAP_CHAIN_LENGTH: usize = 3;
const INTERPUPILLARY_DISTANCE: f32 = 0.064;
const STANDING_EYE_HEIGHT: f32 = 1.6;
const YAW_PER_FRAME: f32 = 0.01;
const DISPLAY_RATE_HZ: f64 = 90.0;

/// A runtime call that mutates state, as observed by [`SimulatedRuntime`].
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeCall {
    Initialize,
    Shutdown,
    CreateSession,
    DestroySession,
    SetTrackingOrigin(TrackingOrigin),
    Recenter,
    SessionStatus,
    EyePoses { frame_index: i64 },
    CreateSwapChain(TextureFormat),
    CommitSwapChain(SwapChainHandle),
    DestroySwapChain(SwapChainHandle),
    CreateMirrorTexture,
    DestroyMirrorTexture(MirrorTextureHandle),
    SubmitFrame { frame_index: i64 },
    InputState(ControllerType),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubmittedFrame {
    pub frame_index: i64,
    pub layer: EyeFovDepthLayer,
}

struct SimSwapChain {
    desc: SwapChainDesc,
    textures: Vec<TextureId>,
    current: usize,
    commits: u64,
    committed_since_submit: bool,
}

/// In-process stand-in for an HMD runtime.
///
/// Produces deterministic head poses (a slow yaw sweep keyed by frame index),
/// keeps real swap-chain rings, and lets callers script failures. Every
/// mutating call is journaled so tests can assert ordering.
pub struct SimulatedRuntime {
    description: HmdDescription,
    adapter: AdapterLuid,
    initialized: bool,
    session: Option<SessionHandle>,
    next_handle: u64,
    next_texture: u32,
    tracking_origin: TrackingOrigin,
    swap_chains: HashMap<SwapChainHandle, SimSwapChain>,
    mirrors: HashMap<MirrorTextureHandle, TextureId>,
    status: SessionStatus,
    queued_statuses: VecDeque<SessionStatus>,
    submit_outcome: SubmitOutcome,
    init_failure: Option<String>,
    device_attached: bool,
    rejected_formats: Vec<TextureFormat>,
    reject_mirrors: bool,
    submit_failures: VecDeque<RuntimeError>,
    pose_failures: u32,
    input_failures: u32,
    status_failures: u32,
    input: InputState,
    calls: Vec<RuntimeCall>,
    submitted: Vec<SubmittedFrame>,
}

impl SimulatedRuntime {
    pub fn new() -> Self {
        let left_fov = FovPort {
            up_tan: 1.33,
            down_tan: 1.33,
            left_tan: 1.06,
            right_tan: 1.09,
        };
        let right_fov = FovPort {
            left_tan: left_fov.right_tan,
            right_tan: left_fov.left_tan,
            ..left_fov
        };

        Self {
            description: HmdDescription {
                product_name: "Simulated HMD".into(),
                resolution: [2160, 1200],
                default_eye_fov: [left_fov, right_fov],
            },
            adapter: AdapterLuid::default(),
            initialized: false,
            session: None,
            next_handle: 1,
            next_texture: 100,
            tracking_origin: TrackingOrigin::EyeLevel,
            swap_chains: HashMap::new(),
            mirrors: HashMap::new(),
            status: SessionStatus {
                is_visible: true,
                hmd_present: true,
                hmd_mounted: true,
                ..SessionStatus::default()
            },
            queued_statuses: VecDeque::new(),
            submit_outcome: SubmitOutcome::Presented,
            init_failure: None,
            device_attached: true,
            rejected_formats: Vec::new(),
            reject_mirrors: false,
            submit_failures: VecDeque::new(),
            pose_failures: 0,
            input_failures: 0,
            status_failures: 0,
            input: InputState::default(),
            calls: Vec::new(),
            submitted: Vec::new(),
        }
    }

    pub fn with_resolution(mut self, resolution: [u32; 2]) -> Self {
        self.description.resolution = resolution;
        self
    }

    pub fn with_default_fov(mut self, fov: [FovPort; 2]) -> Self {
        self.description.default_eye_fov = fov;
        self
    }

    pub fn with_adapter(mut self, adapter: AdapterLuid) -> Self {
        self.adapter = adapter;
        self
    }

    pub fn fail_initialize(mut self, message: impl Into<String>) -> Self {
        self.init_failure = Some(message.into());
        self
    }

    pub fn without_device(mut self) -> Self {
        self.device_attached = false;
        self
    }

    pub fn reject_swap_chains(mut self, format: TextureFormat) -> Self {
        self.rejected_formats.push(format);
        self
    }

    pub fn reject_mirror_textures(mut self) -> Self {
        self.reject_mirrors = true;
        self
    }

    /// Status reported whenever no queued status is pending.
    pub fn set_status(&mut self, status: SessionStatus) {
        self.status = status;
    }

    /// Status reported by the next poll only.
    pub fn queue_status(&mut self, status: SessionStatus) {
        self.queued_statuses.push_back(status);
    }

    pub fn set_submit_outcome(&mut self, outcome: SubmitOutcome) {
        self.submit_outcome = outcome;
    }

    pub fn fail_submissions(&mut self, count: usize, kind: RuntimeErrorKind) {
        for _ in 0..count {
            self.submit_failures
                .push_back(RuntimeError::new(kind, "simulated submission failure"));
        }
    }

    pub fn fail_pose_queries(&mut self, count: u32) {
        self.pose_failures += count;
    }

    pub fn fail_input_queries(&mut self, count: u32) {
        self.input_failures += count;
    }

    pub fn fail_status_queries(&mut self, count: u32) {
        self.status_failures += count;
    }

    pub fn set_input(&mut self, input: InputState) {
        self.input = input;
    }

    pub fn calls(&self) -> &[RuntimeCall] {
        &self.calls
    }

    pub fn count_calls(&self, predicate: impl Fn(&RuntimeCall) -> bool) -> usize {
        self.calls.iter().filter(|call| predicate(call)).count()
    }

    pub fn submitted_frames(&self) -> &[SubmittedFrame] {
        &self.submitted
    }

    pub fn pose_frame_indices(&self) -> Vec<i64> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                RuntimeCall::EyePoses { frame_index } => Some(*frame_index),
                _ => None,
            })
            .collect()
    }

    pub fn commit_count(&self, chain: SwapChainHandle) -> u64 {
        self.swap_chains
            .get(&chain)
            .map(|chain| chain.commits)
            .unwrap_or_default()
    }

    pub fn swap_chain_desc(&self, chain: SwapChainHandle) -> Option<SwapChainDesc> {
        self.swap_chains.get(&chain).map(|chain| chain.desc)
    }

    pub fn live_swap_chains(&self) -> usize {
        self.swap_chains.len()
    }

    pub fn live_mirror_textures(&self) -> usize {
        self.mirrors.len()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    fn allocate_handle(&mut self) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }

    fn allocate_texture(&mut self) -> TextureId {
        let texture = TextureId(self.next_texture);
        self.next_texture += 1;
        texture
    }

    fn check_session(&self, session: SessionHandle) -> RuntimeResult<()> {
        match self.session {
            Some(active) if active == session => Ok(()),
            _ => Err(RuntimeError::new(
                RuntimeErrorKind::InvalidParameter,
                format!("unknown session {:?}", session),
            )),
        }
    }

    fn chain(&self, chain: SwapChainHandle) -> RuntimeResult<&SimSwapChain> {
        self.swap_chains.get(&chain).ok_or_else(|| {
            RuntimeError::new(
                RuntimeErrorKind::InvalidParameter,
                format!("unknown swap chain {:?}", chain),
            )
        })
    }

    fn head_pose(&self, frame_index: i64) -> Pose {
        let height = match self.tracking_origin {
            TrackingOrigin::FloorLevel => STANDING_EYE_HEIGHT,
            TrackingOrigin::EyeLevel => 0.0,
        };
        Pose::new(
            Quat::from_rotation_y(frame_index as f32 * YAW_PER_FRAME),
            Vec3::new(0.0, height, 0.0),
        )
    }
}

impl Default for SimulatedRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl HmdRuntime for SimulatedRuntime {
    fn label(&self) -> &'static str {
        "Simulated Runtime"
    }

    fn initialize(&mut self) -> RuntimeResult<()> {
        self.calls.push(RuntimeCall::Initialize);
        if let Some(message) = &self.init_failure {
            return Err(RuntimeError::new(RuntimeErrorKind::Unavailable, message.clone()));
        }
        self.initialized = true;
        Ok(())
    }

    fn shutdown(&mut self) {
        self.calls.push(RuntimeCall::Shutdown);
        self.initialized = false;
    }

    fn create_session(&mut self) -> RuntimeResult<(SessionHandle, AdapterLuid)> {
        self.calls.push(RuntimeCall::CreateSession);
        if !self.initialized {
            return Err(RuntimeError::new(
                RuntimeErrorKind::Unavailable,
                "runtime not initialized",
            ));
        }
        if !self.device_attached {
            return Err(RuntimeError::new(
                RuntimeErrorKind::NoDevice,
                "no HMD attached",
            ));
        }
        let session = SessionHandle(self.allocate_handle());
        self.session = Some(session);
        Ok((session, self.adapter))
    }

    fn destroy_session(&mut self, session: SessionHandle) {
        self.calls.push(RuntimeCall::DestroySession);
        if self.session == Some(session) {
            self.session = None;
        }
    }

    fn hmd_description(&self, _session: SessionHandle) -> HmdDescription {
        self.description.clone()
    }

    fn fov_texture_size(
        &self,
        _session: SessionHandle,
        _eye: Eye,
        fov: FovPort,
        pixels_per_display_pixel: f32,
    ) -> [u32; 2] {
        // Approximation: half the panel per eye at tan 1.0, scaled by the FOV extent.
        let [width, height] = self.description.resolution;
        let horizontal = (fov.left_tan + fov.right_tan) * 0.5;
        let vertical = (fov.up_tan + fov.down_tan) * 0.5;
        [
            (width as f32 * 0.5 * horizontal * pixels_per_display_pixel).ceil() as u32,
            (height as f32 * vertical * pixels_per_display_pixel).ceil() as u32,
        ]
    }

    fn render_desc(&self, _session: SessionHandle, eye: Eye, fov: FovPort) -> EyeRenderDesc {
        let half_ipd = INTERPUPILLARY_DISTANCE * 0.5;
        let offset = match eye {
            Eye::Left => -half_ipd,
            Eye::Right => half_ipd,
        };
        EyeRenderDesc {
            eye,
            fov,
            hmd_to_eye_pose: Pose::new(Quat::IDENTITY, Vec3::new(offset, 0.0, 0.0)),
        }
    }

    fn set_tracking_origin(
        &mut self,
        session: SessionHandle,
        origin: TrackingOrigin,
    ) -> RuntimeResult<()> {
        self.calls.push(RuntimeCall::SetTrackingOrigin(origin));
        self.check_session(session)?;
        self.tracking_origin = origin;
        Ok(())
    }

    fn recenter_tracking_origin(&mut self, session: SessionHandle) -> RuntimeResult<()> {
        self.calls.push(RuntimeCall::Recenter);
        self.check_session(session)
    }

    fn session_status(&mut self, session: SessionHandle) -> RuntimeResult<SessionStatus> {
        self.calls.push(RuntimeCall::SessionStatus);
        self.check_session(session)?;
        if self.status_failures > 0 {
            self.status_failures -= 1;
            return Err(RuntimeError::new(
                RuntimeErrorKind::Other,
                "simulated status failure",
            ));
        }
        Ok(self.queued_statuses.pop_front().unwrap_or(self.status))
    }

    fn eye_poses(
        &mut self,
        session: SessionHandle,
        frame_index: i64,
        _latency_marker: bool,
        hmd_to_eye: &[Pose; 2],
    ) -> RuntimeResult<EyePoses> {
        self.calls.push(RuntimeCall::EyePoses { frame_index });
        self.check_session(session)?;
        if self.pose_failures > 0 {
            self.pose_failures -= 1;
            return Err(RuntimeError::new(
                RuntimeErrorKind::Other,
                "simulated tracking failure",
            ));
        }

        let head = self.head_pose(frame_index);
        Ok(EyePoses {
            poses: [head.compose(&hmd_to_eye[0]), head.compose(&hmd_to_eye[1])],
            sensor_sample_time: frame_index as f64 / DISPLAY_RATE_HZ,
        })
    }

    fn create_swap_chain(
        &mut self,
        session: SessionHandle,
        desc: &SwapChainDesc,
    ) -> RuntimeResult<SwapChainHandle> {
        self.calls.push(RuntimeCall::CreateSwapChain(desc.format));
        self.check_session(session)?;
        if self.rejected_formats.contains(&desc.format) {
            return Err(RuntimeError::new(
                RuntimeErrorKind::InvalidParameter,
                format!("{:?} swap chains are not supported", desc.format),
            ));
        }

        let handle = SwapChainHandle(self.allocate_handle());
        let textures = (0..SWAP_CHAIN_LENGTH)
            .map(|_| self.allocate_texture())
            .collect();
        self.swap_chains.insert(
            handle,
            SimSwapChain {
                desc: *desc,
                textures,
                current: 0,
                commits: 0,
                committed_since_submit: false,
            },
        );
        Ok(handle)
    }

    fn swap_chain_length(
        &self,
        session: SessionHandle,
        chain: SwapChainHandle,
    ) -> RuntimeResult<usize> {
        self.check_session(session)?;
        Ok(self.chain(chain)?.textures.len())
    }

    fn swap_chain_current_index(
        &self,
        session: SessionHandle,
        chain: SwapChainHandle,
    ) -> RuntimeResult<usize> {
        self.check_session(session)?;
        Ok(self.chain(chain)?.current)
    }

    fn swap_chain_texture(
        &self,
        session: SessionHandle,
        chain: SwapChainHandle,
        index: usize,
    ) -> RuntimeResult<TextureId> {
        self.check_session(session)?;
        self.chain(chain)?
            .textures
            .get(index)
            .copied()
            .ok_or_else(|| {
                RuntimeError::new(
                    RuntimeErrorKind::InvalidParameter,
                    format!("swap chain index {index} out of range"),
                )
            })
    }

    fn commit_swap_chain(
        &mut self,
        session: SessionHandle,
        chain: SwapChainHandle,
    ) -> RuntimeResult<()> {
        self.calls.push(RuntimeCall::CommitSwapChain(chain));
        self.check_session(session)?;
        let entry = self.swap_chains.get_mut(&chain).ok_or_else(|| {
            RuntimeError::new(
                RuntimeErrorKind::InvalidParameter,
                format!("unknown swap chain {:?}", chain),
            )
        })?;
        entry.current = (entry.current + 1) % entry.textures.len();
        entry.commits += 1;
        entry.committed_since_submit = true;
        Ok(())
    }

    fn destroy_swap_chain(&mut self, _session: SessionHandle, chain: SwapChainHandle) {
        self.calls.push(RuntimeCall::DestroySwapChain(chain));
        self.swap_chains.remove(&chain);
    }

    fn create_mirror_texture(
        &mut self,
        session: SessionHandle,
        _desc: &MirrorTextureDesc,
    ) -> RuntimeResult<MirrorTextureHandle> {
        self.calls.push(RuntimeCall::CreateMirrorTexture);
        self.check_session(session)?;
        if self.reject_mirrors {
            return Err(RuntimeError::new(
                RuntimeErrorKind::Unavailable,
                "mirror textures are not available",
            ));
        }
        let handle = MirrorTextureHandle(self.allocate_handle());
        let texture = self.allocate_texture();
        self.mirrors.insert(handle, texture);
        Ok(handle)
    }

    fn mirror_texture_id(
        &self,
        session: SessionHandle,
        mirror: MirrorTextureHandle,
    ) -> RuntimeResult<TextureId> {
        self.check_session(session)?;
        self.mirrors.get(&mirror).copied().ok_or_else(|| {
            RuntimeError::new(
                RuntimeErrorKind::InvalidParameter,
                format!("unknown mirror texture {:?}", mirror),
            )
        })
    }

    fn destroy_mirror_texture(&mut self, _session: SessionHandle, mirror: MirrorTextureHandle) {
        self.calls.push(RuntimeCall::DestroyMirrorTexture(mirror));
        self.mirrors.remove(&mirror);
    }

    fn submit_frame(
        &mut self,
        session: SessionHandle,
        frame_index: i64,
        layer: &EyeFovDepthLayer,
    ) -> RuntimeResult<SubmitOutcome> {
        self.calls.push(RuntimeCall::SubmitFrame { frame_index });
        self.check_session(session)?;
        if let Some(err) = self.submit_failures.pop_front() {
            return Err(err);
        }

        for chain in layer.color.iter().chain(layer.depth.iter()) {
            if !self.chain(*chain)?.committed_since_submit {
                return Err(RuntimeError::new(
                    RuntimeErrorKind::InvalidParameter,
                    format!("swap chain {:?} submitted without a committed texture", chain),
                ));
            }
        }
        for chain in layer.color.iter().chain(layer.depth.iter()) {
            if let Some(entry) = self.swap_chains.get_mut(chain) {
                entry.committed_since_submit = false;
            }
        }

        self.submitted.push(SubmittedFrame {
            frame_index,
            layer: layer.clone(),
        });
        Ok(self.submit_outcome)
    }

    fn input_state(
        &mut self,
        session: SessionHandle,
        controller: ControllerType,
    ) -> RuntimeResult<InputState> {
        self.calls.push(RuntimeCall::InputState(controller));
        self.check_session(session)?;
        if self.input_failures > 0 {
            self.input_failures -= 1;
            return Err(RuntimeError::new(
                RuntimeErrorKind::Unavailable,
                "controllers not connected",
            ));
        }
        Ok(self.input)
    }
}
