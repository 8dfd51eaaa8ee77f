pub mod pose;
pub mod session;
pub mod simulated;

use crate::render::{Rect, TextureId};
use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use self::pose::{EyeTransforms, PoseResolver, ResolvedPoses, TimewarpProjectionDesc};
pub use self::session::{AdapterAffinity, DeviceSession};
pub use self::simulated::{RuntimeCall, SimulatedRuntime};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Eye {
    Left,
    Right,
}

impl Eye {
    pub const BOTH: [Eye; 2] = [Eye::Left, Eye::Right];

    pub fn index(self) -> usize {
        match self {
            Eye::Left => 0,
            Eye::Right => 1,
        }
    }
}

/// Field of view expressed as tangents of the half angles from the view axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FovPort {
    pub up_tan: f32,
    pub down_tan: f32,
    pub left_tan: f32,
    pub right_tan: f32,
}

impl FovPort {
    pub fn symmetric(tan: f32) -> Self {
        Self {
            up_tan: tan,
            down_tan: tan,
            left_tan: tan,
            right_tan: tan,
        }
    }
}

impl Default for FovPort {
    fn default() -> Self {
        Self::symmetric(1.0)
    }
}

/// Position and orientation sample, in meters and as a unit quaternion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub orientation: Quat,
    pub position: Vec3,
}

impl Pose {
    pub const IDENTITY: Pose = Pose {
        orientation: Quat::IDENTITY,
        position: Vec3::ZERO,
    };

    pub fn new(orientation: Quat, position: Vec3) -> Self {
        Self {
            orientation,
            position,
        }
    }

    /// Applies `offset` expressed in this pose's local frame.
    pub fn compose(&self, offset: &Pose) -> Pose {
        Pose {
            orientation: self.orientation * offset.orientation,
            position: self.position + self.orientation * offset.position,
        }
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Locally unique identifier of a graphics adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AdapterLuid(pub [u8; 8]);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SwapChainHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MirrorTextureHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackingOrigin {
    EyeLevel,
    FloorLevel,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HmdDescription {
    pub product_name: String,
    pub resolution: [u32; 2],
    pub default_eye_fov: [FovPort; 2],
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyeRenderDesc {
    pub eye: Eye,
    pub fov: FovPort,
    pub hmd_to_eye_pose: Pose,
}

/// Snapshot of the runtime session flags, polled once per tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionStatus {
    pub is_visible: bool,
    pub hmd_present: bool,
    pub hmd_mounted: bool,
    pub display_lost: bool,
    pub should_quit: bool,
    pub should_recenter: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControllerType {
    Touch,
    Remote,
    XBox,
}

/// Raw controller state as reported by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct InputState {
    pub time_in_seconds: f64,
    pub buttons: u32,
    pub touches: u32,
    pub index_trigger: [f32; 2],
    pub hand_trigger: [f32; 2],
    pub thumbstick: [[f32; 2]; 2],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgba8UnormSrgb,
    D32Float,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapChainDesc {
    pub format: TextureFormat,
    pub size: [u32; 2],
    pub array_size: u32,
    pub mip_levels: u32,
    pub sample_count: u32,
    pub static_image: bool,
}

impl SwapChainDesc {
    pub fn render_target(format: TextureFormat, size: [u32; 2], sample_count: u32) -> Self {
        Self {
            format,
            size,
            array_size: 1,
            mip_levels: 1,
            sample_count,
            static_image: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MirrorTextureDesc {
    pub size: [u32; 2],
    pub format: TextureFormat,
}

/// Predicted eye poses together with the sensor sample time they were taken at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyePoses {
    pub poses: [Pose; 2],
    pub sensor_sample_time: f64,
}

/// Compositor layer carrying both eyes' color and depth swap chains.
#[derive(Debug, Clone, PartialEq)]
pub struct EyeFovDepthLayer {
    pub texture_origin_at_bottom_left: bool,
    pub color: [SwapChainHandle; 2],
    pub depth: [SwapChainHandle; 2],
    pub viewport: [Rect; 2],
    pub fov: [FovPort; 2],
    pub render_pose: [Pose; 2],
    pub sensor_sample_time: f64,
    pub projection_desc: TimewarpProjectionDesc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Presented,
    /// Accepted, but the compositor is not currently showing the application.
    NotVisible,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeErrorKind {
    NoDevice,
    DisplayLost,
    SessionEnded,
    InvalidParameter,
    Unavailable,
    Other,
}

/// Failure reported by the HMD runtime, with its diagnostic string.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message} ({kind:?})")]
pub struct RuntimeError {
    pub kind: RuntimeErrorKind,
    pub message: String,
}

impl RuntimeError {
    pub fn new(kind: RuntimeErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        !matches!(self.kind, RuntimeErrorKind::SessionEnded | RuntimeErrorKind::NoDevice)
    }
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;

#[derive(Debug, Error)]
pub enum VrError {
    #[error("runtime initialization failed: {0}")]
    RuntimeInit(String),
    #[error("session creation failed: {0}")]
    SessionCreate(String),
    #[error("no active device session")]
    NoSession,
    #[error("tracking origin must be configured before querying poses")]
    TrackingOriginUnset,
    #[error("{eye:?} eye texture chains are missing")]
    TextureChainsMissing { eye: Eye },
    #[error("{eye:?} eye target cannot {operation} while {state:?}")]
    TargetMisuse {
        eye: Eye,
        operation: &'static str,
        state: crate::render::TargetState,
    },
    #[error("runtime call failed: {0}")]
    Runtime(#[from] RuntimeError),
}

pub type VrResult<T> = Result<T, VrError>;

/// The HMD vendor runtime, consumed as an opaque service.
///
/// Every call other than `initialize`/`create_session`/`shutdown` operates on
/// a session handle previously returned by `create_session`.
pub trait HmdRuntime: Send {
    fn label(&self) -> &'static str;

    fn initialize(&mut self) -> RuntimeResult<()>;
    fn shutdown(&mut self);

    fn create_session(&mut self) -> RuntimeResult<(SessionHandle, AdapterLuid)>;
    fn destroy_session(&mut self, session: SessionHandle);

    fn hmd_description(&self, session: SessionHandle) -> HmdDescription;
    fn fov_texture_size(
        &self,
        session: SessionHandle,
        eye: Eye,
        fov: FovPort,
        pixels_per_display_pixel: f32,
    ) -> [u32; 2];
    fn render_desc(&self, session: SessionHandle, eye: Eye, fov: FovPort) -> EyeRenderDesc;

    fn set_tracking_origin(&mut self, session: SessionHandle, origin: TrackingOrigin)
    -> RuntimeResult<()>;
    fn recenter_tracking_origin(&mut self, session: SessionHandle) -> RuntimeResult<()>;
    fn session_status(&mut self, session: SessionHandle) -> RuntimeResult<SessionStatus>;

    /// Predicted eye poses for `frame_index`, offset from the head pose by
    /// `hmd_to_eye`.
    fn eye_poses(
        &mut self,
        session: SessionHandle,
        frame_index: i64,
        latency_marker: bool,
        hmd_to_eye: &[Pose; 2],
    ) -> RuntimeResult<EyePoses>;

    fn create_swap_chain(
        &mut self,
        session: SessionHandle,
        desc: &SwapChainDesc,
    ) -> RuntimeResult<SwapChainHandle>;
    fn swap_chain_length(&self, session: SessionHandle, chain: SwapChainHandle)
    -> RuntimeResult<usize>;
    fn swap_chain_current_index(
        &self,
        session: SessionHandle,
        chain: SwapChainHandle,
    ) -> RuntimeResult<usize>;
    fn swap_chain_texture(
        &self,
        session: SessionHandle,
        chain: SwapChainHandle,
        index: usize,
    ) -> RuntimeResult<TextureId>;
    fn commit_swap_chain(&mut self, session: SessionHandle, chain: SwapChainHandle)
    -> RuntimeResult<()>;
    fn destroy_swap_chain(&mut self, session: SessionHandle, chain: SwapChainHandle);

    fn create_mirror_texture(
        &mut self,
        session: SessionHandle,
        desc: &MirrorTextureDesc,
    ) -> RuntimeResult<MirrorTextureHandle>;
    fn mirror_texture_id(
        &self,
        session: SessionHandle,
        mirror: MirrorTextureHandle,
    ) -> RuntimeResult<TextureId>;
    fn destroy_mirror_texture(&mut self, session: SessionHandle, mirror: MirrorTextureHandle);

    fn submit_frame(
        &mut self,
        session: SessionHandle,
        frame_index: i64,
        layer: &EyeFovDepthLayer,
    ) -> RuntimeResult<SubmitOutcome>;

    fn input_state(
        &mut self,
        session: SessionHandle,
        controller: ControllerType,
    ) -> RuntimeResult<InputState>;
}
