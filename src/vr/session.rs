use super::{
    AdapterLuid, ControllerType, Eye, EyeFovDepthLayer, EyePoses, EyeRenderDesc, FovPort,
    HmdDescription, HmdRuntime, InputState, MirrorTextureDesc, MirrorTextureHandle, Pose,
    RuntimeErrorKind, SessionHandle, SessionStatus, SubmitOutcome, SwapChainDesc, SwapChainHandle,
    TrackingOrigin, VrError, VrResult,
};
use crate::render::TextureId;

/// Result of comparing the device's adapter with the system default adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterAffinity {
    Matching,
    Mismatch {
        device: AdapterLuid,
        system: AdapterLuid,
    },
}

/// Connection to the HMD runtime and the single device session opened on it.
///
/// Eye targets and the pose resolver borrow the session for the duration of
/// each call; nothing else holds the runtime.
pub struct DeviceSession<R: HmdRuntime> {
    runtime: R,
    runtime_initialized: bool,
    handle: Option<SessionHandle>,
    adapter: Option<AdapterLuid>,
    tracking_origin: Option<TrackingOrigin>,
}

impl<R: HmdRuntime> DeviceSession<R> {
    pub fn new(runtime: R) -> Self {
        Self {
            runtime,
            runtime_initialized: false,
            handle: None,
            adapter: None,
            tracking_origin: None,
        }
    }

    pub fn initialize(&mut self) -> VrResult<()> {
        if self.runtime_initialized {
            return Ok(());
        }

        self.runtime.initialize().map_err(|err| {
            log::error!("[session] {} initialize failed: {}", self.runtime.label(), err.message);
            VrError::RuntimeInit(err.message)
        })?;
        self.runtime_initialized = true;
        log::info!("[session] {} runtime initialized", self.runtime.label());
        Ok(())
    }

    pub fn create_session(&mut self) -> VrResult<AdapterLuid> {
        if !self.runtime_initialized {
            return Err(VrError::RuntimeInit("runtime not initialized".into()));
        }

        let (handle, adapter) = self.runtime.create_session().map_err(|err| {
            log::error!("[session] create failed: {}", err.message);
            match err.kind {
                RuntimeErrorKind::NoDevice => {
                    VrError::SessionCreate(format!("no device attached: {}", err.message))
                }
                _ => VrError::SessionCreate(err.message),
            }
        })?;

        log::info!("[session] created session {:?} on adapter {:?}", handle, adapter);
        self.handle = Some(handle);
        self.adapter = Some(adapter);
        Ok(adapter)
    }

    /// Compares the device's adapter with `system_default`. A mismatch only
    /// warns; rendering may still work depending on the graphics API.
    pub fn check_adapter_affinity(&self, system_default: AdapterLuid) -> VrResult<AdapterAffinity> {
        let device = self.adapter.ok_or(VrError::NoSession)?;
        if device == system_default {
            return Ok(AdapterAffinity::Matching);
        }

        log::warn!(
            "[session] device adapter {:?} differs from default adapter {:?}; \
             the graphics context may not support it",
            device,
            system_default
        );
        Ok(AdapterAffinity::Mismatch {
            device,
            system: system_default,
        })
    }

    pub fn query_display_description(&self) -> VrResult<HmdDescription> {
        let handle = self.handle()?;
        Ok(self.runtime.hmd_description(handle))
    }

    pub fn ideal_texture_size(
        &self,
        eye: Eye,
        fov: FovPort,
        pixels_per_display_pixel: f32,
    ) -> VrResult<[u32; 2]> {
        let handle = self.handle()?;
        Ok(self
            .runtime
            .fov_texture_size(handle, eye, fov, pixels_per_display_pixel))
    }

    /// Per-eye render descriptions. Values may change at runtime, so callers
    /// query them every frame.
    pub fn eye_render_descs(&self, fov: &[FovPort; 2]) -> VrResult<[EyeRenderDesc; 2]> {
        let handle = self.handle()?;
        Ok(Eye::BOTH.map(|eye| self.runtime.render_desc(handle, eye, fov[eye.index()])))
    }

    pub fn set_tracking_origin(&mut self, origin: TrackingOrigin) -> VrResult<()> {
        let handle = self.handle()?;
        self.runtime.set_tracking_origin(handle, origin)?;
        self.tracking_origin = Some(origin);
        log::debug!("[session] tracking origin set to {:?}", origin);
        Ok(())
    }

    pub fn tracking_origin(&self) -> Option<TrackingOrigin> {
        self.tracking_origin
    }

    pub fn recenter(&mut self) -> VrResult<()> {
        let handle = self.handle()?;
        self.runtime.recenter_tracking_origin(handle)?;
        Ok(())
    }

    pub fn status(&mut self) -> VrResult<SessionStatus> {
        let handle = self.handle()?;
        Ok(self.runtime.session_status(handle)?)
    }

    pub fn eye_poses(&mut self, frame_index: i64, hmd_to_eye: &[Pose; 2]) -> VrResult<EyePoses> {
        let handle = self.handle()?;
        if self.tracking_origin.is_none() {
            return Err(VrError::TrackingOriginUnset);
        }
        Ok(self.runtime.eye_poses(handle, frame_index, true, hmd_to_eye)?)
    }

    pub fn input_state(&mut self, controller: ControllerType) -> VrResult<InputState> {
        let handle = self.handle()?;
        Ok(self.runtime.input_state(handle, controller)?)
    }

    pub fn create_swap_chain(&mut self, desc: &SwapChainDesc) -> VrResult<SwapChainHandle> {
        let handle = self.handle()?;
        Ok(self.runtime.create_swap_chain(handle, desc)?)
    }

    /// Every texture in the chain's ring, in ring order.
    pub fn swap_chain_textures(&self, chain: SwapChainHandle) -> VrResult<Vec<TextureId>> {
        let handle = self.handle()?;
        let length = self.runtime.swap_chain_length(handle, chain)?;
        (0..length)
            .map(|index| {
                self.runtime
                    .swap_chain_texture(handle, chain, index)
                    .map_err(VrError::from)
            })
            .collect()
    }

    /// The texture the runtime currently exposes as writable.
    pub fn current_swap_chain_texture(&self, chain: SwapChainHandle) -> VrResult<TextureId> {
        let handle = self.handle()?;
        let index = self.runtime.swap_chain_current_index(handle, chain)?;
        Ok(self.runtime.swap_chain_texture(handle, chain, index)?)
    }

    pub fn commit_swap_chain(&mut self, chain: SwapChainHandle) -> VrResult<()> {
        let handle = self.handle()?;
        Ok(self.runtime.commit_swap_chain(handle, chain)?)
    }

    pub fn destroy_swap_chain(&mut self, chain: SwapChainHandle) {
        if let Some(handle) = self.handle {
            self.runtime.destroy_swap_chain(handle, chain);
        }
    }

    pub fn create_mirror_texture(
        &mut self,
        desc: &MirrorTextureDesc,
    ) -> VrResult<(MirrorTextureHandle, TextureId)> {
        let handle = self.handle()?;
        let mirror = self.runtime.create_mirror_texture(handle, desc)?;
        match self.runtime.mirror_texture_id(handle, mirror) {
            Ok(texture) => Ok((mirror, texture)),
            Err(err) => {
                self.runtime.destroy_mirror_texture(handle, mirror);
                Err(err.into())
            }
        }
    }

    pub fn destroy_mirror_texture(&mut self, mirror: MirrorTextureHandle) {
        if let Some(handle) = self.handle {
            self.runtime.destroy_mirror_texture(handle, mirror);
        }
    }

    pub fn submit_frame(
        &mut self,
        frame_index: i64,
        layer: &EyeFovDepthLayer,
    ) -> VrResult<SubmitOutcome> {
        let handle = self.handle()?;
        Ok(self.runtime.submit_frame(handle, frame_index, layer)?)
    }

    pub fn handle(&self) -> VrResult<SessionHandle> {
        self.handle.ok_or(VrError::NoSession)
    }

    pub fn adapter(&self) -> Option<AdapterLuid> {
        self.adapter
    }

    pub fn is_active(&self) -> bool {
        self.handle.is_some()
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    pub fn runtime_mut(&mut self) -> &mut R {
        &mut self.runtime
    }

    /// Destroys the session, then shuts the runtime down. Safe to call more
    /// than once.
    pub fn shutdown(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.runtime.destroy_session(handle);
            self.adapter = None;
            self.tracking_origin = None;
            log::info!("[session] destroyed session {:?}", handle);
        }

        if self.runtime_initialized {
            self.runtime.shutdown();
            self.runtime_initialized = false;
            log::info!("[session] {} runtime shut down", self.runtime.label());
        }
    }
}
