use super::{Attachment, FramebufferId, GraphicsContext, Rect};
use crate::vr::{
    DeviceSession, Eye, HmdRuntime, SwapChainDesc, SwapChainHandle, TextureFormat, VrError,
    VrResult,
};

/// Where an eye target is in its per-frame cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetState {
    Idle,
    Acquired,
    Detached,
    Committed,
}

/// Color and depth swap chains for one eye, bound through a private framebuffer.
///
/// Each headset frame walks `acquire_and_clear -> detach -> commit`.
pub struct EyeTarget {
    eye: Eye,
    color_chain: Option<SwapChainHandle>,
    depth_chain: Option<SwapChainHandle>,
    framebuffer: FramebufferId,
    size: [u32; 2],
    state: TargetState,
}

impl EyeTarget {
    /// Allocates both swap chains. A chain the runtime rejects is logged and
    /// left missing; check [`EyeTarget::chains_missing`] before rendering.
    ///
    /// # Panics
    ///
    /// Panics if `sample_count` is greater than 1.
    pub fn create<R: HmdRuntime>(
        session: &mut DeviceSession<R>,
        gfx: &mut dyn GraphicsContext,
        eye: Eye,
        size: [u32; 2],
        sample_count: u32,
    ) -> Self {
        assert!(sample_count <= 1, "multisampled eye targets are not supported");

        let color_chain = create_chain(
            session,
            gfx,
            eye,
            TextureFormat::Rgba8UnormSrgb,
            size,
            sample_count,
        );
        let depth_chain =
            create_chain(session, gfx, eye, TextureFormat::D32Float, size, sample_count);
        let framebuffer = gfx.create_framebuffer();

        Self {
            eye,
            color_chain,
            depth_chain,
            framebuffer,
            size,
            state: TargetState::Idle,
        }
    }

    pub fn eye(&self) -> Eye {
        self.eye
    }

    pub fn size(&self) -> [u32; 2] {
        self.size
    }

    pub fn state(&self) -> TargetState {
        self.state
    }

    pub fn framebuffer(&self) -> FramebufferId {
        self.framebuffer
    }

    pub fn color_chain(&self) -> Option<SwapChainHandle> {
        self.color_chain
    }

    pub fn depth_chain(&self) -> Option<SwapChainHandle> {
        self.depth_chain
    }

    pub fn chains_missing(&self) -> bool {
        self.color_chain.is_none() || self.depth_chain.is_none()
    }

    fn chains(&self) -> VrResult<(SwapChainHandle, SwapChainHandle)> {
        match (self.color_chain, self.depth_chain) {
            (Some(color), Some(depth)) => Ok((color, depth)),
            _ => Err(VrError::TextureChainsMissing { eye: self.eye }),
        }
    }

    fn misuse(&self, operation: &'static str) -> VrError {
        VrError::TargetMisuse {
            eye: self.eye,
            operation,
            state: self.state,
        }
    }

    /// Binds the runtime's current writable textures, sets the viewport to
    /// the full target and clears it with sRGB writes enabled.
    pub fn acquire_and_clear<R: HmdRuntime>(
        &mut self,
        session: &DeviceSession<R>,
        gfx: &mut dyn GraphicsContext,
    ) -> VrResult<()> {
        if !matches!(self.state, TargetState::Idle | TargetState::Committed) {
            return Err(self.misuse("acquire"));
        }
        let (color_chain, depth_chain) = self.chains()?;
        let color = session.current_swap_chain_texture(color_chain)?;
        let depth = session.current_swap_chain_texture(depth_chain)?;

        gfx.bind_framebuffer(self.framebuffer);
        gfx.attach(self.framebuffer, Attachment::Color, Some(color));
        gfx.attach(self.framebuffer, Attachment::Depth, Some(depth));
        gfx.set_viewport(Rect::from_size(self.size));
        gfx.clear();
        gfx.set_srgb_writes(true);

        self.state = TargetState::Acquired;
        log::trace!("[eye-target] {:?} acquired color {:?} depth {:?}", self.eye, color, depth);
        Ok(())
    }

    /// Clears both attachments. The runtime may invalidate the exposed
    /// texture once the chain advances, so nothing stays bound across commit.
    pub fn detach(&mut self, gfx: &mut dyn GraphicsContext) -> VrResult<()> {
        if self.state != TargetState::Acquired {
            return Err(self.misuse("detach"));
        }

        gfx.bind_framebuffer(self.framebuffer);
        gfx.attach(self.framebuffer, Attachment::Color, None);
        gfx.attach(self.framebuffer, Attachment::Depth, None);

        self.state = TargetState::Detached;
        Ok(())
    }

    /// Advances both chains, handing the rendered textures to the compositor.
    pub fn commit<R: HmdRuntime>(&mut self, session: &mut DeviceSession<R>) -> VrResult<()> {
        if self.state != TargetState::Detached {
            return Err(self.misuse("commit"));
        }
        let (color_chain, depth_chain) = self.chains()?;

        // Both chains are always advanced so their rings stay in step; the
        // first failure is reported.
        let color = session.commit_swap_chain(color_chain);
        let depth = session.commit_swap_chain(depth_chain);
        self.state = TargetState::Committed;
        color.and(depth)
    }

    pub fn release<R: HmdRuntime>(
        &mut self,
        session: &mut DeviceSession<R>,
        gfx: &mut dyn GraphicsContext,
    ) {
        if let Some(chain) = self.color_chain.take() {
            session.destroy_swap_chain(chain);
        }
        if let Some(chain) = self.depth_chain.take() {
            session.destroy_swap_chain(chain);
        }
        if self.framebuffer != FramebufferId::WINDOW {
            gfx.delete_framebuffer(self.framebuffer);
            self.framebuffer = FramebufferId::WINDOW;
        }
        self.state = TargetState::Idle;
    }
}

fn create_chain<R: HmdRuntime>(
    session: &mut DeviceSession<R>,
    gfx: &mut dyn GraphicsContext,
    eye: Eye,
    format: TextureFormat,
    size: [u32; 2],
    sample_count: u32,
) -> Option<SwapChainHandle> {
    let desc = SwapChainDesc::render_target(format, size, sample_count);
    let chain = match session.create_swap_chain(&desc) {
        Ok(chain) => chain,
        Err(err) => {
            log::error!("[eye-target] {:?} {:?} swap chain rejected: {}", eye, format, err);
            return None;
        }
    };

    match session.swap_chain_textures(chain) {
        Ok(textures) => {
            for texture in textures {
                gfx.configure_sampling(texture);
            }
        }
        Err(err) => {
            log::warn!(
                "[eye-target] {:?} {:?} swap chain textures unavailable: {}",
                eye,
                format,
                err
            );
        }
    }
    Some(chain)
}

/// The two eye targets, created together and released together.
pub struct EyeTargetPool {
    targets: [EyeTarget; 2],
}

impl EyeTargetPool {
    /// Creates one target per eye. If either target is missing a chain, the
    /// whole pool is released and `TextureChainsMissing` is returned.
    pub fn create<R: HmdRuntime>(
        session: &mut DeviceSession<R>,
        gfx: &mut dyn GraphicsContext,
        sizes: [[u32; 2]; 2],
        sample_count: u32,
    ) -> VrResult<Self> {
        let left = EyeTarget::create(session, gfx, Eye::Left, sizes[0], sample_count);
        let right = EyeTarget::create(session, gfx, Eye::Right, sizes[1], sample_count);
        let mut pool = Self {
            targets: [left, right],
        };

        let missing = pool
            .targets
            .iter()
            .find(|target| target.chains_missing())
            .map(|target| target.eye());
        if let Some(eye) = missing {
            log::error!("[eye-target] failed to create eye textures for {:?}", eye);
            pool.release(session, gfx);
            return Err(VrError::TextureChainsMissing { eye });
        }

        log::info!(
            "[eye-target] created eye targets {:?} / {:?}",
            pool.targets[0].size(),
            pool.targets[1].size()
        );
        Ok(pool)
    }

    pub fn get(&self, eye: Eye) -> &EyeTarget {
        &self.targets[eye.index()]
    }

    pub fn get_mut(&mut self, eye: Eye) -> &mut EyeTarget {
        &mut self.targets[eye.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &EyeTarget> {
        self.targets.iter()
    }

    pub fn release<R: HmdRuntime>(
        &mut self,
        session: &mut DeviceSession<R>,
        gfx: &mut dyn GraphicsContext,
    ) {
        for target in self.targets.iter_mut() {
            target.release(session, gfx);
        }
    }
}
