use super::{Attachment, FramebufferId, GraphicsContext, Rect, TextureId};
use crate::vr::AdapterLuid;

/// A graphics call as observed by [`RecordingGraphics`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphicsCall {
    MakeCurrent,
    DoneCurrent,
    EnableSceneState,
    SetSwapInterval(u32),
    CreateFramebuffer(FramebufferId),
    DeleteFramebuffer(FramebufferId),
    BindFramebuffer(FramebufferId),
    Attach {
        framebuffer: FramebufferId,
        attachment: Attachment,
        texture: Option<TextureId>,
    },
    ConfigureSampling(TextureId),
    SetViewport(Rect),
    Clear,
    SetSrgbWrites(bool),
    Blit {
        source: FramebufferId,
        destination: FramebufferId,
        source_rect: Rect,
        destination_rect: Rect,
    },
}

/// Graphics context that draws nothing and records every call.
///
/// Used by the demo host and by tests to assert call ordering.
pub struct RecordingGraphics {
    adapter: AdapterLuid,
    next_framebuffer: u32,
    live_framebuffers: Vec<FramebufferId>,
    calls: Vec<GraphicsCall>,
}

impl RecordingGraphics {
    pub fn new() -> Self {
        Self {
            adapter: AdapterLuid::default(),
            next_framebuffer: 1,
            live_framebuffers: Vec::new(),
            calls: Vec::new(),
        }
    }

    pub fn with_adapter(mut self, adapter: AdapterLuid) -> Self {
        self.adapter = adapter;
        self
    }

    pub fn calls(&self) -> &[GraphicsCall] {
        &self.calls
    }

    pub fn take_calls(&mut self) -> Vec<GraphicsCall> {
        std::mem::take(&mut self.calls)
    }

    pub fn live_framebuffers(&self) -> &[FramebufferId] {
        &self.live_framebuffers
    }

    pub fn count(&self, predicate: impl Fn(&GraphicsCall) -> bool) -> usize {
        self.calls.iter().filter(|call| predicate(call)).count()
    }
}

impl Default for RecordingGraphics {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphicsContext for RecordingGraphics {
    fn label(&self) -> &'static str {
        "Recording Graphics"
    }

    fn default_adapter_luid(&self) -> AdapterLuid {
        self.adapter
    }

    fn make_current(&mut self) {
        self.calls.push(GraphicsCall::MakeCurrent);
    }

    fn done_current(&mut self) {
        self.calls.push(GraphicsCall::DoneCurrent);
    }

    fn enable_scene_state(&mut self) {
        self.calls.push(GraphicsCall::EnableSceneState);
    }

    fn set_swap_interval(&mut self, interval: u32) {
        self.calls.push(GraphicsCall::SetSwapInterval(interval));
    }

    fn create_framebuffer(&mut self) -> FramebufferId {
        let framebuffer = FramebufferId(self.next_framebuffer);
        self.next_framebuffer += 1;
        self.live_framebuffers.push(framebuffer);
        self.calls.push(GraphicsCall::CreateFramebuffer(framebuffer));
        framebuffer
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferId) {
        self.live_framebuffers.retain(|live| *live != framebuffer);
        self.calls.push(GraphicsCall::DeleteFramebuffer(framebuffer));
    }

    fn bind_framebuffer(&mut self, framebuffer: FramebufferId) {
        self.calls.push(GraphicsCall::BindFramebuffer(framebuffer));
    }

    fn attach(
        &mut self,
        framebuffer: FramebufferId,
        attachment: Attachment,
        texture: Option<TextureId>,
    ) {
        self.calls.push(GraphicsCall::Attach {
            framebuffer,
            attachment,
            texture,
        });
    }

    fn configure_sampling(&mut self, texture: TextureId) {
        self.calls.push(GraphicsCall::ConfigureSampling(texture));
    }

    fn set_viewport(&mut self, viewport: Rect) {
        self.calls.push(GraphicsCall::SetViewport(viewport));
    }

    fn clear(&mut self) {
        self.calls.push(GraphicsCall::Clear);
    }

    fn set_srgb_writes(&mut self, enabled: bool) {
        self.calls.push(GraphicsCall::SetSrgbWrites(enabled));
    }

    fn blit_framebuffer(
        &mut self,
        source: FramebufferId,
        destination: FramebufferId,
        source_rect: Rect,
        destination_rect: Rect,
    ) {
        self.calls.push(GraphicsCall::Blit {
            source,
            destination,
            source_rect,
            destination_rect,
        });
    }
}
