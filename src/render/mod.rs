pub mod eye_target;
pub mod mirror;
pub mod recording;

use crate::vr::AdapterLuid;

pub use self::eye_target::{EyeTarget, EyeTargetPool, TargetState};
pub use self::mirror::MirrorSurface;
pub use self::recording::{GraphicsCall, RecordingGraphics};

/// Graphics API texture name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(pub u32);

/// Graphics API framebuffer name. `WINDOW` is the window's default framebuffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FramebufferId(pub u32);

impl FramebufferId {
    pub const WINDOW: FramebufferId = FramebufferId(0);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attachment {
    Color,
    Depth,
}

/// Integer rectangle in pixels, origin at the bottom-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn from_size(size: [u32; 2]) -> Self {
        Self::new(0, 0, size[0] as i32, size[1] as i32)
    }
}

/// Primitive drawing surface the pipeline renders through.
///
/// Implementations wrap a current graphics context; the pipeline only ever
/// touches it from the thread that drives `tick`.
pub trait GraphicsContext {
    fn label(&self) -> &'static str;

    /// Identity of the adapter the system would pick by default.
    fn default_adapter_luid(&self) -> AdapterLuid;

    fn make_current(&mut self);
    fn done_current(&mut self);

    /// Enables depth testing and back-face culling.
    fn enable_scene_state(&mut self);
    fn set_swap_interval(&mut self, interval: u32);

    fn create_framebuffer(&mut self) -> FramebufferId;
    fn delete_framebuffer(&mut self, framebuffer: FramebufferId);
    fn bind_framebuffer(&mut self, framebuffer: FramebufferId);
    fn attach(
        &mut self,
        framebuffer: FramebufferId,
        attachment: Attachment,
        texture: Option<TextureId>,
    );

    /// Linear filtering and clamp-to-edge wrapping.
    fn configure_sampling(&mut self, texture: TextureId);

    fn set_viewport(&mut self, viewport: Rect);
    fn clear(&mut self);
    fn set_srgb_writes(&mut self, enabled: bool);

    fn blit_framebuffer(
        &mut self,
        source: FramebufferId,
        destination: FramebufferId,
        source_rect: Rect,
        destination_rect: Rect,
    );
}

/// Lets a host lend its context to a pipeline and keep using it afterwards.
impl<G: GraphicsContext + ?Sized> GraphicsContext for &mut G {
    fn label(&self) -> &'static str {
        (**self).label()
    }

    fn default_adapter_luid(&self) -> AdapterLuid {
        (**self).default_adapter_luid()
    }

    fn make_current(&mut self) {
        (**self).make_current();
    }

    fn done_current(&mut self) {
        (**self).done_current();
    }

    fn enable_scene_state(&mut self) {
        (**self).enable_scene_state();
    }

    fn set_swap_interval(&mut self, interval: u32) {
        (**self).set_swap_interval(interval);
    }

    fn create_framebuffer(&mut self) -> FramebufferId {
        (**self).create_framebuffer()
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferId) {
        (**self).delete_framebuffer(framebuffer);
    }

    fn bind_framebuffer(&mut self, framebuffer: FramebufferId) {
        (**self).bind_framebuffer(framebuffer);
    }

    fn attach(
        &mut self,
        framebuffer: FramebufferId,
        attachment: Attachment,
        texture: Option<TextureId>,
    ) {
        (**self).attach(framebuffer, attachment, texture);
    }

    fn configure_sampling(&mut self, texture: TextureId) {
        (**self).configure_sampling(texture);
    }

    fn set_viewport(&mut self, viewport: Rect) {
        (**self).set_viewport(viewport);
    }

    fn clear(&mut self) {
        (**self).clear();
    }

    fn set_srgb_writes(&mut self, enabled: bool) {
        (**self).set_srgb_writes(enabled);
    }

    fn blit_framebuffer(
        &mut self,
        source: FramebufferId,
        destination: FramebufferId,
        source_rect: Rect,
        destination_rect: Rect,
    ) {
        (**self).blit_framebuffer(source, destination, source_rect, destination_rect);
    }
}
