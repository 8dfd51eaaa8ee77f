use crate::render::{GraphicsContext, Rect};
use crate::vr::{Eye, SessionStatus};
use glam::Mat4;

/// Where a pass is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderDestination {
    Headset,
    PreviewWindow,
}

/// Everything the scene needs to draw one eye.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyePass {
    pub status: SessionStatus,
    pub eye: Eye,
    pub view: Mat4,
    pub projection: Mat4,
    pub destination: RenderDestination,
    pub viewport: Rect,
}

/// Scene hooks supplied by the host application.
///
/// `draw_eye` must have issued every command for the eye before it returns,
/// and must not rely on graphics state left over from the previous eye.
pub trait SceneRenderer {
    /// Called once, after the graphics context and eye targets exist.
    fn initialize_scene(&mut self, gfx: &mut dyn GraphicsContext);

    /// Called once per visible tick, before the headset frame.
    fn update_scene(&mut self, status: &SessionStatus);

    fn draw_eye(&mut self, gfx: &mut dyn GraphicsContext, pass: &EyePass);
}
