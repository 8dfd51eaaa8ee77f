use super::{Attachment, FramebufferId, GraphicsContext, Rect, TextureId};
use crate::vr::{
    DeviceSession, HmdRuntime, MirrorTextureDesc, MirrorTextureHandle, TextureFormat, VrResult,
};

/// Compositor mirror texture exposed to the window through a read framebuffer.
pub struct MirrorSurface {
    handle: Option<MirrorTextureHandle>,
    texture: TextureId,
    framebuffer: FramebufferId,
    size: [u32; 2],
}

impl MirrorSurface {
    pub fn create<R: HmdRuntime>(
        session: &mut DeviceSession<R>,
        gfx: &mut dyn GraphicsContext,
        size: [u32; 2],
    ) -> VrResult<Self> {
        let desc = MirrorTextureDesc {
            size,
            format: TextureFormat::Rgba8UnormSrgb,
        };
        let (handle, texture) = session.create_mirror_texture(&desc)?;

        let framebuffer = gfx.create_framebuffer();
        gfx.attach(framebuffer, Attachment::Color, Some(texture));
        gfx.attach(framebuffer, Attachment::Depth, None);
        log::info!("[mirror] mirror texture {:?} at {:?}", texture, size);

        Ok(Self {
            handle: Some(handle),
            texture,
            framebuffer,
            size,
        })
    }

    pub fn texture(&self) -> TextureId {
        self.texture
    }

    pub fn size(&self) -> [u32; 2] {
        self.size
    }

    /// Copies the mirror to the window, flipping it vertically.
    pub fn blit(&self, gfx: &mut dyn GraphicsContext) {
        let [width, height] = self.size;
        let (width, height) = (width as i32, height as i32);
        gfx.blit_framebuffer(
            self.framebuffer,
            FramebufferId::WINDOW,
            Rect::new(0, height, width, -height),
            Rect::new(0, 0, width, height),
        );
    }

    pub fn release<R: HmdRuntime>(
        &mut self,
        session: &mut DeviceSession<R>,
        gfx: &mut dyn GraphicsContext,
    ) {
        if let Some(handle) = self.handle.take() {
            gfx.delete_framebuffer(self.framebuffer);
            session.destroy_mirror_texture(handle);
        }
    }
}
