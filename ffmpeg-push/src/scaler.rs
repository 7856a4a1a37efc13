use ffmpeg_next::{
    format::Pixel,
    frame,
    software::scaling::{Context, flag::Flags},
};

use crate::frame::{alloc_video_frame, copy_rgba_rows};

/// Fixed-geometry RGBA to encoder pixel format converter.
pub struct Scaler {
    context: Context,
    source: frame::Video,
}

impl Scaler {
    pub fn new(width: u32, height: u32, target: Pixel) -> anyhow::Result<Self> {
        let context = Context::get(
            Pixel::RGBA,
            width,
            height,
            target,
            width,
            height,
            Flags::BILINEAR,
        )?;
        let source = alloc_video_frame(Pixel::RGBA, width, height)?;
        Ok(Self { context, source })
    }

    pub fn run(&mut self, rgba: &[u8], dst: &mut frame::Video) -> anyhow::Result<()> {
        copy_rgba_rows(rgba, &mut self.source)?;
        self.context.run(&self.source, dst).map_err(|e| e.into())
    }
}

unsafe impl Send for Scaler {}
