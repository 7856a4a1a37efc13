use std::fmt::{Display, Formatter};

use ffmpeg_next::{ChannelLayout, format, frame};

/// Returned when FFmpeg could not allocate a frame buffer.
#[derive(Debug, Clone)]
pub struct AllocError(pub String);

impl Display for AllocError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(f, "allocation failed: {}", self.0)
    }
}

impl std::error::Error for AllocError {}

pub fn alloc_video_frame(
    pixel_format: format::Pixel,
    width: u32,
    height: u32,
) -> anyhow::Result<frame::Video> {
    let frame = frame::Video::new(pixel_format, width, height);
    let allocated = unsafe { !(*frame.as_ptr()).data[0].is_null() };
    if !allocated {
        return Err(AllocError(format!("video frame {}x{} {:?}", width, height, pixel_format)).into());
    }
    Ok(frame)
}

pub fn alloc_audio_frame(
    sample_format: format::Sample,
    samples: usize,
    layout: ChannelLayout,
    rate: u32,
) -> anyhow::Result<frame::Audio> {
    let mut frame = frame::Audio::new(sample_format, samples, layout);
    let allocated = unsafe { !(*frame.as_ptr()).data[0].is_null() };
    if !allocated {
        return Err(AllocError(format!("audio frame of {} samples", samples)).into());
    }
    frame.set_rate(rate);
    Ok(frame)
}

/// The encoder may still hold a reference to the previous picture.
pub fn make_writable(frame: &mut frame::Frame) -> anyhow::Result<()> {
    let ret = unsafe { ffmpeg_next::ffi::av_frame_make_writable(frame.as_mut_ptr()) };
    if ret < 0 {
        return Err(ffmpeg_next::Error::from(ret).into());
    }
    Ok(())
}

/// Copies tightly packed RGBA rows into a frame whose stride may be padded.
pub fn copy_rgba_rows(rgba: &[u8], frame: &mut frame::Video) -> anyhow::Result<()> {
    let row_len = frame.width() as usize * 4;
    let rows = frame.height() as usize;
    if rgba.len() != row_len * rows {
        anyhow::bail!(
            "rgba buffer has {} bytes, expected {}",
            rgba.len(),
            row_len * rows
        );
    }
    let stride = frame.stride(0);
    let dst = frame.data_mut(0);
    for (row, src) in rgba.chunks_exact(row_len).enumerate() {
        let offset = row * stride;
        dst[offset..offset + row_len].copy_from_slice(src);
    }
    Ok(())
}

/// Writes interleaved f32 samples into plane 0 of a packed float frame.
pub fn write_packed_f32(frame: &mut frame::Audio, pcm: &[f32]) -> anyhow::Result<()> {
    let dst = frame.data_mut(0);
    if dst.len() < pcm.len() * 4 {
        anyhow::bail!("audio frame too small for {} samples", pcm.len());
    }
    for (chunk, sample) in dst.chunks_exact_mut(4).zip(pcm) {
        chunk.copy_from_slice(&sample.to_ne_bytes());
    }
    Ok(())
}

/// Reads the first `samples` values of every plane of a planar float frame.
pub fn read_planar_f32(frame: &frame::Audio, channels: usize) -> Vec<Vec<f32>> {
    let samples = frame.samples();
    (0..channels)
        .map(|plane| {
            frame.data(plane)[..samples * 4]
                .chunks_exact(4)
                .map(|b| f32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
                .collect()
        })
        .collect()
}

/// Fills every plane of a planar float frame, zero-padding short planes.
pub fn write_planar_f32(frame: &mut frame::Audio, planes: &[Vec<f32>]) -> anyhow::Result<()> {
    let samples = frame.samples();
    for (index, plane) in planes.iter().enumerate() {
        if plane.len() > samples {
            anyhow::bail!("plane {} holds {} samples, frame takes {}", index, plane.len(), samples);
        }
        let dst = &mut frame.data_mut(index)[..samples * 4];
        dst.fill(0);
        for (chunk, sample) in dst.chunks_exact_mut(4).zip(plane) {
            chunk.copy_from_slice(&sample.to_ne_bytes());
        }
    }
    Ok(())
}

pub fn channel_layout(channels: u16) -> anyhow::Result<ChannelLayout> {
    match channels {
        1 => Ok(ChannelLayout::MONO),
        2 => Ok(ChannelLayout::STEREO),
        n => anyhow::bail!("unsupported channel count: {}", n),
    }
}
