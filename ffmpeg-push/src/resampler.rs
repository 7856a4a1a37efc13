use ffmpeg_next::{
    ChannelLayout,
    format::{Sample, sample::Type},
    software::resampling::Context,
};

use crate::frame::{alloc_audio_frame, read_planar_f32, write_packed_f32};

/// Interleaved f32 to planar f32 converter, optionally changing the rate.
pub struct Resampler {
    context: Context,
    layout: ChannelLayout,
    channels: usize,
    in_rate: u32,
    out_rate: u32,
}

impl Resampler {
    pub fn new(
        channels: u16,
        layout: ChannelLayout,
        in_rate: u32,
        out_rate: u32,
    ) -> anyhow::Result<Self> {
        let context = Context::get(
            Sample::F32(Type::Packed),
            layout,
            in_rate,
            Sample::F32(Type::Planar),
            layout,
            out_rate,
        )?;
        Ok(Self {
            context,
            layout,
            channels: channels as usize,
            in_rate,
            out_rate,
        })
    }

    /// Converts `samples` frames of interleaved input; returns one vector per channel.
    pub fn run(&mut self, pcm: &[f32], samples: usize) -> anyhow::Result<Vec<Vec<f32>>> {
        let mut input = alloc_audio_frame(Sample::F32(Type::Packed), samples, self.layout, self.in_rate)?;
        write_packed_f32(&mut input, &pcm[..samples * self.channels])?;

        let capacity = self.output_capacity(samples);
        let mut output =
            alloc_audio_frame(Sample::F32(Type::Planar), capacity, self.layout, self.out_rate)?;
        self.context.run(&input, &mut output)?;
        Ok(read_planar_f32(&output, self.channels))
    }

    /// Drains samples held back by the rate converter.
    pub fn flush(&mut self) -> anyhow::Result<Vec<Vec<f32>>> {
        if self.in_rate == self.out_rate {
            return Ok(vec![Vec::new(); self.channels]);
        }
        let capacity = self.output_capacity(0);
        let mut output =
            alloc_audio_frame(Sample::F32(Type::Planar), capacity, self.layout, self.out_rate)?;
        self.context.flush(&mut output)?;
        Ok(read_planar_f32(&output, self.channels))
    }

    fn output_capacity(&self, samples: usize) -> usize {
        // worst case output for the block plus whatever the filter holds back
        let scaled = samples as u64 * self.out_rate as u64 / self.in_rate as u64;
        scaled as usize + 256
    }
}

unsafe impl Send for Resampler {}

