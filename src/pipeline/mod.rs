//! Encode pipelines: caller buffers in, container packets out.

mod audio;
mod fifo;
mod video;

pub(crate) use audio::AudioPipeline;
pub(crate) use video::VideoPipeline;

use crate::{
    backend::{Encode, MuxOutput},
    error::{BackendResultExt, BridgeError, ErrorKind, Result},
    packet::EncodedPacket,
    stats::Stats,
    timebase::Rational,
};

/// Moves every packet the encoder has ready into the muxer, in the order the
/// encoder produced them. Stops at the first failed write.
fn drain<E, O>(encoder: &mut E, output: &mut O, stats: &Stats) -> Result<usize>
where
    E: Encode + ?Sized,
    O: MuxOutput + ?Sized,
{
    let from = encoder.time_base();
    let mut written = 0;
    while let Some(packet) = encoder
        .receive_packet()
        .or_kind(ErrorKind::EncodeFailed, "receive packet")?
    {
        write(output, stats, from, packet)?;
        written += 1;
    }
    Ok(written)
}

/// End-of-stream variant of [`drain`]: a failed write loses only that packet
/// and the encoder is still emptied. `on_lost` runs once per lost packet; the
/// first failure is returned after the last packet.
fn drain_to_end<E, O>(
    encoder: &mut E,
    output: &mut O,
    stats: &Stats,
    mut on_lost: impl FnMut(),
) -> Result<usize>
where
    E: Encode + ?Sized,
    O: MuxOutput + ?Sized,
{
    let from = encoder.time_base();
    let mut written = 0;
    let mut first = None;
    loop {
        let packet = match encoder
            .receive_packet()
            .or_kind(ErrorKind::EncodeFailed, "receive packet")
        {
            Ok(Some(packet)) => packet,
            Ok(None) => break,
            Err(e) => {
                first.get_or_insert(e);
                break;
            }
        };
        match write(output, stats, from, packet) {
            Ok(()) => written += 1,
            Err(e) => {
                log::warn!("flush: {}", e);
                on_lost();
                first.get_or_insert(e);
            }
        }
    }
    first.map_or(Ok(written), Err)
}

fn write<O>(output: &mut O, stats: &Stats, from: Rational, mut packet: EncodedPacket) -> Result<()>
where
    O: MuxOutput + ?Sized,
{
    let kind = packet.kind;
    if let Some(to) = output.time_base(kind) {
        packet.rescale(from, to);
    }
    let size = packet.size();
    output
        .write_interleaved(packet)
        .or_kind(ErrorKind::SendFailed, &format!("write {} packet", kind))?;
    stats.add_bytes(size);
    Ok(())
}

/// Keeps the first failure of a multi-step flush and returns what succeeded.
fn keep_first(first: &mut Option<BridgeError>, result: Result<usize>) -> usize {
    match result {
        Ok(written) => written,
        Err(e) => {
            first.get_or_insert(e);
            0
        }
    }
}
