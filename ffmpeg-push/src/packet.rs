use bytes::Bytes;
use ffmpeg_next::{Rational, codec::packet::Packet};

/// An FFmpeg packet tagged with the timebase its timestamps are expressed in.
#[derive(Clone)]
pub struct RawPacket {
    packet: Packet,
    time_base: Rational,
}

impl RawPacket {
    /// Builds a packet from owned bytes; used when handing core packets back to the muxer.
    pub fn from_data(
        data: &[u8],
        pts: Option<i64>,
        dts: Option<i64>,
        duration: i64,
        is_key: bool,
        time_base: Rational,
    ) -> Self {
        let mut packet = Packet::copy(data);
        packet.set_pts(pts);
        packet.set_dts(dts);
        packet.set_duration(duration);
        if is_key {
            packet.set_flags(ffmpeg_next::codec::packet::Flags::KEY);
        }
        Self { packet, time_base }
    }

    pub fn pts(&self) -> Option<i64> {
        self.packet.pts()
    }

    pub fn dts(&self) -> Option<i64> {
        self.packet.dts()
    }

    pub fn duration(&self) -> i64 {
        self.packet.duration()
    }

    pub fn size(&self) -> usize {
        self.packet.size()
    }

    pub fn data(&self) -> Bytes {
        self.packet
            .data()
            .map(Bytes::copy_from_slice)
            .unwrap_or_default()
    }

    pub fn is_key(&self) -> bool {
        self.packet.is_key()
    }

    pub fn time_base(&self) -> Rational {
        self.time_base
    }

    pub fn get_mut(&mut self) -> &mut Packet {
        &mut self.packet
    }
}

impl From<(Packet, Rational)> for RawPacket {
    fn from((packet, time_base): (Packet, Rational)) -> Self {
        Self { packet, time_base }
    }
}
