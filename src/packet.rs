use std::fmt::{Display, Formatter};

use bytes::Bytes;
use serde::Serialize;

use crate::timebase::{Rational, rescale};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StreamKind {
    Video,
    Audio,
}

impl Display for StreamKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamKind::Video => f.write_str("video"),
            StreamKind::Audio => f.write_str("audio"),
        }
    }
}

/// One compressed unit on its way from an encoder to the muxer.
#[derive(Debug, Clone)]
pub struct EncodedPacket {
    pub kind: StreamKind,
    pub data: Bytes,
    pub pts: Option<i64>,
    pub dts: Option<i64>,
    pub duration: i64,
    pub is_key: bool,
}

impl EncodedPacket {
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Moves every timestamp from `from` to `to`; absent timestamps stay absent.
    pub fn rescale(&mut self, from: Rational, to: Rational) {
        self.pts = self.pts.map(|ts| rescale(ts, from, to));
        self.dts = self.dts.map(|ts| rescale(ts, from, to));
        if self.duration > 0 {
            self.duration = rescale(self.duration, from, to);
        }
    }
}

impl Display for EncodedPacket {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "EncodedPacket kind: {}, size: {}, pts: {:?}, dts: {:?}, duration: {}, is_key: {}",
            self.kind,
            self.data.len(),
            self.pts,
            self.dts,
            self.duration,
            self.is_key
        )
    }
}
