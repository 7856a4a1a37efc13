/// Planar sample buffer between the resampler and an encoder with a fixed
/// frame length. Timestamps are in samples at the encoder rate.
pub(crate) struct SampleFifo {
    planes: Vec<Vec<f32>>,
    frame_size: usize,
    // pts of the first buffered sample, or of the next one once drained
    head_pts: Option<i64>,
    // end of the last emitted frame; the clock never moves behind it
    floor: Option<i64>,
}

impl SampleFifo {
    pub(crate) fn new(channels: usize, frame_size: usize) -> Self {
        Self {
            planes: vec![Vec::with_capacity(frame_size * 2); channels],
            frame_size,
            head_pts: None,
            floor: None,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.planes.first().map_or(0, Vec::len)
    }

    /// Appends one resampled block. `pts` is where the block claims to start;
    /// `None` continues the current clock.
    pub(crate) fn push(&mut self, block: Vec<Vec<f32>>, pts: Option<i64>) {
        let added = block.first().map_or(0, Vec::len);
        if added == 0 {
            return;
        }
        let buffered = self.len() as i64;
        let head = match (self.head_pts, pts) {
            (None, pts) => pts.unwrap_or(0),
            (Some(head), Some(pts))
                if pts.abs_diff(head.saturating_add(buffered)) > self.frame_size as u64 =>
            {
                let rebased = self.clamp(pts.saturating_sub(buffered));
                log::debug!(
                    "audio clock rebased: expected {}, got {}, head {} -> {}",
                    head.saturating_add(buffered),
                    pts,
                    head,
                    rebased
                );
                rebased
            }
            (Some(head), _) => head,
        };
        self.head_pts = Some(head);
        for (plane, mut samples) in self.planes.iter_mut().zip(block) {
            plane.append(&mut samples);
        }
    }

    /// Takes exactly one frame, or nothing if less than a frame is buffered.
    pub(crate) fn pop(&mut self) -> Option<(Vec<Vec<f32>>, i64)> {
        if self.len() < self.frame_size || self.frame_size == 0 {
            return None;
        }
        Some(self.take(self.frame_size))
    }

    /// Takes the remainder padded with silence to one frame.
    pub(crate) fn pop_padded(&mut self) -> Option<(Vec<Vec<f32>>, i64)> {
        let len = self.len();
        if len == 0 {
            return None;
        }
        let (mut planes, pts) = self.take(len.min(self.frame_size));
        for plane in planes.iter_mut() {
            plane.resize(self.frame_size, 0.0);
        }
        Some((planes, pts))
    }

    fn take(&mut self, count: usize) -> (Vec<Vec<f32>>, i64) {
        let pts = self.head_pts.unwrap_or(0);
        let planes = self
            .planes
            .iter_mut()
            .map(|plane| plane.drain(..count).collect())
            .collect();
        let end = pts.saturating_add(self.frame_size as i64);
        self.floor = Some(end);
        self.head_pts = Some(end);
        (planes, pts)
    }

    fn clamp(&self, pts: i64) -> i64 {
        match self.floor {
            Some(floor) => pts.max(floor),
            None => pts,
        }
    }
}
