use std::ffi::CString;
use std::ptr;

use ffmpeg_next::{Dictionary, Rational, codec, format};

use crate::packet::RawPacket;

/// Muxer context for one push target. The transport is opened separately from the
/// context allocation so streams can be added before any network I/O happens.
pub struct AvOutput {
    inner: format::context::Output,
    url: String,
    io_open: bool,
    have_written_header: bool,
    have_written_trailer: bool,
}

impl AvOutput {
    pub fn new(url: &str, format_name: &str) -> anyhow::Result<Self> {
        let c_url = CString::new(url)?;
        let c_format = CString::new(format_name)?;
        let mut ps = ptr::null_mut();
        let ret = unsafe {
            ffmpeg_next::ffi::avformat_alloc_output_context2(
                &mut ps,
                ptr::null_mut(),
                c_format.as_ptr(),
                c_url.as_ptr(),
            )
        };
        if ret < 0 || ps.is_null() {
            return Err(anyhow::anyhow!(
                "alloc output context (format={}): {}",
                format_name,
                ffmpeg_next::Error::from(ret)
            ));
        }
        Ok(Self {
            inner: unsafe { format::context::Output::wrap(ps) },
            url: url.to_string(),
            io_open: false,
            have_written_header: false,
            have_written_trailer: false,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// True when the container writes through an AVIO context we must open ourselves.
    pub fn needs_io(&self) -> bool {
        !self.inner.format().flags().contains(format::Flags::NO_FILE)
    }

    pub fn global_header(&self) -> bool {
        self.inner
            .format()
            .flags()
            .contains(format::Flags::GLOBAL_HEADER)
    }

    pub fn add_stream<P: Into<codec::Parameters>>(
        &mut self,
        codec: ffmpeg_next::Codec,
        parameters: P,
        time_base: Rational,
    ) -> anyhow::Result<usize> {
        let mut stream = self.inner.add_stream(codec)?;
        stream.set_parameters(parameters);
        stream.set_time_base(time_base);
        Ok(stream.index())
    }

    pub fn open_io(&mut self, options: Dictionary) -> anyhow::Result<()> {
        if self.io_open || !self.needs_io() {
            return Ok(());
        }
        let c_url = CString::new(self.url.as_str())?;
        let mut opts = options.disown();
        let ret = unsafe {
            let ctx = self.inner.as_mut_ptr();
            ffmpeg_next::ffi::avio_open2(
                &mut (*ctx).pb,
                c_url.as_ptr(),
                ffmpeg_next::ffi::AVIO_FLAG_WRITE as i32,
                ptr::null(),
                &mut opts,
            )
        };
        unsafe { Dictionary::own(opts) };
        if ret < 0 {
            return Err(anyhow::anyhow!(
                "open {}: {}",
                self.url,
                ffmpeg_next::Error::from(ret)
            ));
        }
        self.io_open = true;
        Ok(())
    }

    pub fn write_header(&mut self, options: Dictionary) -> anyhow::Result<()> {
        let unused = self.inner.write_header_with(options)?;
        for (key, value) in unused.iter() {
            log::debug!("muxer ignored header option {}={}", key, value);
        }
        self.have_written_header = true;
        Ok(())
    }

    /// Only meaningful after the header: muxers such as FLV replace the requested timebase.
    pub fn stream_time_base(&self, stream_index: usize) -> anyhow::Result<Rational> {
        self.inner
            .stream(stream_index)
            .map(|s| s.time_base())
            .ok_or(anyhow::anyhow!("stream not found: {}", stream_index))
    }

    /// Timestamps must already be in the destination stream's timebase.
    pub fn write_packet(&mut self, stream_index: usize, mut packet: RawPacket) -> anyhow::Result<()> {
        if !self.have_written_header {
            anyhow::bail!("write_packet before header");
        }
        let p = packet.get_mut();
        p.set_stream(stream_index);
        p.set_position(-1);
        p.write_interleaved(&mut self.inner)?;
        Ok(())
    }

    pub fn finish(&mut self) -> anyhow::Result<()> {
        if self.have_written_header && !self.have_written_trailer {
            self.have_written_trailer = true;
            self.inner.write_trailer()?;
        }
        Ok(())
    }

    pub fn close(&mut self) -> anyhow::Result<()> {
        if self.io_open {
            self.io_open = false;
            let ret = unsafe { ffmpeg_next::ffi::avio_closep(&mut (*self.inner.as_mut_ptr()).pb) };
            if ret < 0 {
                return Err(anyhow::anyhow!(
                    "close {}: {}",
                    self.url,
                    ffmpeg_next::Error::from(ret)
                ));
            }
        }
        Ok(())
    }
}

unsafe impl Send for AvOutput {}
