use ffmpeg_next::{Dictionary, Rational, ffi, format::Pixel};

use crate::{
    frame::RawVideoFrame,
    hw::{self, HwAccel, HwDevice, HwFrames},
};

pub const DEFAULT_ENCODER: &str = "h264_vaapi";
pub const DEFAULT_PIXEL_FORMAT: &str = "nv12";

#[derive(Debug, Clone)]
pub struct Settings {
    pub width: u32,
    pub height: u32,
    pub framerate: u32,
    /// Hardware device path, e.g. "/dev/dri/renderD128". None = driver default.
    pub device: Option<String>,
    /// FFmpeg encoder name, e.g. "h264_vaapi", "hevc_nvenc". None = DEFAULT_ENCODER.
    pub encoder: Option<String>,
    /// Pixel format of submitted frames, e.g. "nv12". None = DEFAULT_PIXEL_FORMAT.
    pub pixel_format: Option<String>,
    /// Codec profile (FF_PROFILE_*). None = encoder default.
    pub profile: Option<i32>,
    pub max_b_frames: u32,
    /// bps, 0 = encoder default
    pub bit_rate: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            framerate: 30,
            device: None,
            encoder: None,
            pixel_format: None,
            profile: None,
            max_b_frames: 0,
            bit_rate: 0,
        }
    }
}

/// One encoder instance. Raw frames go in through `send_frame`, encoded packets
/// come out of `receive_packet`, zero or more per submitted frame.
pub struct Encoder {
    // fields drop in declaration order: codec context, then frame pool, then device
    inner: ffmpeg_next::codec::encoder::Video,
    frames: Option<HwFrames>,
    device: Option<HwDevice>,
    packet: ffmpeg_next::Packet,
    name: String,
    accel: HwAccel,
    sw_format: Pixel,
    width: u32,
    height: u32,
    frame_index: i64,
}

impl Encoder {
    pub fn open(settings: &Settings) -> anyhow::Result<Self> {
        if settings.width == 0 || settings.height == 0 {
            anyhow::bail!("invalid video size {}x{}", settings.width, settings.height);
        }
        if settings.framerate == 0 {
            anyhow::bail!("invalid framerate 0");
        }

        let requested = settings.encoder.as_deref().unwrap_or(DEFAULT_ENCODER);
        // generic codec names ("h264", "hevc") pick the first available hardware encoder
        let codec = hw::find_hw_encoder(requested)
            .or_else(|| ffmpeg_next::encoder::find_by_name(requested))
            .ok_or(anyhow::anyhow!("encoder not found: {}", requested))?;
        let name = codec.name().to_string();
        let sw_format = hw::pixel_format(
            settings
                .pixel_format
                .as_deref()
                .unwrap_or(DEFAULT_PIXEL_FORMAT),
        )?;

        let accel = HwAccel::for_encoder(&name);
        let device = if accel.needs_device() {
            Some(HwDevice::open(accel, settings.device.as_deref())?)
        } else {
            None
        };
        let frames = match &device {
            Some(device) if accel.uploads_frames() => Some(HwFrames::new(
                device,
                sw_format,
                settings.width,
                settings.height,
            )?),
            _ => None,
        };

        let mut encoder = ffmpeg_next::codec::Context::new_with_codec(codec)
            .encoder()
            .video()?;
        encoder.set_width(settings.width);
        encoder.set_height(settings.height);
        encoder.set_format(sw_format);
        encoder.set_time_base(Rational::new(1, settings.framerate as i32));
        encoder.set_frame_rate(Some(Rational::new(settings.framerate as i32, 1)));
        encoder.set_max_b_frames(settings.max_b_frames as usize);
        if settings.bit_rate > 0 {
            encoder.set_bit_rate(settings.bit_rate as usize);
        }

        unsafe {
            let ctx = encoder.as_mut_ptr();
            if let Some(profile) = settings.profile {
                (*ctx).profile = profile;
            }
            if let (Some(frames), Some(surface_format)) = (&frames, accel.surface_format()) {
                (*ctx).pix_fmt = surface_format;
                (*ctx).hw_frames_ctx = ffi::av_buffer_ref(frames.as_ptr());
                if (*ctx).hw_frames_ctx.is_null() {
                    anyhow::bail!("failed to reference hardware frames context");
                }
            } else if let Some(device) = &device {
                (*ctx).hw_device_ctx = ffi::av_buffer_ref(device.as_ptr());
                if (*ctx).hw_device_ctx.is_null() {
                    anyhow::bail!("failed to reference hardware device context");
                }
            }
        }

        let mut opts = Dictionary::new();
        if name.starts_with("libx26") {
            opts.set("preset", "ultrafast");
            opts.set("tune", "zerolatency");
        }
        let inner = encoder.open_with(opts)?;

        log::info!(
            "encoder opened: {} ({:?}) {}x{}@{} {:?}",
            name,
            accel,
            settings.width,
            settings.height,
            settings.framerate,
            sw_format
        );

        Ok(Self {
            inner,
            frames,
            device,
            packet: ffmpeg_next::Packet::empty(),
            name,
            accel,
            sw_format,
            width: settings.width,
            height: settings.height,
            frame_index: 0,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn accel(&self) -> HwAccel {
        self.accel
    }

    pub fn device(&self) -> Option<&HwDevice> {
        self.device.as_ref()
    }

    /// Frames submitted so far (also the pts of the next frame).
    pub fn frame_index(&self) -> i64 {
        self.frame_index
    }

    /// Submits one frame. `None` or a frame without a first plane switches the
    /// encoder to flush mode; keep calling `receive_packet` to drain it.
    pub fn send_frame(&mut self, frame: Option<&RawVideoFrame<'_>>) -> anyhow::Result<()> {
        let Some(frame) = frame.filter(|f| !f.is_flush()) else {
            log::debug!("{}: flushing after {} frames", self.name, self.frame_index);
            self.inner.send_eof()?;
            return Ok(());
        };

        let mut sw_frame = ffmpeg_next::frame::Video::new(self.sw_format, self.width, self.height);
        frame.copy_to(&mut sw_frame)?;

        let mut video_frame = match &self.frames {
            Some(frames) => frames.upload(&sw_frame)?,
            None => sw_frame,
        };
        video_frame.set_pts(Some(self.frame_index));

        self.inner.send_frame(&video_frame)?;
        self.frame_index += 1;
        Ok(())
    }

    /// Next encoded packet, borrowed until the following call.
    /// `Ok(None)` means the encoder needs more input (or is fully drained after a flush).
    pub fn receive_packet(&mut self) -> anyhow::Result<Option<&[u8]>> {
        match self.inner.receive_packet(&mut self.packet) {
            Ok(()) => Ok(Some(self.packet.data().unwrap_or_default())),
            Err(ffmpeg_next::Error::Other { errno })
                if errno == ffmpeg_next::util::error::EAGAIN =>
            {
                Ok(None)
            }
            Err(ffmpeg_next::Error::Eof) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn software_settings() -> Settings {
        Settings {
            width: 64,
            height: 48,
            framerate: 10,
            encoder: Some("libx264".to_string()),
            pixel_format: Some("yuv420p".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_open_rejects_invalid_settings() {
        crate::init().unwrap();
        let settings = Settings {
            width: 0,
            ..software_settings()
        };
        assert!(Encoder::open(&settings).is_err());

        let settings = Settings {
            framerate: 0,
            ..software_settings()
        };
        assert!(Encoder::open(&settings).is_err());

        let settings = Settings {
            encoder: Some("no_such_encoder".to_string()),
            ..software_settings()
        };
        assert!(Encoder::open(&settings).is_err());

        let settings = Settings {
            pixel_format: Some("not-a-format".to_string()),
            ..software_settings()
        };
        assert!(Encoder::open(&settings).is_err());
    }

    /// Needs libx264 in the linked FFmpeg.
    #[test]
    fn test_software_encode_and_flush() -> anyhow::Result<()> {
        crate::init()?;
        if ffmpeg_next::encoder::find_by_name("libx264").is_none() {
            eprintln!("skip: libx264 not available");
            return Ok(());
        }

        let settings = software_settings();
        let mut encoder = Encoder::open(&settings)?;
        assert_eq!(encoder.accel(), HwAccel::None);

        let y = vec![128u8; 64 * 48];
        let u = vec![128u8; 32 * 24];
        let v = vec![128u8; 32 * 24];
        let frame = RawVideoFrame::new(&[(&y[..], 64), (&u[..], 32), (&v[..], 32)]);

        let mut packets = 0;
        for _ in 0..10 {
            encoder.send_frame(Some(&frame))?;
            while let Some(packet) = encoder.receive_packet()? {
                assert!(!packet.is_empty());
                packets += 1;
            }
        }
        assert_eq!(encoder.frame_index(), 10);

        encoder.send_frame(None)?;
        while let Some(packet) = encoder.receive_packet()? {
            assert!(!packet.is_empty());
            packets += 1;
        }
        assert_eq!(packets, 10);
        Ok(())
    }
}
