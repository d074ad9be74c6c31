//! Hardware acceleration for encoders.
//!
//! Maps encoder names to the FFmpeg hardware device type they run on (VAAPI/QSV/CUDA)
//! and owns the device and frame pool references handed to the codec context.

use std::{ffi::CString, ptr};

use ffmpeg_next::{ffi, format::Pixel};

/// Surfaces kept in the hardware frame pool.
const FRAME_POOL_SIZE: i32 = 20;

/// How raw frames reach an encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwAccel {
    /// VA-API: frames are uploaded to a VAAPI surface pool.
    Vaapi,
    /// Intel Quick Sync: frames are uploaded to a QSV surface pool.
    Qsv,
    /// NVENC: a CUDA device is attached, frames stay in system memory.
    Cuda,
    /// Software encoders and hardware encoders without a device context (v4l2m2m).
    None,
}

impl HwAccel {
    pub fn for_encoder(name: &str) -> Self {
        if name.ends_with("_vaapi") {
            HwAccel::Vaapi
        } else if name.ends_with("_qsv") {
            HwAccel::Qsv
        } else if name.ends_with("_nvenc") {
            HwAccel::Cuda
        } else {
            HwAccel::None
        }
    }

    fn device_type(self) -> Option<ffi::AVHWDeviceType> {
        match self {
            HwAccel::Vaapi => Some(ffi::AVHWDeviceType::AV_HWDEVICE_TYPE_VAAPI),
            HwAccel::Qsv => Some(ffi::AVHWDeviceType::AV_HWDEVICE_TYPE_QSV),
            HwAccel::Cuda => Some(ffi::AVHWDeviceType::AV_HWDEVICE_TYPE_CUDA),
            HwAccel::None => None,
        }
    }

    /// Pixel format of the surfaces the encoder consumes when frames are uploaded.
    pub(crate) fn surface_format(self) -> Option<ffi::AVPixelFormat> {
        match self {
            HwAccel::Vaapi => Some(ffi::AVPixelFormat::AV_PIX_FMT_VAAPI),
            HwAccel::Qsv => Some(ffi::AVPixelFormat::AV_PIX_FMT_QSV),
            HwAccel::Cuda | HwAccel::None => None,
        }
    }

    pub fn needs_device(self) -> bool {
        self.device_type().is_some()
    }

    pub fn uploads_frames(self) -> bool {
        self.surface_format().is_some()
    }
}

/// Try to find a hardware-accelerated encoder for a generic codec name.
/// Returns the first available hardware encoder, or None if none is found.
pub fn find_hw_encoder(codec_name: &str) -> Option<ffmpeg_next::Codec> {
    let hw_names: &[&str] = match codec_name {
        "h264" => &["h264_vaapi", "h264_nvenc", "h264_qsv", "h264_v4l2m2m"],
        "hevc" | "h265" => &["hevc_vaapi", "hevc_nvenc", "hevc_qsv", "hevc_v4l2m2m"],
        "vp9" => &["vp9_vaapi", "vp9_qsv"],
        "av1" => &["av1_vaapi", "av1_nvenc", "av1_qsv"],
        _ => &[],
    };

    for name in hw_names {
        if let Some(codec) = ffmpeg_next::encoder::find_by_name(name) {
            log::info!("found hardware encoder: {}", name);
            return Some(codec);
        }
    }
    None
}

/// Parses an FFmpeg pixel format name such as "nv12" or "yuv420p".
pub fn pixel_format(name: &str) -> anyhow::Result<Pixel> {
    let c_name = CString::new(name)?;
    let format = unsafe { ffi::av_get_pix_fmt(c_name.as_ptr()) };
    if format == ffi::AVPixelFormat::AV_PIX_FMT_NONE {
        anyhow::bail!("unknown pixel format: {}", name);
    }
    Ok(Pixel::from(format))
}

/// Owned reference to an FFmpeg hardware device context.
pub struct HwDevice {
    device_ref: *mut ffi::AVBufferRef,
    accel: HwAccel,
}

unsafe impl Send for HwDevice {}

impl HwDevice {
    /// Opens the device for `accel`. `device` is a driver specific path such as
    /// "/dev/dri/renderD128"; None lets the driver pick its default.
    pub fn open(accel: HwAccel, device: Option<&str>) -> anyhow::Result<Self> {
        let device_type = accel
            .device_type()
            .ok_or_else(|| anyhow::anyhow!("{:?} has no hardware device", accel))?;
        let device = device.map(CString::new).transpose()?;

        let mut device_ref: *mut ffi::AVBufferRef = ptr::null_mut();
        let ret = unsafe {
            ffi::av_hwdevice_ctx_create(
                &mut device_ref,
                device_type,
                device.as_ref().map_or(ptr::null(), |d| d.as_ptr()),
                ptr::null_mut(),
                0,
            )
        };
        if ret < 0 {
            anyhow::bail!(
                "failed to create {:?} device {:?}: {}",
                accel,
                device,
                ffmpeg_next::Error::from(ret)
            );
        }

        log::debug!("opened {:?} device {:?}", accel, device);
        Ok(Self { device_ref, accel })
    }

    pub fn accel(&self) -> HwAccel {
        self.accel
    }

    pub(crate) fn as_ptr(&self) -> *mut ffi::AVBufferRef {
        self.device_ref
    }
}

impl Drop for HwDevice {
    fn drop(&mut self) {
        unsafe { ffi::av_buffer_unref(&mut self.device_ref) };
    }
}

/// Pool of hardware surfaces that raw frames are uploaded into before encoding.
pub struct HwFrames {
    frames_ref: *mut ffi::AVBufferRef,
}

unsafe impl Send for HwFrames {}

impl HwFrames {
    pub fn new(
        device: &HwDevice,
        sw_format: Pixel,
        width: u32,
        height: u32,
    ) -> anyhow::Result<Self> {
        let surface_format = device.accel().surface_format().ok_or_else(|| {
            anyhow::anyhow!("{:?} does not use a hardware frame pool", device.accel())
        })?;

        unsafe {
            let mut frames_ref = ffi::av_hwframe_ctx_alloc(device.as_ptr());
            if frames_ref.is_null() {
                anyhow::bail!("failed to allocate hardware frames context");
            }

            let ctx = (*frames_ref).data as *mut ffi::AVHWFramesContext;
            (*ctx).format = surface_format;
            (*ctx).sw_format = sw_format.into();
            (*ctx).width = width as i32;
            (*ctx).height = height as i32;
            (*ctx).initial_pool_size = FRAME_POOL_SIZE;

            let ret = ffi::av_hwframe_ctx_init(frames_ref);
            if ret < 0 {
                ffi::av_buffer_unref(&mut frames_ref);
                anyhow::bail!(
                    "failed to initialize hardware frames context ({:?} {}x{}): {}",
                    sw_format,
                    width,
                    height,
                    ffmpeg_next::Error::from(ret)
                );
            }

            Ok(Self { frames_ref })
        }
    }

    pub(crate) fn as_ptr(&self) -> *mut ffi::AVBufferRef {
        self.frames_ref
    }

    /// Copies a system memory frame into a fresh surface from the pool.
    pub fn upload(
        &self,
        src: &ffmpeg_next::frame::Video,
    ) -> anyhow::Result<ffmpeg_next::frame::Video> {
        let mut surface = ffmpeg_next::frame::Video::empty();
        unsafe {
            let ret = ffi::av_hwframe_get_buffer(self.frames_ref, surface.as_mut_ptr(), 0);
            if ret < 0 {
                anyhow::bail!(
                    "failed to get hardware surface: {}",
                    ffmpeg_next::Error::from(ret)
                );
            }
            let ret = ffi::av_hwframe_transfer_data(surface.as_mut_ptr(), src.as_ptr(), 0);
            if ret < 0 {
                anyhow::bail!(
                    "failed to upload frame to hardware: {}",
                    ffmpeg_next::Error::from(ret)
                );
            }
        }
        Ok(surface)
    }
}

impl Drop for HwFrames {
    fn drop(&mut self) {
        unsafe { ffi::av_buffer_unref(&mut self.frames_ref) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accel_for_encoder() {
        assert_eq!(HwAccel::for_encoder("h264_vaapi"), HwAccel::Vaapi);
        assert_eq!(HwAccel::for_encoder("hevc_qsv"), HwAccel::Qsv);
        assert_eq!(HwAccel::for_encoder("av1_nvenc"), HwAccel::Cuda);
        assert_eq!(HwAccel::for_encoder("h264_v4l2m2m"), HwAccel::None);
        assert_eq!(HwAccel::for_encoder("libx264"), HwAccel::None);
    }

    #[test]
    fn test_accel_upload_paths() {
        assert!(HwAccel::Vaapi.uploads_frames());
        assert!(HwAccel::Qsv.uploads_frames());
        assert!(!HwAccel::Cuda.uploads_frames());
        assert!(HwAccel::Cuda.needs_device());
        assert!(!HwAccel::None.needs_device());
    }

    #[test]
    fn test_pixel_format() {
        assert_eq!(pixel_format("nv12").unwrap(), Pixel::NV12);
        assert_eq!(pixel_format("yuv420p").unwrap(), Pixel::YUV420P);
        assert!(pixel_format("not-a-format").is_err());
    }

    #[test]
    fn test_find_hw_encoder_unknown_codec() {
        assert!(find_hw_encoder("mjpeg").is_none());
    }

    #[test]
    fn test_open_device_without_hw_accel() {
        assert!(HwDevice::open(HwAccel::None, None).is_err());
    }
}
