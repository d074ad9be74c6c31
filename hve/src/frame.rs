use ffmpeg_next::ffi;

/// Maximum number of pixel planes a raw frame can carry.
pub const MAX_PLANES: usize = 4;

/// Borrowed pixel planes of one raw video frame, laid out the way the caller
/// captured them. Nothing is copied until the frame is submitted to an encoder.
///
/// A frame without a first plane means "flush".
#[derive(Clone, Copy, Debug, Default)]
pub struct RawVideoFrame<'a> {
    pub data: [Option<&'a [u8]>; MAX_PLANES],
    /// Row stride in bytes of each plane.
    pub linesize: [usize; MAX_PLANES],
}

impl<'a> RawVideoFrame<'a> {
    /// Builds a frame from `(plane, linesize)` pairs; extra pairs past `MAX_PLANES` are ignored.
    pub fn new(planes: &[(&'a [u8], usize)]) -> Self {
        let mut frame = Self::default();
        for (index, (plane, linesize)) in planes.iter().take(MAX_PLANES).enumerate() {
            frame.data[index] = Some(*plane);
            frame.linesize[index] = *linesize;
        }
        frame
    }

    pub fn is_flush(&self) -> bool {
        self.data[0].is_none()
    }

    /// Copies the planes into `dst` row by row, honouring both the source linesize
    /// and the destination stride.
    pub fn copy_to(&self, dst: &mut ffmpeg_next::frame::Video) -> anyhow::Result<()> {
        let planes = dst.planes();
        if let Some(extra) = (planes..MAX_PLANES).find(|&i| self.data[i].is_some()) {
            anyhow::bail!(
                "frame has plane {} but pixel format {:?} has {} planes",
                extra,
                dst.format(),
                planes
            );
        }

        for index in 0..planes {
            let src = self.data[index]
                .ok_or_else(|| anyhow::anyhow!("missing plane {} for {:?}", index, dst.format()))?;
            let linesize = self.linesize[index];
            if linesize == 0 {
                anyhow::bail!("plane {} has zero linesize", index);
            }

            let row_bytes = unsafe {
                ffi::av_image_get_linesize(dst.format().into(), dst.width() as i32, index as i32)
            };
            if row_bytes <= 0 {
                anyhow::bail!("cannot compute row width of plane {} for {:?}", index, dst.format());
            }
            let row_bytes = row_bytes as usize;
            if linesize < row_bytes {
                anyhow::bail!(
                    "plane {} linesize {} is shorter than its {} byte rows",
                    index,
                    linesize,
                    row_bytes
                );
            }

            let stride = dst.stride(index);
            let rows = dst.plane_height(index) as usize;
            if rows == 0 {
                continue;
            }

            let needed = (rows - 1) * linesize + row_bytes;
            if src.len() < needed {
                anyhow::bail!(
                    "plane {} too short: {} bytes, need {} ({} rows of linesize {})",
                    index,
                    src.len(),
                    needed,
                    rows,
                    linesize
                );
            }

            let dst_plane = dst.data_mut(index);
            for row in 0..rows {
                let src_row = &src[row * linesize..row * linesize + row_bytes];
                dst_plane[row * stride..row * stride + row_bytes].copy_from_slice(src_row);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ffmpeg_next::format::Pixel;

    #[test]
    fn test_new_and_flush() {
        let y = [0u8; 16];
        let frame = RawVideoFrame::new(&[(&y[..], 4)]);
        assert!(!frame.is_flush());
        assert_eq!(frame.linesize[0], 4);
        assert!(frame.data[1].is_none());

        assert!(RawVideoFrame::default().is_flush());
    }

    #[test]
    fn test_copy_nv12_with_padding() {
        // 4x2 NV12, caller rows padded to 6 bytes
        let y: Vec<u8> = (0..12).collect();
        let uv: Vec<u8> = (100..106).collect();
        let frame = RawVideoFrame::new(&[(&y[..], 6), (&uv[..], 6)]);

        let mut dst = ffmpeg_next::frame::Video::new(Pixel::NV12, 4, 2);
        frame.copy_to(&mut dst).unwrap();

        let stride = dst.stride(0);
        assert_eq!(&dst.data(0)[..4], &[0, 1, 2, 3]);
        assert_eq!(&dst.data(0)[stride..stride + 4], &[6, 7, 8, 9]);
        assert_eq!(&dst.data(1)[..4], &[100, 101, 102, 103]);
    }

    #[test]
    fn test_copy_rejects_short_plane() {
        let y = [0u8; 8];
        let uv = [0u8; 8];
        let frame = RawVideoFrame::new(&[(&y[..], 8), (&uv[..], 8)]);
        let mut dst = ffmpeg_next::frame::Video::new(Pixel::NV12, 8, 8);
        assert!(frame.copy_to(&mut dst).is_err());
    }

    #[test]
    fn test_copy_rejects_short_linesize() {
        // 8 byte rows but linesize 4, total size would pass the length check
        let y = [0u8; 32];
        let uv = [0u8; 32];
        let frame = RawVideoFrame::new(&[(&y[..], 4), (&uv[..], 8)]);
        let mut dst = ffmpeg_next::frame::Video::new(Pixel::NV12, 8, 8);
        assert!(frame.copy_to(&mut dst).is_err());
    }

    #[test]
    fn test_copy_nv12_odd_width() {
        // 5x2 NV12: chroma rows hold 3 UV pairs, 6 bytes
        let y: Vec<u8> = (0..10).collect();
        let uv: Vec<u8> = (100..106).collect();

        let mut dst = ffmpeg_next::frame::Video::new(Pixel::NV12, 5, 2);
        let short = RawVideoFrame::new(&[(&y[..], 5), (&uv[..5], 5)]);
        assert!(short.copy_to(&mut dst).is_err());

        let frame = RawVideoFrame::new(&[(&y[..], 5), (&uv[..], 6)]);
        frame.copy_to(&mut dst).unwrap();
        assert_eq!(&dst.data(0)[..5], &[0, 1, 2, 3, 4]);
        assert_eq!(&dst.data(1)[..6], &[100, 101, 102, 103, 104, 105]);
    }

    #[test]
    fn test_copy_rejects_missing_plane() {
        let y = [0u8; 64];
        let frame = RawVideoFrame::new(&[(&y[..], 8)]);
        let mut dst = ffmpeg_next::frame::Video::new(Pixel::NV12, 8, 8);
        assert!(frame.copy_to(&mut dst).is_err());
    }

    #[test]
    fn test_copy_rejects_extra_plane() {
        let plane = [0u8; 64];
        let frame = RawVideoFrame::new(&[(&plane[..], 8), (&plane[..], 8), (&plane[..], 8)]);
        let mut dst = ffmpeg_next::frame::Video::new(Pixel::NV12, 8, 8);
        assert!(frame.copy_to(&mut dst).is_err());
    }
}
