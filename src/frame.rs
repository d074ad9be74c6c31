use hve::RawVideoFrame;

/// One submission to a session: the caller's framenumber and the borrowed planes
/// of the raw frame. Every packet the encoder emits for this submission is tagged
/// with `framenumber`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Frame<'a> {
    pub framenumber: u16,
    pub planes: RawVideoFrame<'a>,
}

impl<'a> Frame<'a> {
    /// `planes` are `(data, linesize)` pairs in the encoder's pixel format order,
    /// e.g. Y then interleaved UV for nv12.
    pub fn new(framenumber: u16, planes: &[(&'a [u8], usize)]) -> Self {
        Self {
            framenumber,
            planes: RawVideoFrame::new(planes),
        }
    }

    /// Flush without new pixel data; drained packets are tagged with `framenumber`.
    pub fn flush(framenumber: u16) -> Self {
        Self {
            framenumber,
            planes: RawVideoFrame::default(),
        }
    }

    pub fn is_flush(&self) -> bool {
        self.planes.is_flush()
    }
}
