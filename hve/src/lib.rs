/// Registers FFmpeg components. Call once at startup before opening any encoder.
pub fn init() -> anyhow::Result<()> {
    ffmpeg_next::init().map_err(|e| anyhow::anyhow!("ffmpeg_next init: {}", e))
}

pub mod encoder;
pub mod frame;
pub mod hw;

pub use encoder::{Encoder, Settings};
pub use frame::{MAX_PLANES, RawVideoFrame};
