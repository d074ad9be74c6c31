use hve::RawVideoFrame;

use crate::{
    config::{HwConfig, NetConfig},
    net::{NetworkStreamer, UdpStreamer},
};

/// Encoder side of the session. Packets returned by `receive_packet` are borrowed
/// from the encoder and only valid until the next call.
pub trait HardwareEncoder {
    /// `None` (or a frame without planes) flushes the encoder.
    fn send_frame(&mut self, frame: Option<&RawVideoFrame<'_>>) -> anyhow::Result<()>;

    /// `Ok(None)` when no packet is available right now, `Err` on encoding failure.
    fn receive_packet(&mut self) -> anyhow::Result<Option<&[u8]>>;

    fn close(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Creates the collaborators a session owns.
pub trait Backend {
    type Encoder: HardwareEncoder;
    type Streamer: NetworkStreamer;

    fn init_client(&mut self, config: &NetConfig) -> anyhow::Result<Self::Streamer>;

    fn init_encoder(&mut self, config: &HwConfig) -> anyhow::Result<Self::Encoder>;
}

/// FFmpeg hardware encoders streaming over UDP.
#[derive(Debug, Default, Clone, Copy)]
pub struct HardwareBackend;

impl Backend for HardwareBackend {
    type Encoder = hve::Encoder;
    type Streamer = UdpStreamer;

    fn init_client(&mut self, config: &NetConfig) -> anyhow::Result<UdpStreamer> {
        UdpStreamer::connect(config)
    }

    fn init_encoder(&mut self, config: &HwConfig) -> anyhow::Result<hve::Encoder> {
        hve::Encoder::open(&hve::Settings::from(config))
    }
}

impl HardwareEncoder for hve::Encoder {
    fn send_frame(&mut self, frame: Option<&RawVideoFrame<'_>>) -> anyhow::Result<()> {
        hve::Encoder::send_frame(self, frame)
    }

    fn receive_packet(&mut self) -> anyhow::Result<Option<&[u8]>> {
        hve::Encoder::receive_packet(self)
    }

    fn close(&mut self) -> anyhow::Result<()> {
        log::debug!(
            "closing encoder {} after {} frames",
            self.name(),
            self.frame_index()
        );
        Ok(())
    }
}
