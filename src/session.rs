//! Session: one network streamer plus a fixed number of hardware encoders,
//! driven frame by frame.

use crate::{
    backend::{Backend, HardwareBackend, HardwareEncoder},
    config::{HwConfig, NetConfig},
    frame::Frame,
    net::{NetFrame, NetworkStreamer, UdpStreamer},
};

enum Slot<E> {
    Uninitialized,
    Ready {
        encoder: E,
        // tag for packets drained by a flush without a frame
        last_framenumber: u16,
    },
}

impl<E: HardwareEncoder> Slot<E> {
    fn close(&mut self, index: usize) {
        if let Slot::Ready { mut encoder, .. } = std::mem::replace(self, Slot::Uninitialized) {
            if let Err(e) = encoder.close() {
                log::warn!("nhve: failed to close hardware encoder {}: {}", index, e);
            }
        }
    }
}

/// Owns the network streamer and the encoder slots.
///
/// Not meant for concurrent use; every call blocks until the encoder and the
/// network have finished with the submission.
pub struct Session<E: HardwareEncoder = hve::Encoder, N: NetworkStreamer = UdpStreamer> {
    network_streamer: Option<N>,
    hardware_encoders: Vec<Slot<E>>,
}

impl Session {
    /// Single encoder session on the FFmpeg hardware backend.
    pub fn init(net_config: &NetConfig, hw_config: &HwConfig) -> anyhow::Result<Self> {
        Self::init_multi(net_config, std::slice::from_ref(hw_config))
    }

    /// One encoder per entry of `hw_configs`, slot i configured by `hw_configs[i]`.
    pub fn init_multi(net_config: &NetConfig, hw_configs: &[HwConfig]) -> anyhow::Result<Self> {
        Self::init_multi_with(&mut HardwareBackend, net_config, hw_configs)
    }
}

impl<E: HardwareEncoder, N: NetworkStreamer> Session<E, N> {
    /// Connects the network client first, then opens encoders in slot order.
    /// On any failure everything acquired so far is closed and the error returned.
    pub fn init_multi_with<B>(
        backend: &mut B,
        net_config: &NetConfig,
        hw_configs: &[HwConfig],
    ) -> anyhow::Result<Self>
    where
        B: Backend<Encoder = E, Streamer = N>,
    {
        if hw_configs.is_empty() {
            log::error!("nhve: no hardware encoders configured");
            anyhow::bail!("no hardware encoders configured");
        }

        let mut hardware_encoders = Vec::new();
        if let Err(e) = hardware_encoders.try_reserve_exact(hw_configs.len()) {
            log::error!("nhve: not enough memory for hardware encoders");
            return Err(anyhow::anyhow!(
                "not enough memory for {} hardware encoders: {}",
                hw_configs.len(),
                e
            ));
        }
        hardware_encoders.extend(hw_configs.iter().map(|_| Slot::Uninitialized));

        let mut session = Self {
            network_streamer: None,
            hardware_encoders,
        };

        match backend.init_client(net_config) {
            Ok(streamer) => session.network_streamer = Some(streamer),
            Err(e) => {
                log::error!("nhve: failed to initialize network client: {}", e);
                session.close();
                return Err(e.context(format!(
                    "failed to initialize network client {}:{}",
                    net_config.address, net_config.port
                )));
            }
        }

        for (index, hw_config) in hw_configs.iter().enumerate() {
            match backend.init_encoder(hw_config) {
                Ok(encoder) => {
                    session.hardware_encoders[index] = Slot::Ready {
                        encoder,
                        last_framenumber: 0,
                    };
                }
                Err(e) => {
                    log::error!("nhve: failed to initialize hardware encoder {}: {}", index, e);
                    session.close();
                    return Err(e.context(format!(
                        "failed to initialize hardware encoder {}",
                        index
                    )));
                }
            }
        }

        log::info!(
            "nhve: session streaming to {}:{} with {} encoder(s)",
            net_config.address,
            net_config.port,
            hw_configs.len()
        );
        Ok(session)
    }

    pub fn encoders_len(&self) -> usize {
        self.hardware_encoders.len()
    }

    /// Direct access to the encoder in `slot`, for callers running extra slots themselves.
    pub fn encoder_mut(&mut self, slot: usize) -> Option<&mut E> {
        match self.hardware_encoders.get_mut(slot) {
            Some(Slot::Ready { encoder, .. }) => Some(encoder),
            _ => None,
        }
    }

    pub fn network_streamer_mut(&mut self) -> Option<&mut N> {
        self.network_streamer.as_mut()
    }

    /// Encodes `frame` on slot 0 and streams every resulting packet.
    ///
    /// `None` flushes the encoder; drained packets are tagged with the framenumber of
    /// the last frame submitted to the slot (0 before any). Use `Frame::flush` to
    /// choose the tag explicitly.
    ///
    /// An encoder may need several frames before it emits anything, so sending no
    /// packets is not an error. On a network failure the remaining packets of this
    /// submission are dropped.
    pub fn send_frame(&mut self, frame: Option<&Frame<'_>>) -> anyhow::Result<()> {
        self.send_frame_to(0, frame)
    }

    /// Same as `send_frame` on an arbitrary slot.
    pub fn send_frame_to(&mut self, slot: usize, frame: Option<&Frame<'_>>) -> anyhow::Result<()> {
        let Session {
            network_streamer,
            hardware_encoders,
        } = self;
        let configured = hardware_encoders.len();
        let network_streamer = network_streamer
            .as_mut()
            .ok_or(anyhow::anyhow!("session closed"))?;
        let (encoder, last_framenumber) = match hardware_encoders.get_mut(slot) {
            Some(Slot::Ready {
                encoder,
                last_framenumber,
            }) => (encoder, last_framenumber),
            Some(Slot::Uninitialized) => {
                anyhow::bail!("hardware encoder {} not initialized", slot)
            }
            None => anyhow::bail!(
                "no hardware encoder {} ({} configured)",
                slot,
                configured
            ),
        };

        let framenumber = match frame {
            Some(frame) => {
                *last_framenumber = frame.framenumber;
                frame.framenumber
            }
            None => *last_framenumber,
        };

        if let Err(e) = encoder.send_frame(frame.map(|f| &f.planes)) {
            log::error!("nhve: failed to send frame to hardware: {}", e);
            return Err(e.context("failed to send frame to hardware"));
        }

        loop {
            let packet = match encoder.receive_packet() {
                Ok(Some(packet)) => packet,
                Ok(None) => break,
                Err(e) => {
                    log::error!("nhve: failed to encode frame: {}", e);
                    return Err(e.context("failed to encode frame"));
                }
            };

            let network_frame = NetFrame {
                framenumber,
                data: packet,
            };
            if let Err(e) = network_streamer.send(&network_frame) {
                log::error!("nhve: failed to send frame {}: {}", framenumber, e);
                return Err(e.context(format!("failed to send frame {}", framenumber)));
            }
        }

        Ok(())
    }

    /// Closes the network streamer, then every encoder in slot order.
    /// Failures are logged, never returned.
    pub fn close(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if let Some(mut streamer) = self.network_streamer.take() {
            if let Err(e) = streamer.close() {
                log::warn!("nhve: failed to close network streamer: {}", e);
            }
        }
        for (index, slot) in self.hardware_encoders.iter_mut().enumerate() {
            slot.close(index);
        }
        self.hardware_encoders = Vec::new();
    }
}

impl<E: HardwareEncoder, N: NetworkStreamer> Drop for Session<E, N> {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod session_test;
