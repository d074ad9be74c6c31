//! Network side of the session: a streamer takes framenumber-tagged encoded
//! packets and puts them on the wire.

use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

use bytes::{BufMut, BytesMut};

use crate::config::NetConfig;

/// Max payload bytes per datagram, keeps datagrams under a typical ethernet MTU.
pub const MAX_PAYLOAD: usize = 1400;
/// framenumber, packet count, packet index (u16 big endian each)
pub const HEADER_SIZE: usize = 6;

/// One encoded packet on its way to the network, valid for a single send.
#[derive(Debug, Clone, Copy)]
pub struct NetFrame<'a> {
    pub framenumber: u16,
    pub data: &'a [u8],
}

pub trait NetworkStreamer {
    fn send(&mut self, frame: &NetFrame<'_>) -> anyhow::Result<()>;

    fn close(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Plain datagram streamer: each frame is split into `MAX_PAYLOAD` chunks, every
/// chunk prefixed with a `HEADER_SIZE` header. No retransmission, no pacing.
pub struct UdpStreamer {
    socket: Option<UdpSocket>,
    peer: SocketAddr,
    buffer: BytesMut,
}

impl UdpStreamer {
    pub fn connect(config: &NetConfig) -> anyhow::Result<Self> {
        let peer = (config.address.as_str(), config.port)
            .to_socket_addrs()?
            .next()
            .ok_or(anyhow::anyhow!(
                "no address for {}:{}",
                config.address,
                config.port
            ))?;
        let local = if peer.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(local)?;
        socket.connect(peer)?;
        log::info!("udp streamer {} -> {}", socket.local_addr()?, peer);

        Ok(Self {
            socket: Some(socket),
            peer,
            buffer: BytesMut::with_capacity(HEADER_SIZE + MAX_PAYLOAD),
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        let socket = self
            .socket
            .as_ref()
            .ok_or(anyhow::anyhow!("udp streamer closed"))?;
        Ok(socket.local_addr()?)
    }
}

impl NetworkStreamer for UdpStreamer {
    fn send(&mut self, frame: &NetFrame<'_>) -> anyhow::Result<()> {
        let socket = self
            .socket
            .as_ref()
            .ok_or(anyhow::anyhow!("udp streamer closed"))?;

        let packets = frame.data.len().div_ceil(MAX_PAYLOAD).max(1);
        if packets > u16::MAX as usize {
            anyhow::bail!(
                "frame {} too large: {} bytes",
                frame.framenumber,
                frame.data.len()
            );
        }

        for index in 0..packets {
            let start = index * MAX_PAYLOAD;
            let end = (start + MAX_PAYLOAD).min(frame.data.len());

            self.buffer.clear();
            self.buffer.put_u16(frame.framenumber);
            self.buffer.put_u16(packets as u16);
            self.buffer.put_u16(index as u16);
            self.buffer.put_slice(&frame.data[start..end]);
            socket.send(&self.buffer)?;
        }
        Ok(())
    }

    fn close(&mut self) -> anyhow::Result<()> {
        if self.socket.take().is_some() {
            log::debug!("udp streamer to {} closed", self.peer);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn receiver() -> (UdpSocket, NetConfig) {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        socket.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        let port = socket.local_addr().unwrap().port();
        (socket, NetConfig::new("127.0.0.1", port))
    }

    fn recv(socket: &UdpSocket) -> Vec<u8> {
        let mut buf = [0u8; HEADER_SIZE + MAX_PAYLOAD + 16];
        let n = socket.recv(&mut buf).unwrap();
        buf[..n].to_vec()
    }

    #[test]
    fn test_send_splits_into_datagrams() {
        let (rx, config) = receiver();
        let mut streamer = UdpStreamer::connect(&config).unwrap();
        assert_eq!(streamer.peer_addr(), rx.local_addr().unwrap());

        let data: Vec<u8> = (0..3000u32).map(|i| i as u8).collect();
        streamer
            .send(&NetFrame {
                framenumber: 7,
                data: &data,
            })
            .unwrap();

        let mut payload = Vec::new();
        for index in 0..3u16 {
            let datagram = recv(&rx);
            assert_eq!(&datagram[0..2], &7u16.to_be_bytes());
            assert_eq!(&datagram[2..4], &3u16.to_be_bytes());
            assert_eq!(&datagram[4..6], &index.to_be_bytes());
            payload.extend_from_slice(&datagram[HEADER_SIZE..]);
        }
        assert_eq!(payload, data);
    }

    #[test]
    fn test_send_empty_frame() {
        let (rx, config) = receiver();
        let mut streamer = UdpStreamer::connect(&config).unwrap();
        streamer
            .send(&NetFrame {
                framenumber: 1,
                data: &[],
            })
            .unwrap();

        let datagram = recv(&rx);
        assert_eq!(datagram, vec![0, 1, 0, 1, 0, 0]);
    }

    #[test]
    fn test_send_after_close_fails() {
        let (_rx, config) = receiver();
        let mut streamer = UdpStreamer::connect(&config).unwrap();
        streamer.close().unwrap();
        streamer.close().unwrap();
        assert!(streamer.local_addr().is_err());
        assert!(
            streamer
                .send(&NetFrame {
                    framenumber: 1,
                    data: &[1, 2, 3],
                })
                .is_err()
        );
    }
}
