//! Network hardware video encoder.
//!
//! Binds hardware video encoders and a network streamer into a per-frame pipeline:
//! raw frame in, encoded packets out to the network as soon as the encoder has them.
//!
//! ```no_run
//! use nhve::{Frame, HwConfig, NetConfig, Session};
//!
//! # fn main() -> anyhow::Result<()> {
//! nhve::init()?;
//! let net = NetConfig::new("127.0.0.1", 9766);
//! let hw = HwConfig {
//!     device: Some("/dev/dri/renderD128".to_string()),
//!     ..Default::default()
//! };
//! let mut session = Session::init(&net, &hw)?;
//!
//! let y = vec![0u8; 1280 * 720];
//! let uv = vec![128u8; 1280 * 360];
//! session.send_frame(Some(&Frame::new(0, &[(&y[..], 1280), (&uv[..], 1280)])))?;
//! session.send_frame(None)?;
//! session.close();
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod config;
pub mod frame;
pub mod net;
pub mod session;

pub use backend::{Backend, HardwareBackend, HardwareEncoder};
pub use config::{HwConfig, NetConfig, StreamConfig};
pub use frame::Frame;
pub use net::{NetFrame, NetworkStreamer, UdpStreamer};
pub use session::Session;

/// Registers FFmpeg components. Call once before creating a session.
pub fn init() -> anyhow::Result<()> {
    hve::init()
}
