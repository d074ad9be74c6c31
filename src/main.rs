use std::time::{Duration, Instant};

use nhve::{Frame, HwConfig, NetConfig, Session, StreamConfig};
use tokio_util::sync::CancellationToken;

const USAGE: &str = "usage:
  nhve <host> <port> <seconds> [device]
  nhve --config <config.json> <seconds>

examples:
  nhve 127.0.0.1 9766 10
  nhve 127.0.0.1 9766 10 /dev/dri/renderD128";

fn init_logging() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .filter_module("nhve", log::LevelFilter::Debug)
        .filter_module("hve", log::LevelFilter::Debug)
        .init();
}

/// Returns the stream configuration and the number of frames to send.
fn parse_args(args: &[String]) -> anyhow::Result<(StreamConfig, u64)> {
    let (config, seconds) = match args {
        [flag, path, seconds] if flag == "--config" => (StreamConfig::from_file(path)?, seconds),
        [host, port, seconds, device @ ..] if device.len() <= 1 => {
            let port = port
                .parse()
                .map_err(|e| anyhow::anyhow!("invalid port {}: {}", port, e))?;
            let config = StreamConfig {
                net: NetConfig::new(host, port),
                hw: vec![HwConfig {
                    device: device.first().cloned(),
                    ..Default::default()
                }],
            };
            (config, seconds)
        }
        _ => anyhow::bail!("{}", USAGE),
    };

    let seconds: u32 = seconds
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid seconds {}: {}", seconds, e))?;
    let hw = &config.hw[0];
    if hw.framerate == 0 {
        anyhow::bail!("framerate must be positive");
    }
    if hw.pixel_format.as_deref().unwrap_or("nv12") != "nv12" {
        anyhow::bail!("test pattern is nv12 only");
    }
    Ok((config, u64::from(seconds) * u64::from(hw.framerate)))
}

/// Moving diagonal gradient with slowly cycling chroma.
fn fill_test_pattern(y: &mut [u8], uv: &mut [u8], width: usize, frame: u64) {
    let shift = frame.wrapping_mul(3) as u8;
    for (row, line) in y.chunks_mut(width).enumerate() {
        for (col, pixel) in line.iter_mut().enumerate() {
            *pixel = ((col + row) as u8).wrapping_add(shift);
        }
    }
    let u = 64 + (frame % 128) as u8;
    let v = 192 - (frame % 128) as u8;
    for pair in uv.chunks_mut(2) {
        pair[0] = u;
        if let Some(second) = pair.get_mut(1) {
            *second = v;
        }
    }
}

/// Blocking streaming loop, runs until `frames` are sent or `cancel` fires.
fn stream(config: StreamConfig, frames: u64, cancel: CancellationToken) -> anyhow::Result<()> {
    let mut session = Session::init_multi(&config.net, &config.hw)?;

    let hw = &config.hw[0];
    let (width, height) = (hw.width as usize, hw.height as usize);
    // NV12 chroma rows hold one UV pair per two pixels, rounded up
    let uv_linesize = width.div_ceil(2) * 2;
    let mut y = vec![0u8; width * height];
    let mut uv = vec![128u8; uv_linesize * height.div_ceil(2)];

    let start = Instant::now();
    let mut sent = 0;

    for f in 0..frames {
        if cancel.is_cancelled() {
            break;
        }
        fill_test_pattern(&mut y, &mut uv, width, f);
        // framenumber wraps at u16
        let frame = Frame::new(f as u16, &[(&y[..], width), (&uv[..], uv_linesize)]);
        if let Err(e) = session.send_frame(Some(&frame)) {
            log::error!("stream stopped at frame {}: {:#}", f, e);
            break;
        }
        sent += 1;

        let target = Duration::from_secs(f + 1) / hw.framerate;
        let elapsed = start.elapsed();
        if target > elapsed {
            std::thread::sleep(target - elapsed);
        }
    }

    let flushed = session.send_frame(None);
    session.close();
    log::info!("streamed {} frames in {:.1}s", sent, start.elapsed().as_secs_f32());
    flushed
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let args: Vec<String> = std::env::args().skip(1).collect();
    let (config, frames) = parse_args(&args)?;
    nhve::init()?;

    let cancel = CancellationToken::new();
    let handle_cancel = cancel.clone();
    let mut handle = tokio::task::spawn_blocking(move || stream(config, frames, handle_cancel));

    let result = tokio::select! {
        result = &mut handle => result,
        _ = tokio::signal::ctrl_c() => {
            log::info!("ctrl+c received");
            cancel.cancel();
            handle.await
        }
    };
    result?
}
