use std::path::Path;

use serde::Deserialize;

/// Where encoded frames are streamed to.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct NetConfig {
    // host name or ip
    pub address: String,
    pub port: u16,
}

impl NetConfig {
    pub fn new(address: &str, port: u16) -> Self {
        Self {
            address: address.to_string(),
            port,
        }
    }
}

/// Hardware encoder configuration, one per encoder slot.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HwConfig {
    pub width: u32,
    pub height: u32,
    pub framerate: u32,
    // "/dev/dri/renderD128", None = driver default
    pub device: Option<String>,
    // "h264_vaapi", "hevc_vaapi", "h264_nvenc"..., None = h264_vaapi
    pub encoder: Option<String>,
    // "nv12", "yuv420p"..., None = nv12
    pub pixel_format: Option<String>,
    // FF_PROFILE_*, None = encoder default
    pub profile: Option<i32>,
    pub max_b_frames: u32,
    // bps, 0 = encoder default
    pub bit_rate: u64,
}

impl Default for HwConfig {
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

impl From<&HwConfig> for hve::Settings {
    fn from(config: &HwConfig) -> Self {
        Self {
            width: config.width,
            height: config.height,
            framerate: config.framerate,
            device: config.device.clone(),
            encoder: config.encoder.clone(),
            pixel_format: config.pixel_format.clone(),
            profile: config.profile,
            max_b_frames: config.max_b_frames,
            bit_rate: config.bit_rate,
        }
    }
}

/// Complete session configuration, as read from a JSON file.
#[derive(Clone, Debug, Deserialize)]
pub struct StreamConfig {
    pub net: NetConfig,
    pub hw: Vec<HwConfig>,
}

impl StreamConfig {
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let config: StreamConfig = serde_json::from_str(json)?;
        if config.hw.is_empty() {
            anyhow::bail!("config needs at least one hardware encoder");
        }
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("read config {}: {}", path.display(), e))?;
        Self::from_json(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json_fills_defaults() {
        let config = StreamConfig::from_json(
            r#"{
                "net": { "address": "127.0.0.1", "port": 9766 },
                "hw": [
                    { "width": 640, "height": 360, "device": "/dev/dri/renderD128" },
                    { "encoder": "hevc_vaapi", "bit_rate": 2000000 }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(config.net, NetConfig::new("127.0.0.1", 9766));
        assert_eq!(config.hw.len(), 2);
        assert_eq!(config.hw[0].width, 640);
        assert_eq!(config.hw[0].framerate, 30);
        assert_eq!(config.hw[0].device.as_deref(), Some("/dev/dri/renderD128"));
        assert!(config.hw[0].encoder.is_none());
        assert_eq!(config.hw[1].width, 1280);
        assert_eq!(config.hw[1].encoder.as_deref(), Some("hevc_vaapi"));
        assert_eq!(config.hw[1].bit_rate, 2_000_000);
    }

    #[test]
    fn test_from_json_rejects_empty_hw() {
        let result = StreamConfig::from_json(
            r#"{ "net": { "address": "127.0.0.1", "port": 9766 }, "hw": [] }"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_hw_config_to_settings() {
        let config = HwConfig {
            width: 1920,
            height: 1080,
            framerate: 60,
            device: Some("/dev/dri/renderD129".to_string()),
            encoder: Some("h264_vaapi".to_string()),
            pixel_format: Some("nv12".to_string()),
            profile: Some(100),
            max_b_frames: 2,
            bit_rate: 8_000_000,
        };
        let settings = hve::Settings::from(&config);
        assert_eq!(settings.width, 1920);
        assert_eq!(settings.height, 1080);
        assert_eq!(settings.framerate, 60);
        assert_eq!(settings.device.as_deref(), Some("/dev/dri/renderD129"));
        assert_eq!(settings.encoder.as_deref(), Some("h264_vaapi"));
        assert_eq!(settings.pixel_format.as_deref(), Some("nv12"));
        assert_eq!(settings.profile, Some(100));
        assert_eq!(settings.max_b_frames, 2);
        assert_eq!(settings.bit_rate, 8_000_000);
    }
}
