use anyhow::{bail, Result};
use common_io::{Chromaticity, HdrMetadata, PixelFormat};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    pub playout: PlayoutCfg,
    pub hdr: Option<HdrCfg>,
}

impl AppConfig {
    pub fn from_file(p: &str) -> Result<Self> {
        let content = std::fs::read_to_string(p)?;
        let config: AppConfig = toml::from_str(&content)?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlayoutCfg {
    /// Substring match against discovered device display names; empty
    /// takes the first usable device.
    #[serde(default)]
    pub device_name: String,
    pub mode_name: String,
    #[serde(default = "default_pixel_format")]
    pub pixel_format: String,
    #[serde(default = "default_speed")]
    pub speed: f64,
    #[serde(default = "default_preroll_frames")]
    pub preroll_frames: u32,
}

impl PlayoutCfg {
    pub fn pixel_format(&self) -> Result<PixelFormat> {
        match self.pixel_format.as_str() {
            "bgra8" => Ok(PixelFormat::Bgra8),
            "rgb10" => Ok(PixelFormat::Rgb10),
            other => bail!("unknown pixel format '{other}' (expected bgra8 or rgb10)"),
        }
    }
}

impl Default for PlayoutCfg {
    fn default() -> Self {
        Self {
            device_name: String::new(),
            mode_name: "1080p25".to_string(),
            pixel_format: default_pixel_format(),
            speed: default_speed(),
            preroll_frames: default_preroll_frames(),
        }
    }
}

fn default_pixel_format() -> String {
    "rgb10".to_string()
}

fn default_speed() -> f64 {
    1.0
}

fn default_preroll_frames() -> u32 {
    3
}

/// Static mastering metadata applied to every scheduled frame. Defaults
/// are the Rec.709 figures used when the section is omitted.
#[derive(Debug, Clone, Deserialize)]
pub struct HdrCfg {
    pub eotf: i64,
    #[serde(default = "default_red")]
    pub red: [f64; 2],
    #[serde(default = "default_green")]
    pub green: [f64; 2],
    #[serde(default = "default_blue")]
    pub blue: [f64; 2],
    #[serde(default = "default_white_point")]
    pub white_point: [f64; 2],
    #[serde(default = "default_max_mastering")]
    pub max_display_mastering_luminance: f64,
    #[serde(default = "default_min_mastering")]
    pub min_display_mastering_luminance: f64,
    #[serde(default = "default_max_cll")]
    pub max_content_light_level: f64,
    #[serde(default = "default_max_fall")]
    pub max_frame_average_light_level: f64,
}

impl HdrCfg {
    pub fn to_metadata(&self) -> HdrMetadata {
        let xy = |v: [f64; 2]| Chromaticity { x: v[0], y: v[1] };
        HdrMetadata {
            eotf: self.eotf,
            red: xy(self.red),
            green: xy(self.green),
            blue: xy(self.blue),
            white_point: xy(self.white_point),
            max_display_mastering_luminance: self.max_display_mastering_luminance,
            min_display_mastering_luminance: self.min_display_mastering_luminance,
            max_content_light_level: self.max_content_light_level,
            max_frame_average_light_level: self.max_frame_average_light_level,
            colorspace: common_io::Colorspace::Rec709,
        }
    }
}

fn default_red() -> [f64; 2] {
    [0.640, 0.330]
}

fn default_green() -> [f64; 2] {
    [0.300, 0.600]
}

fn default_blue() -> [f64; 2] {
    [0.150, 0.060]
}

fn default_white_point() -> [f64; 2] {
    [0.3127, 0.3290]
}

fn default_max_mastering() -> f64 {
    1000.0
}

fn default_min_mastering() -> f64 {
    0.0001
}

fn default_max_cll() -> f64 {
    1000.0
}

fn default_max_fall() -> f64 {
    50.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_playout_section() {
        let cfg: AppConfig = toml::from_str(
            r#"
            [playout]
            mode_name = "1080p25"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.playout.mode_name, "1080p25");
        assert_eq!(cfg.playout.pixel_format().unwrap(), PixelFormat::Rgb10);
        assert_eq!(cfg.playout.preroll_frames, 3);
        assert!(cfg.hdr.is_none());
    }

    #[test]
    fn hdr_section_fills_rec709_defaults() {
        let cfg: AppConfig = toml::from_str(
            r#"
            [playout]
            mode_name = "2160p50"
            pixel_format = "bgra8"

            [hdr]
            eotf = 2
            max_content_light_level = 4000.0
            "#,
        )
        .unwrap();
        let hdr = cfg.hdr.unwrap().to_metadata();
        assert_eq!(hdr.eotf, 2);
        assert_eq!(hdr.red.x, 0.640);
        assert_eq!(hdr.max_content_light_level, 4000.0);
        assert_eq!(hdr.max_frame_average_light_level, 50.0);
    }

    #[test]
    fn rejects_unknown_pixel_format() {
        let cfg = PlayoutCfg {
            pixel_format: "v210".to_string(),
            ..PlayoutCfg::default()
        };
        assert!(cfg.pixel_format().is_err());
    }
}
