use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{
    device::{CaptureConfig, CaptureProfile, PixelFormat},
    ColorExtractor, ExtractMode, Fanout, Preset, Region, RegionId, Result,
    DEFAULT_DOWNSAMPLE_WIDTH,
};

/// Box size used for lights bound by position rather than by preset.
const DEFAULT_LIGHT_BOX_PCT: u32 = 20;

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub log_level: String,
    /// Address the HTTP control surface listens on.
    pub bind: String,
    pub video: VideoConfig,
    pub extraction: ExtractionConfig,
    pub lights: Vec<LightBinding>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            bind: "127.0.0.1:8080".to_string(),
            video: VideoConfig::default(),
            extraction: ExtractionConfig::default(),
            lights: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Reads a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Validates every light binding into a [`Region`].
    pub fn regions(&self) -> Result<Vec<Region>> {
        self.lights.iter().map(LightBinding::region).collect()
    }

    pub fn extractor(&self) -> ColorExtractor {
        ColorExtractor::new(self.extraction.mode, self.extraction.fanout)
            .with_downsample_width(self.extraction.downsample_width)
    }
}

/// Configuration specific to the capture device.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub device: PathBuf,
    pub profile: CaptureProfile,
    pub format: PixelFormat,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            device: PathBuf::from("/dev/video0"),
            profile: CaptureProfile::default(),
            format: PixelFormat::Mjpeg,
        }
    }
}

impl VideoConfig {
    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            profile: self.profile,
            format: self.format,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub mode: ExtractMode,
    pub fanout: Fanout,
    pub downsample_width: u32,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            mode: ExtractMode::Average,
            fanout: Fanout::Parallel,
            downsample_width: DEFAULT_DOWNSAMPLE_WIDTH,
        }
    }
}

/// Binds one physical light to the screen area it should mirror, either via a
/// [`Preset`] or via the light's position on the normalised grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LightBinding {
    pub id: RegionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset: Option<Preset>,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

impl LightBinding {
    pub fn region(&self) -> Result<Region> {
        match self.preset {
            Some(preset) => Ok(preset.region(self.id)),
            None => Region::new(
                self.id,
                self.x,
                self.y,
                self.width.unwrap_or(DEFAULT_LIGHT_BOX_PCT),
                self.height.unwrap_or(DEFAULT_LIGHT_BOX_PCT),
            ),
        }
    }
}
