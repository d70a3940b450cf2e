//! Capability traits for the hardware the control loop drives.
//!
//! Concrete backends (a V4L camera, a Hue entertainment stream, the stand-ins
//! shipped with the binary) implement these traits; the core only owns their
//! lifecycle.

use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{region::RegionId, ChromaticError, Result};

/// Per-tick payload pushed to the light stream: `[x, y, Y]` per light.
pub type ChromaSample = BTreeMap<RegionId, [f32; 3]>;

/// Pixel encoding requested from the capture device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    #[default]
    Mjpeg,
    Yuyv,
}

/// Resolution and rate the capture device should deliver, written as
/// `WIDTHxHEIGHT@FPS` in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CaptureProfile {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for CaptureProfile {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fps: 30,
        }
    }
}

impl FromStr for CaptureProfile {
    type Err = ChromaticError;

    fn from_str(value: &str) -> Result<Self> {
        let invalid = || {
            ChromaticError::invalid(format!(
                "capture profile `{value}` is not of the form WIDTHxHEIGHT@FPS"
            ))
        };

        let (size, fps) = value.trim().split_once('@').ok_or_else(invalid)?;
        let (width, height) = size.split_once(|c: char| c == 'x' || c == 'X').ok_or_else(invalid)?;
        let parse = |field: &str| -> Result<u32> {
            match field.trim().parse::<u32>() {
                Ok(number) if number > 0 => Ok(number),
                _ => Err(invalid()),
            }
        };

        Ok(Self {
            width: parse(width)?,
            height: parse(height)?,
            fps: parse(fps)?,
        })
    }
}

impl TryFrom<String> for CaptureProfile {
    type Error = ChromaticError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<CaptureProfile> for String {
    fn from(profile: CaptureProfile) -> Self {
        profile.to_string()
    }
}

impl fmt::Display for CaptureProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}@{}", self.width, self.height, self.fps)
    }
}

/// Full capture configuration negotiated with the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CaptureConfig {
    pub profile: CaptureProfile,
    pub format: PixelFormat,
}

/// A video source producing encoded frames.
pub trait CaptureDevice: Send {
    fn config(&self) -> Result<CaptureConfig>;

    fn set_config(&mut self, config: &CaptureConfig) -> Result<()>;

    /// Starts streaming. Frames are only available while the device is on.
    fn turn_on(&mut self) -> Result<()>;

    fn turn_off(&mut self) -> Result<()>;

    /// Returns the raw bytes of the next frame.
    fn capture(&mut self) -> Result<Vec<u8>>;
}

/// Something that can open a colour stream to a group of lights.
pub trait LightSink: Send {
    type Stream: LightStream;

    fn start_stream(&mut self) -> Result<Self::Stream>;
}

/// An open colour stream.
pub trait LightStream: Send {
    /// Pushes one colour per light. Lights missing from the sample keep their
    /// current colour.
    fn set(&mut self, colors: &ChromaSample) -> Result<()>;

    fn stop_stream(&mut self) -> Result<()>;
}
