//! Core library for the Chromatic ambient lighting controller.
//!
//! A [`ControlLoop`] samples frames from a [`CaptureDevice`], reduces each
//! configured [`Region`] to one colour with a [`ColorExtractor`], and streams
//! the colours to a [`LightSink`]. Front ends drive the loop through a
//! [`ControlHandle`].

pub mod color;
pub mod config;
pub mod control;
pub mod device;
pub mod error;
pub mod extract;
pub mod rate;
pub mod region;

pub use color::Color;
pub use config::{AppConfig, ExtractionConfig, LightBinding, VideoConfig};
pub use control::{
    channel, Command, CommandReceiver, ControlHandle, ControlLoop, RunState, StatusSnapshot,
    TickOutcome,
};
pub use device::{
    CaptureConfig, CaptureDevice, CaptureProfile, ChromaSample, LightSink, LightStream,
    PixelFormat,
};
pub use error::{ChromaticError, Result};
pub use extract::{
    decode_frame, frame_from_image, ColorExtractor, ColorSample, ExtractMode, Fanout, Frame,
    DEFAULT_DOWNSAMPLE_WIDTH,
};
pub use rate::RateCounter;
pub use region::{PixelPoint, PixelRect, Preset, Region, RegionId};
