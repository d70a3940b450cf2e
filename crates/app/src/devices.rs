//! Hardware stand-ins that let the loop run on any machine: frames come from
//! image files on disk and light colours are written out as JSON lines.

use std::{
    io::{self, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    thread,
    time::{Duration, Instant},
};

use chromatic_core::{
    CaptureConfig, CaptureDevice, ChromaSample, ChromaticError, LightSink, LightStream, Result,
};
use serde::Serialize;

/// Replays encoded frames from a file or a directory of files, in name
/// order, paced at the configured frame rate.
#[derive(Debug)]
pub struct FileCapture {
    source: PathBuf,
    frames: Vec<PathBuf>,
    next: usize,
    on: bool,
    config: CaptureConfig,
    last_frame: Option<Instant>,
}

impl FileCapture {
    pub fn open(source: impl AsRef<Path>) -> Result<Self> {
        let source = source.as_ref().to_path_buf();
        let mut frames = if source.is_dir() {
            std::fs::read_dir(&source)?
                .filter_map(|entry| entry.ok().map(|entry| entry.path()))
                .filter(|path| path.is_file() && image::ImageFormat::from_path(path).is_ok())
                .collect::<Vec<_>>()
        } else {
            vec![source.clone()]
        };
        frames.sort();

        if frames.is_empty() {
            return Err(ChromaticError::Capture(format!(
                "no frames found in {}",
                source.display()
            )));
        }

        tracing::info!(source = %source.display(), frames = frames.len(), "opened file capture");
        Ok(Self {
            source,
            frames,
            next: 0,
            on: false,
            config: CaptureConfig::default(),
            last_frame: None,
        })
    }

    fn frame_interval(&self) -> Duration {
        Duration::from_secs(1) / self.config.profile.fps.max(1)
    }
}

impl CaptureDevice for FileCapture {
    fn config(&self) -> Result<CaptureConfig> {
        Ok(self.config)
    }

    fn set_config(&mut self, config: &CaptureConfig) -> Result<()> {
        self.config = *config;
        Ok(())
    }

    fn turn_on(&mut self) -> Result<()> {
        if !self.source.exists() {
            return Err(ChromaticError::Capture(format!(
                "{} is no longer available",
                self.source.display()
            )));
        }
        self.on = true;
        self.last_frame = None;
        Ok(())
    }

    fn turn_off(&mut self) -> Result<()> {
        self.on = false;
        Ok(())
    }

    fn capture(&mut self) -> Result<Vec<u8>> {
        if !self.on {
            return Err(ChromaticError::Capture("device is turned off".into()));
        }

        if let Some(last) = self.last_frame {
            let wait = self.frame_interval().saturating_sub(last.elapsed());
            if !wait.is_zero() {
                thread::sleep(wait);
            }
        }
        self.last_frame = Some(Instant::now());

        let path = &self.frames[self.next];
        self.next = (self.next + 1) % self.frames.len();
        Ok(std::fs::read(path)?)
    }
}

type SharedWriter = Arc<Mutex<Box<dyn Write + Send>>>;

/// Light sink that prints every per-tick colour map as one JSON line.
pub struct JsonLinesSink {
    out: SharedWriter,
}

impl JsonLinesSink {
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self {
            out: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl LightSink for JsonLinesSink {
    type Stream = JsonLinesStream;

    fn start_stream(&mut self) -> Result<JsonLinesStream> {
        Ok(JsonLinesStream {
            out: self.out.clone(),
            open: true,
        })
    }
}

pub struct JsonLinesStream {
    out: SharedWriter,
    open: bool,
}

#[derive(Serialize)]
struct Line<'a> {
    lights: &'a ChromaSample,
}

impl LightStream for JsonLinesStream {
    fn set(&mut self, colors: &ChromaSample) -> Result<()> {
        if !self.open {
            return Err(ChromaticError::Light("stream already stopped".into()));
        }

        let mut out = self
            .out
            .lock()
            .map_err(|_| ChromaticError::msg("light output has been poisoned"))?;
        serde_json::to_writer(&mut *out, &Line { lights: colors })
            .map_err(|err| ChromaticError::Light(err.to_string()))?;
        writeln!(out)?;
        out.flush()?;
        Ok(())
    }

    fn stop_stream(&mut self) -> Result<()> {
        self.open = false;
        Ok(())
    }
}
