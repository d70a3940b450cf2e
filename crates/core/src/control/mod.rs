//! The capture → extract → emit control loop.
//!
//! One [`ControlLoop`] owns the capture device, the light sink and the run
//! state. Front ends talk to it exclusively through a [`ControlHandle`]; every
//! status request carries its own reply channel, so any number of callers can
//! query concurrently.

use std::{
    fmt,
    time::{Duration, Instant},
};

use serde::{Deserialize, Serialize};
use tokio::sync::{
    mpsc::{self, error::TryRecvError},
    oneshot,
};

use crate::{
    decode_frame,
    device::{CaptureConfig, CaptureDevice, ChromaSample, LightSink, LightStream},
    ChromaticError, ColorExtractor, RateCounter, Region, Result,
};

/// Minimum gap between two warnings about frames that could not be processed.
/// Failures in between are logged at debug level.
const FAILURE_WARN_INTERVAL: Duration = Duration::from_secs(1);

/// Commands accepted by the control loop.
#[derive(Debug)]
pub enum Command {
    Start,
    Pause,
    Stop,
    /// Request a [`StatusSnapshot`], answered on the enclosed channel.
    Status(oneshot::Sender<StatusSnapshot>),
}

/// The loop's current mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    #[serde(rename = "paused")]
    Paused,
    #[serde(rename = "running")]
    Running,
    /// Terminal. The loop exits as soon as it reaches this state.
    #[serde(rename = "stopping")]
    Stopped,
}

impl RunState {
    pub fn label(&self) -> &'static str {
        match self {
            RunState::Paused => "paused",
            RunState::Running => "running",
            RunState::Stopped => "stopping",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Point-in-time view of the loop, computed on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub state: RunState,
    pub fps: u64,
}

/// Result of a single processing tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Colours for `lights` lights reached the stream.
    Emitted { lights: usize },
    /// Nothing was pushed; state and frame rate are untouched.
    Skipped,
}

/// Receiving end of the command channel, consumed by [`ControlLoop::run`].
pub type CommandReceiver = mpsc::UnboundedReceiver<Command>;

/// Creates a connected handle / receiver pair.
pub fn channel() -> (ControlHandle, CommandReceiver) {
    let (commands, receiver) = mpsc::unbounded_channel();
    (ControlHandle { commands }, receiver)
}

/// Cloneable sending side used by front ends.
#[derive(Debug, Clone)]
pub struct ControlHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl ControlHandle {
    pub fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| ChromaticError::LoopClosed)
    }

    pub fn start(&self) -> Result<()> {
        self.send(Command::Start)
    }

    pub fn pause(&self) -> Result<()> {
        self.send(Command::Pause)
    }

    pub fn stop(&self) -> Result<()> {
        self.send(Command::Stop)
    }

    /// Asks the loop for its status and waits for the answer.
    pub async fn status(&self) -> Result<StatusSnapshot> {
        let (reply, answer) = oneshot::channel();
        self.send(Command::Status(reply))?;
        answer.await.map_err(|_| ChromaticError::LoopClosed)
    }

    /// Blocking flavour of [`ControlHandle::status`] for synchronous callers.
    /// Must not be called from within an async runtime.
    pub fn blocking_status(&self) -> Result<StatusSnapshot> {
        let (reply, answer) = oneshot::channel();
        self.send(Command::Status(reply))?;
        answer.blocking_recv().map_err(|_| ChromaticError::LoopClosed)
    }

    /// True once the loop has exited.
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}

/// State machine coordinating capture, extraction and the light stream.
pub struct ControlLoop<C: CaptureDevice, S: LightSink> {
    capture: C,
    sink: S,
    stream: Option<S::Stream>,
    regions: Vec<Region>,
    extractor: ColorExtractor,
    state: RunState,
    rate: RateCounter,
    failed_frames: u64,
    last_failure_warn: Option<Instant>,
}

impl<C: CaptureDevice, S: LightSink> ControlLoop<C, S> {
    /// Creates a paused loop over the given devices and regions.
    pub fn new(capture: C, sink: S, regions: Vec<Region>, extractor: ColorExtractor) -> Self {
        Self {
            capture,
            sink,
            stream: None,
            regions,
            extractor,
            state: RunState::Paused,
            rate: RateCounter::default(),
            failed_frames: 0,
            last_failure_warn: None,
        }
    }

    /// Applies the capture configuration before the loop starts streaming.
    pub fn configure_capture(&mut self, config: &CaptureConfig) -> Result<()> {
        self.capture.set_config(config)?;
        let applied = self.capture.config()?;
        tracing::info!(profile = %applied.profile, format = ?applied.format, "capture configured");
        Ok(())
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn status(&self) -> StatusSnapshot {
        StatusSnapshot {
            state: self.state,
            fps: self.rate.rate(),
        }
    }

    /// Drives the loop until a [`Command::Stop`] arrives or every handle has
    /// been dropped.
    ///
    /// While running, pending commands always win over the next tick. While
    /// paused the loop sleeps on the channel. An error means a device could
    /// not be opened; the loop has already released what it held.
    pub fn run(mut self, mut commands: CommandReceiver) -> Result<()> {
        tracing::info!(regions = self.regions.len(), "control loop ready");

        while self.state != RunState::Stopped {
            let pending = match self.state {
                RunState::Running => match commands.try_recv() {
                    Ok(command) => Some(command),
                    Err(TryRecvError::Empty) => None,
                    Err(TryRecvError::Disconnected) => Some(Command::Stop),
                },
                _ => Some(commands.blocking_recv().unwrap_or(Command::Stop)),
            };

            match pending {
                Some(command) => self.handle(command)?,
                None => {
                    self.tick();
                }
            }
        }

        tracing::info!("control loop finished");
        Ok(())
    }

    /// Applies one command to the state machine.
    pub fn handle(&mut self, command: Command) -> Result<()> {
        match command {
            Command::Start => self.start()?,
            Command::Pause => self.pause(),
            Command::Stop => self.stop(),
            Command::Status(reply) => {
                let status = self.status();
                tracing::debug!(state = %status.state, fps = status.fps, "status requested");
                if reply.send(status).is_err() {
                    tracing::debug!("status requester went away");
                }
            }
        }

        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        match self.state {
            RunState::Running => {
                tracing::debug!("start ignored, already running");
                return Ok(());
            }
            RunState::Stopped => {
                tracing::warn!("start ignored, loop is stopping");
                return Ok(());
            }
            RunState::Paused => {}
        }

        if let Err(err) = self.capture.turn_on() {
            tracing::error!(%err, "unable to start capture device");
            return Err(err);
        }

        match self.sink.start_stream() {
            Ok(stream) => self.stream = Some(stream),
            Err(err) => {
                tracing::error!(%err, "unable to start light stream");
                self.turn_off_capture();
                return Err(err);
            }
        }

        self.state = RunState::Running;
        self.failed_frames = 0;
        self.last_failure_warn = None;
        tracing::info!("starting capture");
        Ok(())
    }

    fn pause(&mut self) {
        if self.state != RunState::Running {
            tracing::debug!(state = %self.state, "pause ignored");
            return;
        }

        self.release_stream();
        self.turn_off_capture();
        self.state = RunState::Paused;
        tracing::info!("pausing capture");
    }

    fn stop(&mut self) {
        if self.state == RunState::Running {
            self.turn_off_capture();
        }
        self.release_stream();
        self.state = RunState::Stopped;
        tracing::info!("stopping");
    }

    /// Runs one capture → extract → emit cycle. Only counts towards the frame
    /// rate when the colours reached the stream.
    ///
    /// A run of failed frames produces one warning per
    /// [`FAILURE_WARN_INTERVAL`]; the rest are logged at debug level.
    pub fn tick(&mut self) -> TickOutcome {
        if self.state != RunState::Running {
            return TickOutcome::Skipped;
        }

        let bytes = match self.capture.capture() {
            Ok(bytes) => bytes,
            Err(err) => return self.frame_failed("unable to capture frame", &err),
        };

        let frame = match decode_frame(&bytes) {
            Ok(frame) => frame,
            Err(err) => return self.frame_failed("unable to decode frame", &err),
        };

        let colors = self.extractor.sample(&frame, &self.regions);
        let chroma: ChromaSample = colors
            .iter()
            .map(|(id, color)| (*id, color.chromaticity()))
            .collect();
        tracing::trace!(?chroma, "frame colours");

        let Some(stream) = self.stream.as_mut() else {
            return TickOutcome::Skipped;
        };

        if let Err(err) = stream.set(&chroma) {
            return self.frame_failed("unable to push colours", &err);
        }

        if self.failed_frames > 0 {
            tracing::info!(failed = self.failed_frames, "frames flowing again");
            self.failed_frames = 0;
            self.last_failure_warn = None;
        }

        self.rate.incr();
        TickOutcome::Emitted {
            lights: chroma.len(),
        }
    }

    fn frame_failed(&mut self, what: &str, err: &ChromaticError) -> TickOutcome {
        self.failed_frames += 1;

        let now = Instant::now();
        let warn_due = self
            .last_failure_warn
            .map_or(true, |at| now.saturating_duration_since(at) >= FAILURE_WARN_INTERVAL);

        if warn_due {
            self.last_failure_warn = Some(now);
            tracing::warn!(%err, failed = self.failed_frames, "{what}");
        } else {
            tracing::debug!(%err, failed = self.failed_frames, "{what}");
        }

        TickOutcome::Skipped
    }

    fn release_stream(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(err) = stream.stop_stream() {
                tracing::warn!(%err, "unable to stop light stream cleanly");
            }
        }
    }

    fn turn_off_capture(&mut self) {
        if let Err(err) = self.capture.turn_off() {
            tracing::warn!(%err, "unable to stop capture device cleanly");
        }
    }
}

impl<C: CaptureDevice, S: LightSink> Drop for ControlLoop<C, S> {
    fn drop(&mut self) {
        if self.state == RunState::Running {
            self.turn_off_capture();
        }
        self.release_stream();
    }
}

impl<C: CaptureDevice, S: LightSink> fmt::Debug for ControlLoop<C, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlLoop")
            .field("state", &self.state)
            .field("regions", &self.regions.len())
            .field("extractor", &self.extractor)
            .field("stream_open", &self.stream.is_some())
            .field("failed_frames", &self.failed_frames)
            .finish()
    }
}
