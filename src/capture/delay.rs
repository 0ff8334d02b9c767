// Delayed-frame ring buffer
// Keeps a bounded window of recent frames and hands back the one captured
// `delay` seconds ago

use std::collections::VecDeque;
use std::time::Duration;

use super::frame::Frame;

/// Fastest tick rate the session timers are driven at
pub const MAX_CADENCE_HZ: f64 = 240.0;
/// Upper bound on retained frames for any delay/buffer/cadence combination
pub const MAX_BUFFERED_FRAMES: usize = 100_000;

/// Error type for delay configuration
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DelayError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Returned by [`DelayBuffer::query`] until enough frames are buffered
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Delayed frame not ready ({buffered}/{required} frames buffered)")]
pub struct BufferNotReady {
    pub buffered: usize,
    pub required: usize,
}

/// Delay, buffer length and tick rate for one capture session
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DelaySettings {
    pub delay_secs: f64,
    pub buffer_secs: f64,
    pub cadence_hz: f64,
}

impl DelaySettings {
    pub fn new(delay_secs: f64, buffer_secs: f64, cadence_hz: f64) -> Self {
        Self {
            delay_secs,
            buffer_secs,
            cadence_hz,
        }
    }

    /// Interval between capture (and display) ticks
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.cadence_hz)
    }

    /// Reject non-finite or negative values, a cadence outside
    /// `(0, MAX_CADENCE_HZ]` and windows longer than [`MAX_BUFFERED_FRAMES`]
    pub fn validate(&self) -> Result<(), DelayError> {
        if !self.cadence_hz.is_finite() || self.cadence_hz <= 0.0 {
            return Err(DelayError::InvalidConfiguration(format!(
                "cadence must be positive, got {}Hz",
                self.cadence_hz
            )));
        }
        if self.cadence_hz > MAX_CADENCE_HZ {
            return Err(DelayError::InvalidConfiguration(format!(
                "cadence {}Hz exceeds the {}Hz limit",
                self.cadence_hz, MAX_CADENCE_HZ
            )));
        }
        if !self.delay_secs.is_finite() || self.delay_secs < 0.0 {
            return Err(DelayError::InvalidConfiguration(format!(
                "delay must be non-negative, got {}s",
                self.delay_secs
            )));
        }
        if !self.buffer_secs.is_finite() || self.buffer_secs < 0.0 {
            return Err(DelayError::InvalidConfiguration(format!(
                "buffer duration must be non-negative, got {}s",
                self.buffer_secs
            )));
        }

        let frames = self.delay_secs.max(self.buffer_secs) * self.cadence_hz;
        if frames.round() > MAX_BUFFERED_FRAMES as f64 {
            return Err(DelayError::InvalidConfiguration(format!(
                "{}s at {}Hz needs {} frames, limit is {}",
                self.delay_secs.max(self.buffer_secs),
                self.cadence_hz,
                frames.round(),
                MAX_BUFFERED_FRAMES
            )));
        }
        Ok(())
    }
}

/// Frame counts derived from [`DelaySettings`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Geometry {
    delay_steps: usize,
    capacity: usize,
}

impl Geometry {
    fn from_settings(settings: &DelaySettings) -> Self {
        let delay_steps = (settings.delay_secs * settings.cadence_hz).round() as usize;
        let buffer_steps = (settings.buffer_secs * settings.cadence_hz).round() as usize;
        // A zero delay still needs the newest frame retained
        let capacity = buffer_steps.max(delay_steps).max(1);
        Self {
            delay_steps,
            capacity,
        }
    }

    /// Frames that must be buffered before a delayed frame exists
    fn lag(&self) -> usize {
        self.delay_steps.max(1)
    }
}

/// Bounded FIFO of captured frames with a delayed read position.
///
/// Frames go in at the back and are evicted from the front once `capacity` is
/// exceeded. `query` returns the frame `delay_steps` positions behind the end.
/// Single producer; callers serialize `ingest` and `query` themselves.
#[derive(Debug, Default)]
pub struct DelayBuffer {
    frames: VecDeque<Frame>,
    settings: Option<DelaySettings>,
    geometry: Option<Geometry>,
}

impl DelayBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: DelaySettings) -> Result<Self, DelayError> {
        let mut buffer = Self::new();
        buffer.configure(settings)?;
        Ok(buffer)
    }

    /// Apply new delay/buffer/cadence settings.
    ///
    /// Capacity is raised to the delay if the buffer would be shorter than it.
    /// A smaller capacity evicts the oldest frames immediately; a larger one
    /// keeps everything already buffered.
    pub fn configure(&mut self, settings: DelaySettings) -> Result<(), DelayError> {
        settings.validate()?;

        let geometry = Geometry::from_settings(&settings);
        let requested = (settings.buffer_secs * settings.cadence_hz).round() as usize;
        if requested < geometry.capacity {
            log::debug!(
                "Buffer of {} frames is shorter than the delay, raised to {}",
                requested,
                geometry.capacity
            );
        }

        log::debug!(
            "Delay buffer configured: delay {} frames, capacity {} frames at {}Hz",
            geometry.delay_steps,
            geometry.capacity,
            settings.cadence_hz
        );

        self.settings = Some(settings);
        self.geometry = Some(geometry);
        self.trim();
        Ok(())
    }

    /// Append a frame, evicting from the front past capacity.
    /// No-op until the buffer has been configured.
    pub fn ingest(&mut self, frame: Frame) {
        if self.geometry.is_none() {
            return;
        }
        self.frames.push_back(frame);
        self.trim();
    }

    /// The frame captured `delay_steps` ingestions ago
    pub fn query(&self) -> Result<&Frame, BufferNotReady> {
        let Some(geometry) = self.geometry else {
            return Err(BufferNotReady {
                buffered: 0,
                required: 0,
            });
        };

        let lag = geometry.lag();
        let buffered = self.frames.len();
        if buffered < lag {
            return Err(BufferNotReady {
                buffered,
                required: lag,
            });
        }

        self.frames.get(buffered - lag).ok_or(BufferNotReady {
            buffered,
            required: lag,
        })
    }

    /// Drop every buffered frame, keeping the configuration
    pub fn reset(&mut self) {
        self.frames.clear();
    }

    /// Copy of the buffered frames, oldest first (pixels are shared)
    pub fn snapshot(&self) -> Vec<Frame> {
        self.frames.iter().cloned().collect()
    }

    fn trim(&mut self) {
        let Some(geometry) = self.geometry else {
            return;
        };
        while self.frames.len() > geometry.capacity {
            self.frames.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Maximum number of retained frames (0 when unconfigured)
    pub fn capacity(&self) -> usize {
        self.geometry.map_or(0, |g| g.capacity)
    }

    pub fn delay_steps(&self) -> usize {
        self.geometry.map_or(0, |g| g.delay_steps)
    }

    pub fn settings(&self) -> Option<DelaySettings> {
        self.settings
    }

    pub fn is_configured(&self) -> bool {
        self.geometry.is_some()
    }

    /// Span of buffered content, from the cadence rather than wall clock
    pub fn buffered_duration(&self) -> Duration {
        match self.settings {
            Some(settings) => Duration::from_secs_f64(self.frames.len() as f64 / settings.cadence_hz),
            None => Duration::ZERO,
        }
    }
}
