//! Capture session driver
//!
//! One tokio task owns the [`DelayBuffer`] for the lifetime of a session and
//! runs two independent timers at the configured cadence:
//!
//! - **capture tick**: pulls a frame from the [`FrameSource`] and ingests it
//! - **display tick**: queries the delayed frame and hands it to the [`DelayedView`]
//!
//! Commands (pause, resume, reconfigure, snapshot, stop) arrive on a channel
//! and are handled between ticks, so the buffer never sees concurrent access.
//! Pausing suppresses both ticks and keeps the buffer; stopping clears it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, Interval, MissedTickBehavior};

use super::delay::{BufferNotReady, DelayBuffer, DelayError, DelaySettings};
use super::frame::Frame;
use super::CaptureStatus;

/// Live image provider (camera, screen, test pattern)
pub trait FrameSource: Send + 'static {
    /// Grab the current image. `Ok(None)` when nothing new is available.
    fn capture(&mut self) -> anyhow::Result<Option<Frame>>;
}

/// What the display tick shows
#[derive(Debug, Clone, Copy)]
pub enum Presentation<'a> {
    /// The frame captured `delay` seconds ago
    Frame(&'a Frame),
    /// Still filling the delay window; show a placeholder
    Buffering(BufferNotReady),
}

/// Receiver of delayed frames (canvas, window, test recorder)
pub trait DelayedView: Send + 'static {
    fn present(&mut self, presentation: Presentation<'_>);
}

/// Error type for session control
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Capture session has ended")]
    Closed,

    #[error(transparent)]
    Delay(#[from] DelayError),
}

/// Shared, continuously updated session status
#[derive(Debug, Clone, Serialize)]
pub struct SessionState {
    pub status: CaptureStatus,
    pub frames_ingested: u64,
    pub frames_presented: u64,
    pub placeholders_presented: u64,
    pub buffered_frames: usize,
    pub capacity: usize,
}

/// Totals reported when a session ends
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub frames_ingested: u64,
    pub frames_presented: u64,
    pub placeholders_presented: u64,
    pub duration: Duration,
}

enum SessionCommand {
    Pause,
    Resume,
    Reconfigure(DelaySettings),
    Snapshot(oneshot::Sender<Vec<Frame>>),
    Stop,
}

/// Control handle for a running capture session
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<SessionCommand>,
    state: Arc<Mutex<SessionState>>,
    task: JoinHandle<anyhow::Result<SessionSummary>>,
}

/// Start a capture session on the current tokio runtime
pub fn spawn_session<S, V>(
    settings: DelaySettings,
    source: S,
    view: V,
) -> Result<SessionHandle, SessionError>
where
    S: FrameSource,
    V: DelayedView,
{
    let buffer = DelayBuffer::with_settings(settings)?;
    let (commands, receiver) = mpsc::unbounded_channel();

    let state = Arc::new(Mutex::new(SessionState {
        status: CaptureStatus::Running,
        frames_ingested: 0,
        frames_presented: 0,
        placeholders_presented: 0,
        buffered_frames: 0,
        capacity: buffer.capacity(),
    }));

    log::info!(
        "Starting capture session: {}s delay, {}s buffer at {}Hz",
        settings.delay_secs,
        settings.buffer_secs,
        settings.cadence_hz
    );

    let task = tokio::spawn(run_session(buffer, source, view, receiver, state.clone()));

    Ok(SessionHandle {
        commands,
        state,
        task,
    })
}

impl SessionHandle {
    /// Suspend both ticks; buffered frames are kept
    pub fn pause(&self) -> Result<(), SessionError> {
        self.send(SessionCommand::Pause)
    }

    /// Restart ticking where the delay window left off
    pub fn resume(&self) -> Result<(), SessionError> {
        self.send(SessionCommand::Resume)
    }

    /// Change delay, buffer length or cadence; applies from the next tick
    pub fn reconfigure(&self, settings: DelaySettings) -> Result<(), SessionError> {
        settings.validate()?;
        self.send(SessionCommand::Reconfigure(settings))
    }

    /// Buffered frames, oldest first
    pub async fn snapshot(&self) -> Result<Vec<Frame>, SessionError> {
        let (reply, response) = oneshot::channel();
        self.send(SessionCommand::Snapshot(reply))?;
        response.await.map_err(|_| SessionError::Closed)
    }

    pub fn state(&self) -> SessionState {
        self.state.lock().clone()
    }

    /// Stop capturing, clear the buffer and wait for the session to end
    pub async fn stop(self) -> anyhow::Result<SessionSummary> {
        // The task may already have ended on a source error
        let _ = self.commands.send(SessionCommand::Stop);
        self.join().await
    }

    /// Wait for the session to end on its own (source failure)
    pub async fn join(self) -> anyhow::Result<SessionSummary> {
        self.task
            .await
            .map_err(|e| anyhow::anyhow!("Capture session task failed: {}", e))?
    }

    fn send(&self, command: SessionCommand) -> Result<(), SessionError> {
        self.commands.send(command).map_err(|_| SessionError::Closed)
    }
}

fn tick_timer(period: Duration) -> Interval {
    let mut timer = interval(period);
    // Late ticks are dropped, never replayed in a burst
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
    timer
}

async fn run_session<S, V>(
    mut buffer: DelayBuffer,
    mut source: S,
    mut view: V,
    mut commands: mpsc::UnboundedReceiver<SessionCommand>,
    state: Arc<Mutex<SessionState>>,
) -> anyhow::Result<SessionSummary>
where
    S: FrameSource,
    V: DelayedView,
{
    let started = Instant::now();
    let mut period = buffer
        .settings()
        .map(|s| s.tick_interval())
        .unwrap_or(Duration::from_millis(100));
    let mut capture_tick = tick_timer(period);
    let mut display_tick = tick_timer(period);
    let mut paused = false;

    let mut frames_ingested = 0u64;
    let mut frames_presented = 0u64;
    let mut placeholders_presented = 0u64;

    let outcome: anyhow::Result<()> = loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(SessionCommand::Pause) => {
                    if !paused {
                        log::info!("Capture paused with {} frames buffered", buffer.len());
                    }
                    paused = true;
                    state.lock().status = CaptureStatus::Paused;
                }
                Some(SessionCommand::Resume) => {
                    if paused {
                        log::info!("Capture resumed");
                        capture_tick.reset();
                        display_tick.reset();
                    }
                    paused = false;
                    state.lock().status = CaptureStatus::Running;
                }
                Some(SessionCommand::Reconfigure(settings)) => {
                    if let Err(e) = buffer.configure(settings) {
                        log::warn!("Ignoring delay reconfiguration: {}", e);
                        continue;
                    }
                    let new_period = settings.tick_interval();
                    if new_period != period {
                        period = new_period;
                        capture_tick = tick_timer(period);
                        display_tick = tick_timer(period);
                    }
                    let mut s = state.lock();
                    s.capacity = buffer.capacity();
                    s.buffered_frames = buffer.len();
                }
                Some(SessionCommand::Snapshot(reply)) => {
                    let _ = reply.send(buffer.snapshot());
                }
                Some(SessionCommand::Stop) | None => break Ok(()),
            },
            _ = capture_tick.tick(), if !paused => {
                match source.capture() {
                    Ok(Some(frame)) => {
                        buffer.ingest(frame);
                        frames_ingested += 1;
                        let mut s = state.lock();
                        s.frames_ingested = frames_ingested;
                        s.buffered_frames = buffer.len();
                    }
                    Ok(None) => {}
                    Err(e) => {
                        log::error!("Frame source failed: {}", e);
                        break Err(e);
                    }
                }
            }
            _ = display_tick.tick(), if !paused => {
                match buffer.query() {
                    Ok(frame) => {
                        view.present(Presentation::Frame(frame));
                        frames_presented += 1;
                        state.lock().frames_presented = frames_presented;
                    }
                    Err(not_ready) => {
                        view.present(Presentation::Buffering(not_ready));
                        placeholders_presented += 1;
                        state.lock().placeholders_presented = placeholders_presented;
                    }
                }
            }
        }
    };

    buffer.reset();
    {
        let mut s = state.lock();
        s.status = CaptureStatus::Stopped;
        s.buffered_frames = 0;
    }
    outcome?;

    let summary = SessionSummary {
        frames_ingested,
        frames_presented,
        placeholders_presented,
        duration: started.elapsed(),
    };
    log::info!(
        "Capture session ended: {} frames captured, {} shown, {} placeholders",
        summary.frames_ingested,
        summary.frames_presented,
        summary.placeholders_presented
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::TestPatternSource;

    #[derive(Clone, Default)]
    struct RecordingView {
        shown: Arc<Mutex<Vec<Option<u64>>>>,
    }

    impl DelayedView for RecordingView {
        fn present(&mut self, presentation: Presentation<'_>) {
            let entry = match presentation {
                Presentation::Frame(frame) => Some(frame.sequence),
                Presentation::Buffering(_) => None,
            };
            self.shown.lock().push(entry);
        }
    }

    struct FailingSource {
        remaining: u32,
    }

    impl FrameSource for FailingSource {
        fn capture(&mut self) -> anyhow::Result<Option<Frame>> {
            if self.remaining == 0 {
                anyhow::bail!("camera unplugged");
            }
            self.remaining -= 1;
            Ok(Some(Frame::new(1, 1, 1, vec![0u8; 4])))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_fills_buffer_and_presents_in_order() {
        let view = RecordingView::default();
        let settings = DelaySettings::new(0.05, 0.2, 100.0);
        let handle = spawn_session(settings, TestPatternSource::new(4, 4), view.clone()).unwrap();

        tokio::time::sleep(Duration::from_millis(300)).await;
        let frames = handle.snapshot().await.unwrap();
        assert_eq!(frames.len(), 20);
        assert!(frames.windows(2).all(|w| w[1].sequence == w[0].sequence + 1));

        let summary = handle.stop().await.unwrap();
        assert!(summary.frames_ingested > 0);

        let shown: Vec<u64> = view.shown.lock().iter().flatten().copied().collect();
        assert!(shown.windows(2).all(|w| w[1] >= w[0]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_keeps_buffer_unchanged() {
        let settings = DelaySettings::new(0.02, 0.5, 100.0);
        let handle =
            spawn_session(settings, TestPatternSource::new(2, 2), RecordingView::default()).unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.pause().unwrap();
        // Commands are handled in order, so the pause is in effect once this returns
        let before: Vec<u64> = handle.snapshot().await.unwrap().iter().map(|f| f.sequence).collect();
        assert_eq!(handle.state().status, CaptureStatus::Paused);

        tokio::time::sleep(Duration::from_millis(100)).await;
        let after: Vec<u64> = handle.snapshot().await.unwrap().iter().map(|f| f.sequence).collect();
        assert_eq!(before, after);

        handle.resume().unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        let resumed = handle.snapshot().await.unwrap();
        assert!(resumed.last().map(|f| f.sequence) > before.last().copied());

        handle.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconfigure_shrinks_buffer() {
        let settings = DelaySettings::new(0.05, 0.5, 100.0);
        let handle =
            spawn_session(settings, TestPatternSource::new(2, 2), RecordingView::default()).unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        handle.reconfigure(DelaySettings::new(0.05, 0.1, 100.0)).unwrap();
        let frames = handle.snapshot().await.unwrap();
        assert!(frames.len() <= 10);
        assert_eq!(handle.state().capacity, 10);

        assert!(handle.reconfigure(DelaySettings::new(1.0, 1.0, 0.0)).is_err());
        handle.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_unusable_cadence_is_rejected_before_spawning() {
        let settings = DelaySettings::new(1.0, 5.0, 1e10);
        let result = spawn_session(settings, TestPatternSource::new(2, 2), RecordingView::default());
        assert!(matches!(
            result,
            Err(SessionError::Delay(DelayError::InvalidConfiguration(_)))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_source_error_is_propagated() {
        let settings = DelaySettings::new(0.0, 0.1, 100.0);
        let handle = spawn_session(settings, FailingSource { remaining: 3 }, RecordingView::default())
            .unwrap();

        let err = handle.join().await.unwrap_err();
        assert_eq!(err.to_string(), "camera unplugged");
    }
}
