//! Export of buffered frames to a video file
//!
//! The export path is:
//!
//! 1. [`plan_export`] negotiates a format for the configured preferences and
//!    picks a timestamped output path.
//! 2. [`AsyncExporter`] feeds frames to a [`FrameEncoder`] on a background
//!    thread through a bounded channel, so capture keeps ticking meanwhile.
//!
//! Frames come from a buffer snapshot, so the sequence is always finite.
//! Encoder failures are returned as-is inside [`ExportError::Encoder`].

#[cfg(feature = "gst-runtime")]
pub mod gst_encoder;

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local, Utc};
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use serde::Serialize;

use crate::capture::Frame;
use crate::config::Config;
use crate::encoding::{resolve_format, NegotiationError, ResolvedFormat, SupportTest};

/// Frames queued between the caller and the encoder thread
pub const EXPORT_QUEUE_FRAMES: usize = 32;

/// Error type for encoder backends
#[derive(Debug, thiserror::Error)]
pub enum EncoderError {
    #[error("GStreamer error: {0}")]
    Gst(String),

    #[error("Encoder not available: {0}")]
    NotAvailable(String),

    #[error("Pipeline error: {0}")]
    Pipeline(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error type for export operations
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("Nothing to export: no frames buffered")]
    NoFrames,

    #[error(transparent)]
    Format(#[from] NegotiationError),

    #[error("Encoder error: {0}")]
    Encoder(#[from] EncoderError),

    #[error("Export worker error: {0}")]
    Worker(String),
}

/// Everything an encoder needs to know about one export
#[derive(Debug, Clone)]
pub struct ExportJob {
    pub format: ResolvedFormat,
    pub output_path: PathBuf,
    pub width: u32,
    pub height: u32,
    /// Playback rate; frames were captured at this cadence
    pub fps: u32,
}

impl ExportJob {
    /// Duration of one frame in nanoseconds
    pub fn frame_duration_ns(&self) -> u64 {
        1_000_000_000 / self.fps.max(1) as u64
    }
}

/// Frame-to-video encoder backend
pub trait FrameEncoder: Send + 'static {
    /// Prepare output for the job (open file, build pipeline)
    fn start(&mut self, job: &ExportJob) -> Result<(), EncoderError>;

    /// Encode one frame; `index` counts from 0 within the export
    fn push_frame(&mut self, frame: &Frame, index: u64) -> Result<(), EncoderError>;

    /// Flush and finalize; returns bytes written
    fn finish(&mut self) -> Result<u64, EncoderError>;
}

/// Statistics from a finished export
#[derive(Debug, Clone, Serialize)]
pub struct ExportStats {
    pub output_path: PathBuf,
    pub label: String,
    pub frames_encoded: u64,
    pub bytes_written: u64,
    pub encoding_duration: Duration,
    pub average_fps: f64,
    pub finished_at: DateTime<Utc>,
}

/// File name for an export started at `timestamp`
pub fn export_file_name(timestamp: DateTime<Local>, format: &ResolvedFormat) -> String {
    format!(
        "delaycam-{}.{}",
        timestamp.format("%Y-%m-%d_%H-%M-%S"),
        format.file_extension()
    )
}

/// Negotiate a format and build the export job for the current config
pub fn plan_export<S>(
    config: &Config,
    support: &S,
    width: u32,
    height: u32,
    timestamp: DateTime<Local>,
) -> Result<ExportJob, ExportError>
where
    S: SupportTest + ?Sized,
{
    let format = resolve_format(config.codec, config.container, support)?;
    let output_path = config.export_dir.join(export_file_name(timestamp, &format));

    Ok(ExportJob {
        format,
        output_path,
        width,
        height,
        fps: config.cadence_hz,
    })
}

/// Messages sent to the export thread
enum ExportMessage {
    Frame(Frame),
    Finish,
}

/// Export state shared between threads
struct ExportState {
    frames_encoded: u64,
    last_error: Option<String>,
}

/// Runs a [`FrameEncoder`] on a background thread.
///
/// Frames are handed over through a bounded channel; `send_frame` blocks when
/// the encoder falls behind.
pub struct AsyncExporter {
    frame_sender: Sender<ExportMessage>,
    worker: Option<JoinHandle<Result<ExportStats, ExportError>>>,
    state: Arc<Mutex<ExportState>>,
}

impl AsyncExporter {
    pub fn start<E: FrameEncoder>(
        job: ExportJob,
        encoder: E,
        queue_size: usize,
    ) -> Result<Self, ExportError> {
        log::info!(
            "Exporting {}x{} @ {}fps as {} to {:?}",
            job.width,
            job.height,
            job.fps,
            job.format.label,
            job.output_path
        );

        let (frame_sender, frame_receiver) = bounded::<ExportMessage>(queue_size.max(1));
        let state = Arc::new(Mutex::new(ExportState {
            frames_encoded: 0,
            last_error: None,
        }));

        let state_clone = state.clone();
        let worker = std::thread::Builder::new()
            .name("delaycam-export".into())
            .spawn(move || Self::worker_main(frame_receiver, job, encoder, state_clone))
            .map_err(|e| ExportError::Worker(format!("Failed to spawn export thread: {}", e)))?;

        Ok(Self {
            frame_sender,
            worker: Some(worker),
            state,
        })
    }

    /// Queue a frame (blocking if the queue is full)
    pub fn send_frame(&self, frame: Frame) -> Result<(), ExportError> {
        if let Some(err) = self.has_error() {
            return Err(ExportError::Worker(err));
        }

        self.frame_sender
            .send(ExportMessage::Frame(frame))
            .map_err(|_| ExportError::Worker("Export thread disconnected".into()))
    }

    /// Frames encoded so far
    pub fn progress(&self) -> u64 {
        self.state.lock().frames_encoded
    }

    pub fn has_error(&self) -> Option<String> {
        self.state.lock().last_error.clone()
    }

    /// Finalize the file and wait for the encoder thread
    pub fn finish(mut self) -> Result<ExportStats, ExportError> {
        // The worker may already be gone after an encoder error
        let _ = self.frame_sender.send(ExportMessage::Finish);

        match self.worker.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| ExportError::Worker("Export thread panicked".into()))?,
            None => Err(ExportError::Worker("Export already finished".into())),
        }
    }

    fn worker_main<E: FrameEncoder>(
        receiver: Receiver<ExportMessage>,
        job: ExportJob,
        mut encoder: E,
        state: Arc<Mutex<ExportState>>,
    ) -> Result<ExportStats, ExportError> {
        let started = Instant::now();

        let record_failure = |err: EncoderError| {
            state.lock().last_error = Some(err.to_string());
            ExportError::Encoder(err)
        };

        encoder.start(&job).map_err(record_failure)?;

        let mut frames_encoded = 0u64;
        loop {
            match receiver.recv() {
                Ok(ExportMessage::Frame(frame)) => {
                    encoder
                        .push_frame(&frame, frames_encoded)
                        .map_err(record_failure)?;
                    frames_encoded += 1;
                    state.lock().frames_encoded = frames_encoded;

                    if frames_encoded % 100 == 0 {
                        log::debug!("Exported {} frames", frames_encoded);
                    }
                }
                Ok(ExportMessage::Finish) | Err(_) => break,
            }
        }

        let bytes_written = encoder.finish().map_err(record_failure)?;

        let encoding_duration = started.elapsed();
        let average_fps = if encoding_duration.as_secs_f64() > 0.0 {
            frames_encoded as f64 / encoding_duration.as_secs_f64()
        } else {
            0.0
        };

        log::info!(
            "Export finished: {} frames, {} bytes, {:.1} fps",
            frames_encoded,
            bytes_written,
            average_fps
        );

        Ok(ExportStats {
            output_path: job.output_path,
            label: job.format.label,
            frames_encoded,
            bytes_written,
            encoding_duration,
            average_fps,
            finished_at: Utc::now(),
        })
    }
}

impl Drop for AsyncExporter {
    fn drop(&mut self) {
        if self.worker.is_some() {
            // Let the thread finalize on its own; don't wait in drop
            let _ = self.frame_sender.send(ExportMessage::Finish);
        }
    }
}

/// Encode a finite frame sequence and wait for the result
pub fn export_frames<E: FrameEncoder>(
    frames: Vec<Frame>,
    job: ExportJob,
    encoder: E,
) -> Result<ExportStats, ExportError> {
    if frames.is_empty() {
        return Err(ExportError::NoFrames);
    }

    let exporter = AsyncExporter::start(job, encoder, EXPORT_QUEUE_FRAMES)?;
    for frame in frames {
        if let Err(send_err) = exporter.send_frame(frame) {
            // Report the encoder's own error rather than the channel failure
            return match exporter.finish() {
                Err(err) => Err(err),
                Ok(_) => Err(send_err),
            };
        }
    }
    exporter.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::{ContainerFormat, Preference, VideoCodec};
    use chrono::TimeZone;

    #[derive(Clone, Default)]
    struct MemoryEncoder {
        frames: Arc<Mutex<Vec<(u64, u64)>>>,
        finished: Arc<Mutex<bool>>,
        fail_start: bool,
        fail_at: Option<u64>,
    }

    impl FrameEncoder for MemoryEncoder {
        fn start(&mut self, _job: &ExportJob) -> Result<(), EncoderError> {
            if self.fail_start {
                return Err(EncoderError::NotAvailable("vp9enc".into()));
            }
            Ok(())
        }

        fn push_frame(&mut self, frame: &Frame, index: u64) -> Result<(), EncoderError> {
            if self.fail_at == Some(index) {
                return Err(EncoderError::Pipeline("encoder stalled".into()));
            }
            self.frames.lock().push((index, frame.sequence));
            Ok(())
        }

        fn finish(&mut self) -> Result<u64, EncoderError> {
            *self.finished.lock() = true;
            Ok(self.frames.lock().len() as u64 * 16)
        }
    }

    fn vp9_only(sig: &str) -> bool {
        sig == "video/webm; codecs=\"vp9\""
    }

    fn job() -> ExportJob {
        let config = Config {
            export_dir: PathBuf::from("/tmp/exports"),
            ..Config::default()
        };
        let stamp = Local.with_ymd_and_hms(2026, 3, 1, 7, 5, 9).unwrap();
        plan_export(&config, &vp9_only, 2, 2, stamp).unwrap()
    }

    fn frames(count: u64) -> Vec<Frame> {
        (1..=count).map(|seq| Frame::new(seq, 2, 2, vec![0u8; 16])).collect()
    }

    #[test]
    fn test_plan_export() {
        let job = job();
        assert_eq!(job.format.label, "VP9 (WEBM)");
        assert_eq!(
            job.output_path,
            PathBuf::from("/tmp/exports/delaycam-2026-03-01_07-05-09.webm")
        );
        assert_eq!(job.fps, 10);
        assert_eq!(job.frame_duration_ns(), 100_000_000);
    }

    #[test]
    fn test_plan_export_without_support_fails() {
        let config = Config {
            codec: Preference::Explicit(VideoCodec::Hevc),
            container: Preference::Explicit(ContainerFormat::Mp4),
            ..Config::default()
        };
        let result = plan_export(&config, &|_: &str| false, 2, 2, Local::now());
        assert!(matches!(
            result,
            Err(ExportError::Format(NegotiationError::NoSupportedFormat { .. }))
        ));
    }

    #[test]
    fn test_export_streams_frames_in_order() {
        let encoder = MemoryEncoder::default();
        let stats = export_frames(frames(250), job(), encoder.clone()).unwrap();

        assert_eq!(stats.frames_encoded, 250);
        assert_eq!(stats.bytes_written, 250 * 16);
        assert_eq!(stats.label, "VP9 (WEBM)");
        assert!(*encoder.finished.lock());

        let seen = encoder.frames.lock();
        assert!(seen.iter().enumerate().all(|(i, &(index, seq))| {
            index == i as u64 && seq == i as u64 + 1
        }));
    }

    #[test]
    fn test_empty_export_rejected() {
        let result = export_frames(Vec::new(), job(), MemoryEncoder::default());
        assert!(matches!(result, Err(ExportError::NoFrames)));
    }

    #[test]
    fn test_encoder_start_failure_propagates() {
        let encoder = MemoryEncoder {
            fail_start: true,
            ..MemoryEncoder::default()
        };
        let result = export_frames(frames(100), job(), encoder);
        assert!(matches!(
            result,
            Err(ExportError::Encoder(EncoderError::NotAvailable(ref name))) if name == "vp9enc"
        ));
    }

    #[test]
    fn test_encoder_frame_failure_propagates() {
        let encoder = MemoryEncoder {
            fail_at: Some(3),
            ..MemoryEncoder::default()
        };
        let result = export_frames(frames(100), job(), encoder.clone());
        assert!(matches!(
            result,
            Err(ExportError::Encoder(EncoderError::Pipeline(_)))
        ));
        assert_eq!(encoder.frames.lock().len(), 3);
        assert!(!*encoder.finished.lock());
    }
}
