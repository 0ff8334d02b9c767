//! GStreamer export backend
//!
//! Builds `appsrc ! queue ! videoconvert ! <encoder> [! <parser>] ! <muxer> ! filesink`
//! for the negotiated format. Frames are pushed as RGBA with timestamps
//! derived from their index, so the output plays back at capture cadence
//! regardless of how fast encoding runs.

use std::path::PathBuf;

use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;

use super::{EncoderError, ExportJob, FrameEncoder};
use crate::capture::Frame;
use crate::encoding::gst_probe::GstSupportTest;
use crate::encoding::gst_parser;
use crate::gstreamer_init::init_gstreamer;

/// How long to wait for the muxer to finalize after EOS
const EOS_TIMEOUT_SECS: u64 = 30;

struct ActivePipeline {
    pipeline: gst::Pipeline,
    appsrc: gst_app::AppSrc,
    output_path: PathBuf,
    frame_duration_ns: u64,
}

/// [`FrameEncoder`] that writes through a GStreamer pipeline
#[derive(Default)]
pub struct GstFrameEncoder {
    active: Option<ActivePipeline>,
}

impl GstFrameEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn make_element(name: &str) -> Result<gst::Element, EncoderError> {
        gst::ElementFactory::make(name)
            .build()
            .map_err(|e| EncoderError::Pipeline(format!("Failed to create {}: {}", name, e)))
    }

    fn create_pipeline(job: &ExportJob) -> Result<(gst::Pipeline, gst_app::AppSrc), EncoderError> {
        let encoder_name = GstSupportTest::find_encoder(job.format.codec).ok_or_else(|| {
            EncoderError::NotAvailable(format!("no encoder element for {}", job.format.label))
        })?;

        let pipeline = gst::Pipeline::new();

        let caps = gst::Caps::builder("video/x-raw")
            .field("format", "RGBA")
            .field("width", job.width as i32)
            .field("height", job.height as i32)
            .field("framerate", gst::Fraction::new(job.fps.max(1) as i32, 1))
            .build();

        let appsrc = gst_app::AppSrc::builder()
            .name("src")
            .caps(&caps)
            .format(gst::Format::Time)
            .build();

        let queue = gst::ElementFactory::make("queue")
            .property("max-size-buffers", 30u32)
            .property("max-size-time", 0u64)
            .property("max-size-bytes", 0u32)
            .build()
            .map_err(|e| EncoderError::Pipeline(format!("Failed to create queue: {}", e)))?;

        let videoconvert = Self::make_element("videoconvert")?;

        let encoder = gst::ElementFactory::make(encoder_name)
            .build()
            .map_err(|e| {
                EncoderError::NotAvailable(format!("Failed to create {}: {}", encoder_name, e))
            })?;

        let muxer = Self::make_element(job.format.container.gst_muxer())?;

        let filesink = gst::ElementFactory::make("filesink")
            .property("location", job.output_path.to_string_lossy().to_string())
            .property("async", false)
            .property("sync", false)
            .build()
            .map_err(|e| EncoderError::Pipeline(format!("Failed to create filesink: {}", e)))?;

        let mut chain: Vec<gst::Element> = vec![
            appsrc.clone().upcast(),
            queue,
            videoconvert,
            encoder,
        ];
        if let Some(parser) = gst_parser(job.format.codec) {
            chain.push(Self::make_element(parser)?);
        }
        chain.push(muxer);
        chain.push(filesink);

        pipeline
            .add_many(&chain)
            .map_err(|e| EncoderError::Pipeline(format!("Failed to add elements: {}", e)))?;
        gst::Element::link_many(&chain)
            .map_err(|e| EncoderError::Pipeline(format!("Failed to link elements: {}", e)))?;

        log::info!(
            "Export pipeline: {} -> {} ({})",
            encoder_name,
            job.format.container.gst_muxer(),
            job.format.label
        );

        Ok((pipeline, appsrc))
    }

    fn drain(pipeline: &gst::Pipeline) -> Result<(), EncoderError> {
        let Some(bus) = pipeline.bus() else {
            return Ok(());
        };

        for msg in bus.iter_timed(gst::ClockTime::from_seconds(EOS_TIMEOUT_SECS)) {
            match msg.view() {
                gst::MessageView::Eos(..) => return Ok(()),
                gst::MessageView::Error(err) => {
                    return Err(EncoderError::Gst(format!(
                        "{} ({:?})",
                        err.error(),
                        err.debug()
                    )));
                }
                _ => {}
            }
        }

        log::warn!("No EOS within {}s, output may be truncated", EOS_TIMEOUT_SECS);
        Ok(())
    }
}

impl FrameEncoder for GstFrameEncoder {
    fn start(&mut self, job: &ExportJob) -> Result<(), EncoderError> {
        if !init_gstreamer() {
            return Err(EncoderError::NotAvailable("GStreamer failed to initialize".into()));
        }

        if let Some(parent) = job.output_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let (pipeline, appsrc) = Self::create_pipeline(job)?;
        pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| EncoderError::Pipeline(format!("Failed to start pipeline: {:?}", e)))?;

        self.active = Some(ActivePipeline {
            pipeline,
            appsrc,
            output_path: job.output_path.clone(),
            frame_duration_ns: job.frame_duration_ns(),
        });
        Ok(())
    }

    fn push_frame(&mut self, frame: &Frame, index: u64) -> Result<(), EncoderError> {
        let active = self
            .active
            .as_ref()
            .ok_or_else(|| EncoderError::Pipeline("Encoder not started".into()))?;

        let mut buffer = gst::Buffer::from_slice(frame.pixels().to_vec());
        if let Some(buffer_ref) = buffer.get_mut() {
            buffer_ref.set_pts(gst::ClockTime::from_nseconds(index * active.frame_duration_ns));
            buffer_ref.set_duration(gst::ClockTime::from_nseconds(active.frame_duration_ns));
        }

        active
            .appsrc
            .push_buffer(buffer)
            .map(|_| ())
            .map_err(|e| EncoderError::Pipeline(format!("Failed to push buffer: {:?}", e)))
    }

    fn finish(&mut self) -> Result<u64, EncoderError> {
        let active = self
            .active
            .take()
            .ok_or_else(|| EncoderError::Pipeline("Encoder not started".into()))?;

        if let Err(e) = active.appsrc.end_of_stream() {
            log::warn!("EOS send failed: {:?}", e);
        }

        let drained = Self::drain(&active.pipeline);
        let _ = active.pipeline.set_state(gst::State::Null);
        drained?;

        Ok(std::fs::metadata(&active.output_path)?.len())
    }
}

impl Drop for GstFrameEncoder {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            let _ = active.pipeline.set_state(gst::State::Null);
        }
    }
}
