// Delaycam - delayed camera mirror
// Main library entry point

pub mod capture;
pub mod config;
pub mod encoding;
pub mod export;
#[cfg(feature = "gst-runtime")]
pub mod gstreamer_init;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;

use capture::{spawn_session, DelayedView, Presentation, TestPatternSource};
use config::Config;
use encoding::{list_codec_support, resolve_format, SupportTest};

/// Test pattern size for headless runs
const PATTERN_WIDTH: u32 = 320;
const PATTERN_HEIGHT: u32 = 240;

/// Command-line options for the headless runner
#[derive(Debug, Clone, PartialEq)]
pub struct CliOptions {
    pub config_path: Option<PathBuf>,
    /// How long to run the capture session
    pub seconds: u64,
    pub export: bool,
    pub probe: bool,
}

impl Default for CliOptions {
    fn default() -> Self {
        Self {
            config_path: None,
            seconds: 5,
            export: false,
            probe: false,
        }
    }
}

impl CliOptions {
    /// Parse arguments (without the program name)
    pub fn parse<I>(args: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut options = Self::default();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" => {
                    let path = args.next().context("--config needs a path")?;
                    options.config_path = Some(PathBuf::from(path));
                }
                "--seconds" => {
                    let value = args.next().context("--seconds needs a value")?;
                    options.seconds = value
                        .parse()
                        .with_context(|| format!("invalid --seconds value '{}'", value))?;
                }
                "--export" => options.export = true,
                "--probe" => options.probe = true,
                other => anyhow::bail!("unknown argument '{}'", other),
            }
        }

        Ok(options)
    }
}

/// Logs what a window would show
struct LoggingView {
    presented: u64,
    waiting: bool,
}

impl DelayedView for LoggingView {
    fn present(&mut self, presentation: Presentation<'_>) {
        match presentation {
            Presentation::Frame(frame) => {
                if self.waiting {
                    log::info!("Delay window filled, showing frame #{}", frame.sequence);
                    self.waiting = false;
                }
                self.presented += 1;
                if self.presented % 50 == 0 {
                    log::debug!(
                        "Showing frame #{} ({}ms old)",
                        frame.sequence,
                        frame.captured_at.elapsed().as_millis()
                    );
                }
            }
            Presentation::Buffering(pending) => {
                if !self.waiting {
                    log::info!("Buffering ({}/{})", pending.buffered, pending.required);
                    self.waiting = true;
                }
            }
        }
    }
}

/// Support test for the current build; None without a media runtime
fn runtime_support() -> Option<Box<dyn SupportTest>> {
    #[cfg(feature = "gst-runtime")]
    {
        encoding::gst_probe::GstSupportTest::new().map(|t| Box::new(t) as Box<dyn SupportTest>)
    }
    #[cfg(not(feature = "gst-runtime"))]
    {
        None
    }
}

fn probe_report(config: &Config, support: &dyn SupportTest) -> anyhow::Result<serde_json::Value> {
    let resolved = match resolve_format(config.codec, config.container, support) {
        Ok(format) => serde_json::to_value(format)?,
        Err(e) => serde_json::Value::String(e.to_string()),
    };

    Ok(serde_json::json!({
        "codecs": serde_json::to_value(list_codec_support(support))?,
        "requested": {
            "codec": config.codec.to_string(),
            "container": config.container.to_string(),
        },
        "resolved": resolved,
    }))
}

#[cfg(feature = "gst-runtime")]
fn export_snapshot(
    frames: Vec<capture::Frame>,
    config: &Config,
    support: &dyn SupportTest,
) -> anyhow::Result<()> {
    let (width, height) = frames
        .first()
        .map(|f| (f.width, f.height))
        .ok_or(export::ExportError::NoFrames)?;

    let job = export::plan_export(config, support, width, height, chrono::Local::now())?;
    let stats = export::export_frames(frames, job, export::gst_encoder::GstFrameEncoder::new())?;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

#[cfg(not(feature = "gst-runtime"))]
fn export_snapshot(
    _frames: Vec<capture::Frame>,
    _config: &Config,
    _support: &dyn SupportTest,
) -> anyhow::Result<()> {
    anyhow::bail!("export needs a build with the gst-runtime feature")
}

/// Headless entry point: run the mirror on a test pattern, optionally export
pub fn run() -> anyhow::Result<()> {
    env_logger::init();

    let options = CliOptions::parse(std::env::args().skip(1))?;
    let config_path = options.config_path.clone().unwrap_or_else(Config::default_path);
    let config = Config::load_or_default(&config_path);
    log::info!("Using config {:?}", config_path);

    let unsupported = |_: &str| false;
    let runtime = runtime_support();
    let support: &dyn SupportTest = match runtime.as_deref() {
        Some(test) => test,
        None => {
            log::warn!("No media runtime available, every format reports unsupported");
            &unsupported
        }
    };

    if options.probe {
        println!("{}", serde_json::to_string_pretty(&probe_report(&config, support)?)?);
        return Ok(());
    }

    for entry in list_codec_support(support) {
        log::info!(
            "{}: {}",
            entry.label,
            if entry.supported { "available" } else { "unavailable" }
        );
    }

    let tokio_runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let frames = tokio_runtime.block_on(async {
        let session = spawn_session(
            config.delay_settings(),
            TestPatternSource::new(PATTERN_WIDTH, PATTERN_HEIGHT),
            LoggingView {
                presented: 0,
                waiting: false,
            },
        )?;

        tokio::time::sleep(Duration::from_secs(options.seconds)).await;

        let frames = session.snapshot().await?;
        let summary = session.stop().await?;
        log::info!(
            "Session ended after {:.1}s: {} captured, {} shown, {} placeholders",
            summary.duration.as_secs_f64(),
            summary.frames_ingested,
            summary.frames_presented,
            summary.placeholders_presented
        );
        anyhow::Ok(frames)
    })?;

    if options.export {
        export_snapshot(frames, &config, support)?;
    }

    Ok(())
}
