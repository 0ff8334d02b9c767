//! GStreamer initialization
//!
//! Only compiled with the `gst-runtime` feature. Every GStreamer entry point in
//! the crate calls [`init_gstreamer`] first; repeated calls are free.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Once;

static GSTREAMER_INIT: Once = Once::new();
static GSTREAMER_READY: AtomicBool = AtomicBool::new(false);

/// Initialize GStreamer once per process; returns whether it is usable
pub fn init_gstreamer() -> bool {
    GSTREAMER_INIT.call_once(|| match gstreamer::init() {
        Ok(_) => {
            log::info!("GStreamer initialized successfully");
            log_gstreamer_version();
            GSTREAMER_READY.store(true, Ordering::SeqCst);
        }
        Err(e) => {
            log::error!("Failed to initialize GStreamer: {}", e);
            log::error!("Encoder probing and export will not be available");
        }
    });

    GSTREAMER_READY.load(Ordering::SeqCst)
}

fn log_gstreamer_version() {
    let (major, minor, micro, nano) = gstreamer::version();
    let nano_str = match nano {
        0 => String::new(),
        1 => " (git)".to_string(),
        2 => " (prerelease)".to_string(),
        _ => format!(" (nano: {})", nano),
    };
    log::info!("GStreamer version: {}.{}.{}{}", major, minor, micro, nano_str);
}

/// Version string of the loaded GStreamer, if it initialized
pub fn gstreamer_version() -> Option<String> {
    if !init_gstreamer() {
        return None;
    }
    let (major, minor, micro, _) = gstreamer::version();
    Some(format!("{}.{}.{}", major, minor, micro))
}
