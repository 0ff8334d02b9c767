// Live capture with delayed playback

pub mod delay;
pub mod frame;
pub mod session;
pub mod test_pattern;

pub use delay::{
    BufferNotReady, DelayBuffer, DelayError, DelaySettings, MAX_BUFFERED_FRAMES, MAX_CADENCE_HZ,
};
pub use frame::Frame;
pub use session::{
    spawn_session, DelayedView, FrameSource, Presentation, SessionError, SessionHandle,
    SessionState, SessionSummary,
};
pub use test_pattern::TestPatternSource;

use serde::{Deserialize, Serialize};

/// Current capture state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CaptureStatus {
    /// Capture and display ticks are running
    Running,
    /// Ticks suspended, buffer retained
    Paused,
    /// Session ended, buffer cleared
    Stopped,
}

impl CaptureStatus {
    pub fn is_running(&self) -> bool {
        *self == CaptureStatus::Running
    }
}
