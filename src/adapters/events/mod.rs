//! Stage observer adapters.
//!
//! - `TracingStageObserver` - Structured log line per stage transition
//! - `RecordingStageObserver` - Captures transitions for assertions

mod recording;
mod tracing_observer;

pub use recording::RecordingStageObserver;
pub use tracing_observer::TracingStageObserver;
