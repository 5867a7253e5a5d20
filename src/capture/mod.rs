//! Voice capture pipeline and its isolated worker process
//!
//! The heavy models (streaming recognizer, speaker embedder) live in a
//! separate OS process so model loading and blocking I/O can never stall
//! command dispatch. The daemon side talks to it through
//! [`CaptureProcess`]: capture events in, control signals out.

mod pipeline;
mod supervisor;
pub mod worker;

pub use pipeline::{CapturePipeline, MIN_EMBED_SECS, PARTIAL_RMS_THRESHOLD, RING_SECONDS};
pub use supervisor::{CaptureControl, CaptureProcess};
