//! Nimbus - voice-gated personal assistant
//!
//! This library provides the core of the Nimbus assistant:
//! - Continuous capture and streaming speech-to-text in an isolated worker
//!   process
//! - Speaker verification used as an authorization gate for privileged
//!   actions
//! - An async command router that stays responsive while the assistant is
//!   talking (barge-in with echo suppression)
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │              Capture worker (own process)            │
//! │   Microphone │ Recognizer │ Ring buffer │ Verifier   │
//! └───────────────────────┬──────────────────────────────┘
//!            events (stdout) │ signals (stdin)
//! ┌───────────────────────▼──────────────────────────────┐
//! │                  Command router                      │
//! │  Security gate │ Plugins │ Chat stream │ Barge-in    │
//! └───────────────────────┬──────────────────────────────┘
//!                         │
//! ┌───────────────────────▼──────────────────────────────┐
//! │    Collaborators: STT/TTS/chat APIs, memory, UI      │
//! └──────────────────────────────────────────────────────┘
//! ```

pub mod audio;
pub mod breaker;
pub mod capture;
pub mod chat;
pub mod config;
pub mod context;
pub mod daemon;
pub mod db;
pub mod error;
pub mod events;
pub mod router;
pub mod security;
pub mod speaker;
pub mod speech;
pub mod stt;
pub mod ui;

pub use config::Config;
pub use daemon::Daemon;
pub use db::{DbConn, DbPool};
pub use error::{Error, Result};
pub use events::{CaptureEvent, ControlSignal};
pub use router::{CommandRouter, RouterParts, RouterState};
pub use speaker::{SpeakerEmbedding, SpeakerId};
