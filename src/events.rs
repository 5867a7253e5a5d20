//! Wire types exchanged between the capture worker process and the router
//!
//! Events flow one way (worker stdout → router); control signals flow the
//! other way (router → worker stdin). Both are encoded as one JSON object
//! per line.

use serde::{Deserialize, Serialize};

use crate::speaker::SpeakerId;

/// Event emitted by the capture worker
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CaptureEvent {
    /// A finalized utterance. `text` is always non-empty.
    Command {
        text: String,
        speaker: SpeakerId,
        /// Raw utterance samples, attached only in registration mode
        #[serde(default, skip_serializing_if = "Option::is_none")]
        raw_audio: Option<Vec<f32>>,
    },

    /// An in-progress (unstable) recognition result
    Partial { text: String },
}

/// Control signal accepted by the capture worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlSignal {
    /// Assistant speaking state, drives partial energy gating
    Speaking { active: bool },

    /// Registration mode: attach raw audio to command events
    Registration { active: bool },

    /// Re-read the owner profile from disk (sent after enrollment)
    ReloadProfile,

    /// Adjust the speaker-verification threshold at runtime
    SetThreshold { threshold: f32 },
}
