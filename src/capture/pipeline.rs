//! Per-frame capture pipeline
//!
//! Every raw frame goes to the streaming recognizer and the utterance ring
//! buffer. Final results snapshot the ring buffer and resolve the speaker;
//! partial results are energy-gated while the assistant is talking so its
//! own voice, picked up by the microphone, cannot trigger false barge-in.

use crate::audio::{frame_rms_i16, UtteranceBuffer};
use crate::events::CaptureEvent;
use crate::speaker::{SpeakerEmbedder, SpeakerId, SpeakerVerifier};
use crate::stt::StreamingRecognizer;
use crate::Result;

/// Seconds of audio history kept in the ring buffer
pub const RING_SECONDS: f32 = 5.0;

/// Minimum utterance duration to attempt speaker embedding
pub const MIN_EMBED_SECS: f32 = 0.3;

/// RMS threshold (16-bit PCM scale) a partial must exceed to pass the gate
/// while the assistant is speaking
pub const PARTIAL_RMS_THRESHOLD: f32 = 800.0;

/// Frame-by-frame capture pipeline
pub struct CapturePipeline<R: StreamingRecognizer> {
    recognizer: R,
    embedder: Box<dyn SpeakerEmbedder>,
    verifier: SpeakerVerifier,
    ring: UtteranceBuffer,
    sample_rate: u32,
    assistant_speaking: bool,
    registration_mode: bool,
}

impl<R: StreamingRecognizer> CapturePipeline<R> {
    /// Create a pipeline over the given recognizer, embedder, and verifier
    #[must_use]
    pub fn new(
        recognizer: R,
        embedder: Box<dyn SpeakerEmbedder>,
        verifier: SpeakerVerifier,
        sample_rate: u32,
    ) -> Self {
        Self {
            recognizer,
            embedder,
            verifier,
            ring: UtteranceBuffer::new(RING_SECONDS, sample_rate),
            sample_rate,
            assistant_speaking: false,
            registration_mode: false,
        }
    }

    /// Update the assistant-speaking flag (drives partial gating)
    pub fn set_speaking(&mut self, active: bool) {
        self.assistant_speaking = active;
    }

    /// Update registration mode (attaches raw audio to command events)
    pub fn set_registration(&mut self, active: bool) {
        self.registration_mode = active;
    }

    /// Mutable access to the verifier (profile reload, threshold updates)
    pub fn verifier_mut(&mut self) -> &mut SpeakerVerifier {
        &mut self.verifier
    }

    /// Process one raw frame, possibly producing an event
    ///
    /// # Errors
    ///
    /// Propagates recognizer errors; callers treat them as per-frame
    /// failures and keep the loop running.
    pub async fn push_frame(&mut self, frame: &[f32]) -> Result<Option<CaptureEvent>> {
        self.ring.push(frame);

        let Some(transcript) = self.recognizer.accept(frame).await? else {
            return Ok(None);
        };

        if transcript.text.trim().is_empty() {
            return Ok(None);
        }

        if transcript.is_final {
            return Ok(Some(self.finalize_utterance(transcript.text).await));
        }

        // Partial: energy-gate only while the assistant is talking
        if self.assistant_speaking {
            let rms = frame_rms_i16(frame);
            if rms < PARTIAL_RMS_THRESHOLD {
                tracing::trace!(rms, "partial suppressed by energy gate");
                return Ok(None);
            }
        }

        Ok(Some(CaptureEvent::Partial {
            text: transcript.text,
        }))
    }

    /// Snapshot the ring buffer and resolve the speaker for a final result
    #[allow(clippy::cast_precision_loss)]
    async fn finalize_utterance(&mut self, text: String) -> CaptureEvent {
        let snapshot = self.ring.snapshot_and_clear();
        let min_samples = (self.sample_rate as f32 * MIN_EMBED_SECS) as usize;

        let speaker = if snapshot.len() >= min_samples {
            match self.embedder.embed(&snapshot, self.sample_rate).await {
                Some(embedding) => self.verifier.verify(&embedding),
                None => {
                    tracing::debug!("embedding extraction failed, speaker unresolved");
                    SpeakerId::Guest
                }
            }
        } else {
            tracing::debug!(
                samples = snapshot.len(),
                "utterance too short for embedding, speaker unresolved"
            );
            SpeakerId::Guest
        };

        CaptureEvent::Command {
            text,
            speaker,
            raw_audio: self.registration_mode.then_some(snapshot),
        }
    }
}
