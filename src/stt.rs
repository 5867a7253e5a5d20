//! Speech-to-text processing
//!
//! [`StreamingRecognizer`] is the streaming decoder contract consumed by the
//! capture pipeline: feed frames, get partial or final transcripts back.
//! [`SegmentingRecognizer`] implements it with local energy endpointing plus
//! HTTP transcription (Whisper or Deepgram).

use async_trait::async_trait;

use crate::audio::samples_to_wav;
use crate::{Error, Result};

/// Minimum audio energy (f32 RMS) to consider speech
const ENERGY_THRESHOLD: f32 = 0.03;

/// Minimum duration of speech to finalize (in samples at 16kHz)
const MIN_SPEECH_SAMPLES: usize = 4800; // 0.3 seconds

/// Silence duration to consider end of utterance (in samples)
const SILENCE_SAMPLES: usize = 8000; // 0.5 seconds

/// Cadence of partial transcription requests while speech is ongoing
const PARTIAL_INTERVAL_SAMPLES: usize = 8000; // 0.5 seconds

/// One recognition result for an utterance in progress or completed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcript {
    /// Recognized text
    pub text: String,
    /// Final (stable) result vs partial (unstable) result
    pub is_final: bool,
}

impl Transcript {
    /// A partial (in-progress) result
    #[must_use]
    pub const fn partial(text: String) -> Self {
        Self { text, is_final: false }
    }

    /// A final (stable) result
    #[must_use]
    pub const fn final_result(text: String) -> Self {
        Self { text, is_final: true }
    }
}

/// Streaming decoder contract: push one frame, optionally get a result
#[async_trait]
pub trait StreamingRecognizer: Send {
    /// Accept one audio frame; may yield a partial or final transcript
    async fn accept(&mut self, frame: &[f32]) -> Result<Option<Transcript>>;
}

/// Response from OpenAI Whisper transcription API
#[derive(serde::Deserialize)]
struct WhisperResponse {
    text: String,
}

/// Response from Deepgram transcription API
#[derive(serde::Deserialize)]
struct DeepgramResponse {
    results: DeepgramResults,
}

#[derive(serde::Deserialize)]
struct DeepgramResults {
    channels: Vec<DeepgramChannel>,
}

#[derive(serde::Deserialize)]
struct DeepgramChannel {
    alternatives: Vec<DeepgramAlternative>,
}

#[derive(serde::Deserialize)]
struct DeepgramAlternative {
    transcript: String,
}

/// STT provider backend
#[derive(Clone, Copy, Debug)]
enum SttProvider {
    Whisper,
    Deepgram,
}

/// Transcribes buffered speech to text over HTTP
pub struct SpeechToText {
    client: reqwest::Client,
    api_key: String,
    model: String,
    provider: SttProvider,
}

impl SpeechToText {
    /// Create a new STT instance using `OpenAI` Whisper
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new_whisper(api_key: String, model: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(
                "OpenAI API key required for Whisper".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            provider: SttProvider::Whisper,
        })
    }

    /// Create a new STT instance using Deepgram
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new_deepgram(api_key: String, model: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config("Deepgram API key required".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            provider: SttProvider::Deepgram,
        })
    }

    /// Transcribe WAV audio bytes to text
    ///
    /// # Errors
    ///
    /// Returns error if the transcription request fails
    pub async fn transcribe(&self, audio: &[u8]) -> Result<String> {
        match self.provider {
            SttProvider::Whisper => self.transcribe_whisper(audio).await,
            SttProvider::Deepgram => self.transcribe_deepgram(audio).await,
        }
    }

    /// Transcribe using OpenAI Whisper
    async fn transcribe_whisper(&self, audio: &[u8]) -> Result<String> {
        tracing::debug!(audio_bytes = audio.len(), "starting Whisper transcription");

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(audio.to_vec())
                    .file_name("audio.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| Error::Stt(e.to_string()))?,
            )
            .text("model", self.model.clone());

        let response = self
            .client
            .post("https://api.openai.com/v1/audio/transcriptions")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Stt(format!("Whisper API error {status}: {body}")));
        }

        let result: WhisperResponse = response.json().await?;
        Ok(result.text)
    }

    /// Transcribe using Deepgram
    async fn transcribe_deepgram(&self, audio: &[u8]) -> Result<String> {
        tracing::debug!(audio_bytes = audio.len(), "starting Deepgram transcription");

        let url = format!(
            "https://api.deepgram.com/v1/listen?model={}&punctuate=true",
            self.model
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Token {}", self.api_key))
            .header("Content-Type", "audio/wav")
            .body(audio.to_vec())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Stt(format!("Deepgram API error {status}: {body}")));
        }

        let result: DeepgramResponse = response.json().await?;

        let transcript = result
            .results
            .channels
            .first()
            .and_then(|c| c.alternatives.first())
            .map(|a| a.transcript.clone())
            .unwrap_or_default();

        Ok(transcript)
    }
}

/// Endpointing state for the segmenter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SegmentState {
    /// Waiting for speech
    Idle,
    /// Accumulating an utterance
    Speech,
}

/// Streaming recognizer built from energy endpointing + batch HTTP STT
///
/// Accumulates speech while energy stays above a threshold, issues partial
/// transcriptions on a fixed cadence, and finalizes once enough trailing
/// silence is seen. Transcription failures on individual segments are
/// logged and swallowed; the stream keeps going.
pub struct SegmentingRecognizer {
    stt: SpeechToText,
    sample_rate: u32,
    state: SegmentState,
    speech_buffer: Vec<f32>,
    silence_counter: usize,
    since_partial: usize,
    last_partial: String,
}

impl SegmentingRecognizer {
    /// Create a new segmenting recognizer
    #[must_use]
    pub const fn new(stt: SpeechToText, sample_rate: u32) -> Self {
        Self {
            stt,
            sample_rate,
            state: SegmentState::Idle,
            speech_buffer: Vec::new(),
            silence_counter: 0,
            since_partial: 0,
            last_partial: String::new(),
        }
    }

    /// Reset to idle, discarding any accumulated speech
    fn reset(&mut self) {
        self.state = SegmentState::Idle;
        self.speech_buffer.clear();
        self.silence_counter = 0;
        self.since_partial = 0;
        self.last_partial.clear();
    }

    /// Transcribe the current speech buffer, mapping failures to `None`
    async fn try_transcribe(&self) -> Option<String> {
        let wav = match samples_to_wav(&self.speech_buffer, self.sample_rate) {
            Ok(wav) => wav,
            Err(e) => {
                tracing::warn!(error = %e, "segment WAV encoding failed");
                return None;
            }
        };

        match self.stt.transcribe(&wav).await {
            Ok(text) => {
                let text = text.trim().to_string();
                (!text.is_empty()).then_some(text)
            }
            Err(e) => {
                tracing::warn!(error = %e, "segment transcription failed");
                None
            }
        }
    }
}

#[async_trait]
impl StreamingRecognizer for SegmentingRecognizer {
    async fn accept(&mut self, frame: &[f32]) -> Result<Option<Transcript>> {
        let energy = calculate_energy(frame);
        let is_speech = energy > ENERGY_THRESHOLD;

        match self.state {
            SegmentState::Idle => {
                if is_speech {
                    self.state = SegmentState::Speech;
                    self.speech_buffer.clear();
                    self.speech_buffer.extend_from_slice(frame);
                    self.silence_counter = 0;
                    self.since_partial = 0;
                    tracing::trace!(energy, "speech detected");
                }
                Ok(None)
            }
            SegmentState::Speech => {
                self.speech_buffer.extend_from_slice(frame);

                if is_speech {
                    self.silence_counter = 0;
                    self.since_partial += frame.len();
                } else {
                    self.silence_counter += frame.len();
                }

                // Endpoint: enough speech followed by enough silence
                if self.silence_counter > SILENCE_SAMPLES
                    && self.speech_buffer.len() > MIN_SPEECH_SAMPLES
                {
                    let text = self.try_transcribe().await;
                    self.reset();
                    return Ok(text.map(Transcript::final_result));
                }

                // Timeout: silence without enough speech
                if self.silence_counter > SILENCE_SAMPLES * 2 {
                    tracing::trace!("segment timeout, resetting");
                    self.reset();
                    return Ok(None);
                }

                // Partial cadence while speech is ongoing
                if is_speech && self.since_partial >= PARTIAL_INTERVAL_SAMPLES {
                    self.since_partial = 0;
                    if let Some(text) = self.try_transcribe().await {
                        if text != self.last_partial {
                            self.last_partial = text.clone();
                            return Ok(Some(Transcript::partial(text)));
                        }
                    }
                }

                Ok(None)
            }
        }
    }
}

/// Calculate RMS energy of audio samples
#[allow(clippy::cast_precision_loss)]
fn calculate_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}
