//! Speech output
//!
//! [`SpeechOutput`] is the contract the router drives: enqueue text, stop on
//! barge-in, and observe what is currently being spoken for echo filtering.
//! [`VoiceEngine`] implements it with a dedicated worker thread that
//! synthesizes each queued utterance and plays it, firing start/stop
//! callbacks that feed the speaking-state flag back to the capture worker.

mod playback;
mod synth;

pub use playback::AudioPlayback;
pub use synth::Synthesizer;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex};

/// Callback fired when speech starts (`true`) or stops (`false`)
pub type SpeakingCallback = Box<dyn Fn(bool) + Send + Sync>;

/// Speech-output collaborator contract
pub trait SpeechOutput: Send + Sync {
    /// Enqueue text for speaking (non-blocking)
    fn speak(&self, text: &str);

    /// Cancel current playback and discard queued utterances
    fn stop(&self);

    /// Whether an utterance is being synthesized or played right now
    fn is_speaking(&self) -> bool;

    /// Text of the utterance currently being spoken (empty when idle)
    fn current_text(&self) -> String;

    /// Switch the TTS voice for subsequent utterances
    fn set_voice(&self, voice: &str);
}

/// Shared state between the engine handle and its worker thread
struct EngineShared {
    speaking: AtomicBool,
    stop_flag: AtomicBool,
    generation: AtomicU64,
    current_text: Mutex<String>,
    voice: Mutex<String>,
    callback: Mutex<Option<SpeakingCallback>>,
}

impl EngineShared {
    fn notify(&self, active: bool) {
        if let Some(callback) = self.callback.lock().unwrap().as_ref() {
            callback(active);
        }
    }
}

/// Queue-based speech engine
///
/// `stop` bumps a generation counter so utterances enqueued before the stop
/// are discarded when dequeued, and raises a flag that interrupts the
/// playback loop mid-utterance.
pub struct VoiceEngine {
    tx: mpsc::Sender<(u64, String)>,
    shared: Arc<EngineShared>,
}

impl VoiceEngine {
    /// Create the engine and start its worker thread
    #[must_use]
    pub fn new(synth: Synthesizer, voice: String) -> Self {
        let shared = Arc::new(EngineShared {
            speaking: AtomicBool::new(false),
            stop_flag: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            current_text: Mutex::new(String::new()),
            voice: Mutex::new(voice),
            callback: Mutex::new(None),
        });

        let (tx, rx) = mpsc::channel::<(u64, String)>();
        let worker_shared = Arc::clone(&shared);

        std::thread::Builder::new()
            .name("speech-worker".to_string())
            .spawn(move || speech_worker(&rx, &worker_shared, &synth))
            .expect("failed to spawn speech worker thread");

        Self { tx, shared }
    }

    /// Register the speaking-state callback
    pub fn set_speaking_callback(&self, callback: SpeakingCallback) {
        *self.shared.callback.lock().unwrap() = Some(callback);
    }
}

impl SpeechOutput for VoiceEngine {
    fn speak(&self, text: &str) {
        if text.trim().is_empty() {
            return;
        }
        let generation = self.shared.generation.load(Ordering::SeqCst);
        if self.tx.send((generation, text.to_string())).is_err() {
            tracing::error!("speech worker gone, dropping utterance");
        }
    }

    fn stop(&self) {
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        self.shared.stop_flag.store(true, Ordering::SeqCst);
        tracing::debug!("speech stop requested");
    }

    fn is_speaking(&self) -> bool {
        self.shared.speaking.load(Ordering::SeqCst)
    }

    fn current_text(&self) -> String {
        self.shared.current_text.lock().unwrap().clone()
    }

    fn set_voice(&self, voice: &str) {
        *self.shared.voice.lock().unwrap() = voice.to_string();
        tracing::info!(voice, "TTS voice changed");
    }
}

/// Worker loop: dequeue, synthesize, play
fn speech_worker(
    rx: &mpsc::Receiver<(u64, String)>,
    shared: &Arc<EngineShared>,
    synth: &Synthesizer,
) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!(error = %e, "speech worker runtime init failed");
            return;
        }
    };

    // Playback init failure degrades to text-only operation
    let playback = match AudioPlayback::new() {
        Ok(playback) => Some(playback),
        Err(e) => {
            tracing::error!(error = %e, "audio playback unavailable, running silent");
            None
        }
    };

    while let Ok((generation, text)) = rx.recv() {
        // Discard utterances superseded by a stop
        if generation < shared.generation.load(Ordering::SeqCst) {
            tracing::debug!(text, "discarding cancelled utterance");
            continue;
        }
        shared.stop_flag.store(false, Ordering::SeqCst);

        shared.speaking.store(true, Ordering::SeqCst);
        *shared.current_text.lock().unwrap() = text.clone();
        shared.notify(true);

        let voice = shared.voice.lock().unwrap().clone();
        tracing::debug!(%text, voice, "speaking");

        match runtime.block_on(synth.synthesize(&text, &voice)) {
            Ok(audio) => {
                if let Some(playback) = &playback {
                    if let Err(e) = playback.play_mp3(&audio, &shared.stop_flag) {
                        tracing::error!(error = %e, "playback failed");
                    }
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "synthesis failed");
            }
        }

        shared.current_text.lock().unwrap().clear();
        shared.speaking.store(false, Ordering::SeqCst);
        shared.stop_flag.store(false, Ordering::SeqCst);
        shared.notify(false);
    }
}
