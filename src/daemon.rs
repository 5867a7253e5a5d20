//! Daemon - the assistant service
//!
//! Wires the capture worker process, the speech engine, and the command
//! router together and runs until interrupted or the worker dies.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::breaker::CircuitBreaker;
use crate::capture::{CaptureControl, CaptureProcess};
use crate::chat::HttpChatModel;
use crate::config::Config;
use crate::context::ProcessProbe;
use crate::db::{self, MemoryRepo};
use crate::router::{builtin_registry, CommandRouter, HttpIntentClassifier, RouterParts};
use crate::security::SecurityManager;
use crate::speaker::{HttpSpeakerEmbedder, VoiceRegistry};
use crate::speech::{SpeechOutput, Synthesizer, VoiceEngine};
use crate::ui::NullUi;
use crate::Result;

/// The Nimbus daemon
pub struct Daemon {
    config: Config,
}

impl Daemon {
    /// Create a daemon from configuration
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run the daemon until interrupted
    ///
    /// # Errors
    ///
    /// Returns error on initialization failure or when the capture worker
    /// dies unexpectedly.
    pub async fn run(self) -> Result<()> {
        let db_path = self.config.db_path();
        let pool = db::init(&db_path)?;
        let memory = MemoryRepo::new(pool);
        tracing::info!(path = %db_path.display(), "database initialized");

        let security = Arc::new(SecurityManager::new(&self.config));
        let registry = VoiceRegistry::new(self.config.profile_path());
        if registry.is_owner_registered() {
            tracing::info!("owner voice profile found");
        } else {
            tracing::warn!("no owner enrolled, critical intents will be denied");
        }

        let embedder = Arc::new(HttpSpeakerEmbedder::new(
            self.config.voice.embedding_url.clone(),
        ));

        let openai_key = self.config.api_keys.openai.clone().unwrap_or_default();
        let synth = Synthesizer::new(
            openai_key.clone(),
            self.config.voice.tts_model.clone(),
            self.config.voice.tts_speed,
        )?;
        let speech = Arc::new(VoiceEngine::new(synth, self.config.voice.tts_voice.clone()));

        let breaker = Arc::new(CircuitBreaker::new());
        let classifier = Arc::new(HttpIntentClassifier::new(
            self.config.model.chat_url.clone(),
            openai_key.clone(),
            self.config.model.chat_model.clone(),
            Arc::clone(&breaker),
        ));
        let chat = Arc::new(HttpChatModel::new(
            self.config.model.chat_url.clone(),
            openai_key,
            self.config.model.chat_model.clone(),
            build_system_prompt(&self.config.assistant_name),
            breaker,
        ));

        let (capture, events) = CaptureProcess::spawn()?;
        let capture = Arc::new(capture);

        // Feed the speaking state back to the capture worker so it can
        // energy-gate partials while the assistant talks
        let (speaking_tx, mut speaking_rx) = mpsc::unbounded_channel::<bool>();
        speech.set_speaking_callback(Box::new(move |active| {
            let _ = speaking_tx.send(active);
        }));
        let feedback_capture: Arc<CaptureProcess> = Arc::clone(&capture);
        tokio::spawn(async move {
            while let Some(active) = speaking_rx.recv().await {
                feedback_capture.set_speaking(active).await;
            }
        });

        let mut router = CommandRouter::new(RouterParts {
            security,
            registry,
            embedder,
            plugins: builtin_registry(),
            classifier,
            chat,
            memory,
            context: Arc::new(ProcessProbe),
            speech: Arc::clone(&speech) as Arc<dyn SpeechOutput>,
            ui: Arc::new(NullUi),
            capture: Arc::clone(&capture) as Arc<dyn CaptureControl>,
        });

        speech.speak(&format!(
            "Hola, soy {}. Te escucho.",
            self.config.assistant_name
        ));
        tracing::info!(name = %self.config.assistant_name, "daemon running");

        let result = tokio::select! {
            result = router.run(events) => result,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown requested");
                Ok(())
            }
        };

        capture.shutdown().await;
        tracing::info!("daemon stopped");
        result
    }
}

/// Build the chat system prompt
fn build_system_prompt(name: &str) -> String {
    format!(
        "Eres {name}, un asistente personal de voz. Responde en español, de forma breve y conversacional."
    )
}
