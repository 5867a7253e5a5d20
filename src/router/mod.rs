//! Command router — the orchestrator core
//!
//! A single logical event loop consumes capture events in arrival order,
//! tracks assistant state, cancels speech on barge-in, applies the security
//! gate, and dispatches to intent resolution and plugin execution. A failed
//! command never takes the loop down: the top of the dispatch path catches
//! everything, apologizes, and resets to idle.

mod builtin;
mod intent;
mod plugins;

pub use builtin::builtin_registry;
pub use intent::{
    fast_path_intent, is_system_command, FastPath, HttpIntentClassifier, IntentClassifier,
    IntentResolution,
};
pub use plugins::{CommandPlugin, PluginOutcome, PluginRegistry, UiCommand};

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;

use crate::audio::SAMPLE_RATE;
use crate::capture::CaptureControl;
use crate::chat::{ChatHistory, ChatModel};
use crate::context::ContextProbe;
use crate::db::MemoryRepo;
use crate::events::CaptureEvent;
use crate::security::SecurityManager;
use crate::speaker::{EnrollmentFlow, SpeakerEmbedder, SpeakerId, StepOutcome, VoiceRegistry};
use crate::speech::SpeechOutput;
use crate::ui::{AvatarUi, UiState};
use crate::{Error, Result};

/// Maximum chat turns retained for context
const MAX_HISTORY_TURNS: usize = 10;

/// Router state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterState {
    /// Waiting for commands
    Idle,
    /// Capturing an utterance
    Listening,
    /// Resolving or executing a command
    Thinking,
    /// Speaking a response
    Speaking,
}

impl RouterState {
    const fn ui_state(self) -> UiState {
        match self {
            Self::Idle => UiState::Idle,
            Self::Listening => UiState::Listening,
            Self::Thinking => UiState::Thinking,
            Self::Speaking => UiState::Speaking,
        }
    }
}

/// Collaborators wired into the router
pub struct RouterParts {
    /// Authorization policy and audit
    pub security: Arc<SecurityManager>,
    /// Owner profile persistence
    pub registry: VoiceRegistry,
    /// Embedder used to build the owner profile at enrollment
    pub embedder: Arc<dyn SpeakerEmbedder>,
    /// Intent → handler dispatch table
    pub plugins: PluginRegistry,
    /// Remote intent classifier
    pub classifier: Arc<dyn IntentClassifier>,
    /// Chat model for general conversation
    pub chat: Arc<dyn ChatModel>,
    /// Long-term memory store
    pub memory: MemoryRepo,
    /// Foreground-application context probe
    pub context: Arc<dyn ContextProbe>,
    /// Speech output
    pub speech: Arc<dyn SpeechOutput>,
    /// Avatar UI
    pub ui: Arc<dyn AvatarUi>,
    /// Control channel back to the capture worker
    pub capture: Arc<dyn CaptureControl>,
}

/// The orchestrator core
pub struct CommandRouter {
    parts: RouterParts,
    state: RouterState,
    enrollment: Option<EnrollmentFlow>,
    history: ChatHistory,
}

impl CommandRouter {
    /// Create a router over its collaborators
    #[must_use]
    pub fn new(parts: RouterParts) -> Self {
        Self {
            parts,
            state: RouterState::Idle,
            enrollment: None,
            history: ChatHistory::new(MAX_HISTORY_TURNS),
        }
    }

    /// Current router state
    #[must_use]
    pub const fn state(&self) -> RouterState {
        self.state
    }

    /// Whether enrollment is intercepting command routing
    #[must_use]
    pub const fn registration_in_progress(&self) -> bool {
        self.enrollment.is_some()
    }

    /// Consume capture events until the worker dies
    ///
    /// # Errors
    ///
    /// Returns error when the event channel closes, which means the capture
    /// worker process terminated.
    pub async fn run(&mut self, mut events: mpsc::Receiver<CaptureEvent>) -> Result<()> {
        while let Some(event) = events.recv().await {
            self.handle_event(event).await;
        }

        Err(Error::Capture(
            "capture worker terminated unexpectedly".to_string(),
        ))
    }

    /// Handle one capture event
    pub async fn handle_event(&mut self, event: CaptureEvent) {
        match event {
            CaptureEvent::Partial { text } => self.handle_partial(&text).await,
            CaptureEvent::Command {
                text,
                speaker,
                raw_audio,
            } => self.handle_command(&text, speaker, raw_audio).await,
        }
    }

    /// Text typed into the chat panel enters the same pipeline; the
    /// keyboard is trusted, so the speaker is the owner.
    pub async fn handle_text_input(&mut self, text: &str) {
        self.parts.ui.show_chat();
        self.handle_command(text, SpeakerId::Owner, None).await;
    }

    /// Barge-in handling: a partial while the assistant talks either echoes
    /// its own speech (ignored) or interrupts it (cancel and reset)
    async fn handle_partial(&mut self, text: &str) {
        if !self.parts.speech.is_speaking() {
            return;
        }

        let current = self.parts.speech.current_text().to_lowercase();
        let heard = text.to_lowercase();
        if is_echo(&heard, &current) {
            tracing::debug!(partial = text, "echo filtered");
            return;
        }

        tracing::info!(partial = text, "barge-in detected");
        self.parts.speech.stop();
        self.set_state(RouterState::Idle);
        self.parts.capture.set_speaking(false).await;
    }

    /// Handle one finalized command with top-level failure recovery
    pub async fn handle_command(
        &mut self,
        text: &str,
        speaker: SpeakerId,
        raw_audio: Option<Vec<f32>>,
    ) {
        tracing::info!(command = text, speaker = %speaker, "command received");

        if let Err(e) = self.dispatch(text, speaker, raw_audio).await {
            tracing::error!(error = %e, command = text, "command dispatch failed");
            self.speak_and_chat("Hubo un error interno.");
            self.set_state(RouterState::Idle);
        }

        if !self.parts.speech.is_speaking() {
            self.set_state(RouterState::Idle);
            self.parts.capture.set_speaking(false).await;
        }
    }

    /// The dispatch algorithm proper
    async fn dispatch(
        &mut self,
        text: &str,
        speaker: SpeakerId,
        raw_audio: Option<Vec<f32>>,
    ) -> Result<()> {
        // Enrollment intercepts everything else
        if self.enrollment.is_some() {
            return self.handle_enrollment_step(text, raw_audio).await;
        }

        // A parked critical action interprets the next utterance as its
        // confirmation, whatever it says
        if self.parts.security.has_pending_action() {
            match self.parts.security.confirm_action(text) {
                Some((intent, params)) => {
                    self.set_state(RouterState::Thinking);
                    self.execute_intent(&intent, &params).await;
                }
                None => {
                    self.speak_and_chat("De acuerdo, acción cancelada.");
                }
            }
            return Ok(());
        }

        let lower = text.to_lowercase();
        if is_system_command(&lower) {
            self.handle_system_command(text, &lower, speaker).await
        } else {
            self.handle_chat(text).await;
            Ok(())
        }
    }

    /// System-command path: resolve intent, gate, execute
    async fn handle_system_command(
        &mut self,
        text: &str,
        lower: &str,
        speaker: SpeakerId,
    ) -> Result<()> {
        self.set_state(RouterState::Thinking);

        let resolution = match fast_path_intent(lower) {
            Some(FastPath::StartEnrollment) => {
                self.start_enrollment().await;
                return Ok(());
            }
            Some(FastPath::Intent(resolution)) => resolution,
            None => self.parts.classifier.classify(text).await?,
        };

        if resolution.intent == "general_chat" {
            self.handle_chat(text).await;
            return Ok(());
        }

        if !self
            .parts
            .security
            .is_authorized(&resolution.intent, speaker)
        {
            self.speak_and_chat("Acceso denegado por seguridad de voz.");
            return Ok(());
        }

        // Voice change talks to the speech engine, not a plugin
        if resolution.intent == "change_voice" {
            let request = resolution.params["voice_request"]
                .as_str()
                .unwrap_or(text)
                .to_string();
            self.parts.speech.set_voice(&request);
            self.speak_and_chat("Listo, probaré con esa voz.");
            return Ok(());
        }

        // Power-class actions wait for verbal confirmation
        if requires_confirmation(&resolution.intent, &resolution.params) {
            self.parts
                .security
                .set_pending_action(&resolution.intent, resolution.params);
            self.speak_and_chat(
                "Esa es una acción crítica. Dime sí para confirmar, o cualquier otra cosa para cancelar.",
            );
            return Ok(());
        }

        self.execute_intent(&resolution.intent, &resolution.params)
            .await;
        Ok(())
    }

    /// Run the plugin for a resolved, authorized intent
    async fn execute_intent(&mut self, intent: &str, params: &Value) {
        let context = self.parts.context.current().await;

        match self
            .parts
            .plugins
            .execute(intent, params, &context, &self.parts.memory)
            .await
        {
            Some(Ok(outcome)) => self.apply_outcome(outcome),
            Some(Err(e)) => {
                tracing::error!(error = %e, intent, "plugin execution failed");
                self.speak_and_chat("Hubo un problema ejecutando esa acción.");
            }
            None => {
                self.speak_and_chat("Lo siento, no tengo un plugin configurado para esa acción.");
            }
        }
    }

    /// Interpret a plugin outcome
    fn apply_outcome(&mut self, outcome: PluginOutcome) {
        match outcome {
            PluginOutcome::Spoken(text) => self.speak_and_chat(&text),
            PluginOutcome::Ui(UiCommand::ShowChat) => {
                self.parts.ui.show_chat();
                self.speak_and_chat("¡Aquí estoy! Escríbeme lo que quieras.");
            }
            PluginOutcome::Ui(UiCommand::HideChat) => {
                self.parts.ui.hide_chat();
                self.speak_and_chat("Chat cerrado. Sigo escuchándote por voz.");
            }
            PluginOutcome::Denied(reason) => {
                self.speak_and_chat(&reason);
            }
        }
    }

    /// General chat: memory cache first, then the streamed model
    async fn handle_chat(&mut self, text: &str) {
        self.set_state(RouterState::Thinking);

        let lookup = {
            let memory = self.parts.memory.clone();
            let question = text.to_string();
            tokio::task::spawn_blocking(move || memory.cached_answer(&question)).await
        };
        match lookup {
            Ok(Ok(Some(answer))) => {
                self.speak_and_chat(&answer);
                return;
            }
            Ok(Ok(None)) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "memory lookup failed"),
            Err(e) => tracing::warn!(error = %e, "memory lookup task failed"),
        }

        let mut rx = match self
            .parts
            .chat
            .stream_chat(text, &self.history.turns())
            .await
        {
            Ok(rx) => rx,
            Err(e) => {
                tracing::warn!(error = %e, "chat model unavailable");
                self.speak_and_chat("Lo siento, no puedo responder en este momento.");
                return;
            }
        };

        // Speak each sentence as it arrives instead of waiting for the
        // whole answer
        let mut full_response = String::new();
        while let Some(sentence) = rx.recv().await {
            self.speak_and_chat(&sentence);
            full_response.push_str(&sentence);
            full_response.push(' ');
        }

        let full_response = full_response.trim().to_string();
        if full_response.is_empty() {
            return;
        }

        self.history.push("user", text);
        self.history.push("assistant", &full_response);

        // Persist the exchange off the interactive path
        let memory = self.parts.memory.clone();
        let question = text.to_string();
        tokio::task::spawn_blocking(move || {
            if let Err(e) = memory.store_exchange(&question, &full_response) {
                tracing::warn!(error = %e, "failed to persist exchange");
            }
        });
    }

    /// Begin voice enrollment
    async fn start_enrollment(&mut self) {
        let flow = EnrollmentFlow::new();
        let first_prompt = flow.current_prompt();

        self.enrollment = Some(flow);
        self.parts.capture.set_registration(true).await;
        self.parts.ui.show_chat();

        self.speak_and_chat(
            "Iniciando registro de voz. Por favor, repite conmigo las siguientes frases.",
        );
        self.parts.speech.speak(first_prompt);
        self.parts
            .ui
            .assistant_message(&format!("Paso 1/3. Repite:\n\"{first_prompt}\""));
    }

    /// Drive one enrollment step
    async fn handle_enrollment_step(
        &mut self,
        text: &str,
        raw_audio: Option<Vec<f32>>,
    ) -> Result<()> {
        let Some(flow) = self.enrollment.as_mut() else {
            return Ok(());
        };

        match flow.accept(text, raw_audio) {
            StepOutcome::Retry { prompt } => {
                self.speak_and_chat(&format!("No te entendí bien. Repite con claridad: {prompt}"));
            }
            StepOutcome::Advance { step, prompt } => {
                self.speak_and_chat(&format!("Muy bien. Ahora di: {prompt}"));
                self.parts
                    .ui
                    .assistant_message(&format!("Paso {step}/3. Repite:\n\"{prompt}\""));
            }
            StepOutcome::Finished { utterances } => {
                self.enrollment = None;
                self.parts.capture.set_registration(false).await;
                self.finish_enrollment(utterances).await;
                self.parts.ui.hide_chat();
            }
        }

        Ok(())
    }

    /// Build and persist the owner profile from collected audio
    async fn finish_enrollment(&mut self, utterances: Vec<Vec<f32>>) {
        if utterances.is_empty() {
            self.speak_and_chat("No pude capturar suficiente audio. El registro ha fallado.");
            return;
        }

        let result = self
            .parts
            .registry
            .register_owner_from_list(&utterances, SAMPLE_RATE, &*self.parts.embedder)
            .await;

        match result {
            Ok(()) => {
                // The worker keeps verifying against its in-memory copy
                // until told the file changed
                self.parts.capture.reload_profile().await;
                self.speak_and_chat(
                    "Proceso de registro finalizado. Tu identidad de voz ha sido guardada con éxito.",
                );
            }
            Err(e) => {
                tracing::error!(error = %e, "enrollment failed");
                self.speak_and_chat(
                    "Hubo un problema al procesar tu voz. Por favor, intenta de nuevo más tarde.",
                );
            }
        }
    }

    /// Speak a response and mirror it into the chat panel
    fn speak_and_chat(&mut self, text: &str) {
        self.parts.speech.speak(text);
        self.parts.ui.assistant_message(text);
        self.set_state(RouterState::Speaking);
    }

    fn set_state(&mut self, state: RouterState) {
        self.state = state;
        self.parts.ui.set_state(state.ui_state());
    }
}

/// Whether an intent must be confirmed verbally before execution
fn requires_confirmation(intent: &str, params: &Value) -> bool {
    match intent {
        "system_control" => matches!(
            params["action"].as_str(),
            Some("shutdown" | "restart")
        ),
        "shutdown" | "restart" | "delete_file" | "move_file" => true,
        _ => false,
    }
}

/// Echo test: the heard partial is a substring of what is being spoken, or
/// its first half is (recognition often trails the playback)
fn is_echo(heard: &str, current_speech: &str) -> bool {
    if heard.is_empty() || current_speech.is_empty() {
        return false;
    }

    if current_speech.contains(heard) {
        return true;
    }

    let chars: Vec<char> = heard.chars().collect();
    if chars.len() > 3 {
        let half: String = chars[..chars.len() / 2].iter().collect();
        if current_speech.contains(&half) {
            return true;
        }
    }

    false
}
