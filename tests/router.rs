//! Command router integration tests
//!
//! Drives the router with scripted collaborators: no audio hardware, no
//! network, no child process.

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use common::{
    FakeCapture, FakeSpeech, FixedEmbedder, RecordingUi, ScriptedChat, StaticProbe,
    TableClassifier,
};
use nimbus_assistant::context::ForegroundContext;
use nimbus_assistant::db::{self, MemoryRepo};
use nimbus_assistant::events::CaptureEvent;
use nimbus_assistant::router::{
    builtin_registry, CommandPlugin, CommandRouter, IntentResolution, PluginOutcome,
    RouterParts, RouterState,
};
use nimbus_assistant::security::{AuditLog, SecurityManager};
use nimbus_assistant::speaker::{SpeakerId, VoiceRegistry, ENROLLMENT_PHRASES};
use nimbus_assistant::speech::SpeechOutput;
use nimbus_assistant::Result;

/// Plugin double that records executions instead of touching the system
struct RecordingPlugin {
    name: &'static str,
    executions: Arc<std::sync::atomic::AtomicUsize>,
}

#[async_trait]
impl CommandPlugin for RecordingPlugin {
    fn intent(&self) -> &'static str {
        self.name
    }

    async fn execute(
        &self,
        _params: &Value,
        _context: &ForegroundContext,
        _memory: &MemoryRepo,
    ) -> Result<PluginOutcome> {
        self.executions
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(PluginOutcome::Spoken("Hecho.".to_string()))
    }
}

/// Everything a router test needs to observe
struct Harness {
    router: CommandRouter,
    speech: Arc<FakeSpeech>,
    capture: Arc<FakeCapture>,
    ui: Arc<RecordingUi>,
    classifier: Arc<TableClassifier>,
    chat: Arc<ScriptedChat>,
    memory: MemoryRepo,
    audit_dir: tempfile::TempDir,
    system_control_executions: Arc<std::sync::atomic::AtomicUsize>,
}

impl Harness {
    fn audit_contents(&self) -> String {
        std::fs::read_to_string(self.audit_dir.path().join("audit.log")).unwrap_or_default()
    }
}

fn harness(classifier_entries: Vec<(&str, IntentResolution)>, chat_sentences: Vec<&str>) -> Harness {
    let audit_dir = tempfile::tempdir().unwrap();
    let security = Arc::new(SecurityManager::with_parts(
        None,
        Duration::from_secs(300),
        AuditLog::new(audit_dir.path().join("audit.log")),
    ));

    let memory = MemoryRepo::new(db::init_memory().unwrap());
    let speech = FakeSpeech::new();
    let capture = FakeCapture::new();
    let ui = RecordingUi::new();
    let classifier = TableClassifier::new(classifier_entries);
    let chat = ScriptedChat::new(chat_sentences);

    // Swap the real system-control plugin for a recorder so tests never
    // issue shutdown commands
    let system_control_executions = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let mut plugins = builtin_registry();
    plugins.replace(Arc::new(RecordingPlugin {
        name: "system_control",
        executions: Arc::clone(&system_control_executions),
    }));

    let router = CommandRouter::new(RouterParts {
        security,
        registry: VoiceRegistry::new(audit_dir.path().join("owner_voice.bin")),
        embedder: Arc::new(FixedEmbedder::new(Some(vec![1.0, 0.0]))),
        plugins,
        classifier: classifier.clone(),
        chat: chat.clone(),
        memory: memory.clone(),
        context: Arc::new(StaticProbe),
        speech: speech.clone(),
        ui: ui.clone(),
        capture: capture.clone(),
    });

    Harness {
        router,
        speech,
        capture,
        ui,
        classifier,
        chat,
        memory,
        audit_dir,
        system_control_executions,
    }
}

fn shutdown_resolution() -> IntentResolution {
    IntentResolution {
        intent: "system_control".to_string(),
        params: json!({"action": "shutdown"}),
    }
}

#[tokio::test]
async fn test_time_command_uses_local_fast_path() {
    let mut h = harness(vec![], vec![]);

    h.router
        .handle_command("qué hora es", SpeakerId::Guest, None)
        .await;

    // Local rule resolved it: the classifier never ran
    assert_eq!(h.classifier.call_count(), 0);
    let spoken = h.speech.last_spoken().unwrap();
    assert!(spoken.starts_with("Son las "), "unexpected reply: {spoken}");
}

#[tokio::test]
async fn test_guest_shutdown_is_denied_and_audited() {
    let mut h = harness(
        vec![("apaga la computadora", shutdown_resolution())],
        vec![],
    );

    h.router
        .handle_command("apaga la computadora", SpeakerId::Guest, None)
        .await;

    assert_eq!(h.classifier.call_count(), 1);
    assert_eq!(
        h.speech.last_spoken().as_deref(),
        Some("Acceso denegado por seguridad de voz.")
    );

    // No plugin ran, one DENIED audit entry written
    assert_eq!(
        h.system_control_executions
            .load(std::sync::atomic::Ordering::SeqCst),
        0
    );
    let audit = h.audit_contents();
    assert_eq!(audit.matches("outcome=DENIED").count(), 1);
    assert!(audit.contains("intent=system_control"));
    assert!(audit.contains("speaker=GUEST"));
}

#[tokio::test]
async fn test_owner_shutdown_waits_for_confirmation() {
    let mut h = harness(
        vec![("apaga la computadora", shutdown_resolution())],
        vec![],
    );

    h.router
        .handle_command("apaga la computadora", SpeakerId::Owner, None)
        .await;

    // Parked, not executed
    assert_eq!(
        h.system_control_executions
            .load(std::sync::atomic::Ordering::SeqCst),
        0
    );
    assert!(h.speech.last_spoken().unwrap().contains("acción crítica"));

    h.router.handle_command("sí", SpeakerId::Owner, None).await;

    assert_eq!(
        h.system_control_executions
            .load(std::sync::atomic::Ordering::SeqCst),
        1
    );
    assert_eq!(h.speech.last_spoken().as_deref(), Some("Hecho."));
}

#[tokio::test]
async fn test_negative_confirmation_cancels() {
    let mut h = harness(
        vec![("apaga la computadora", shutdown_resolution())],
        vec![],
    );

    h.router
        .handle_command("apaga la computadora", SpeakerId::Owner, None)
        .await;
    h.router
        .handle_command("no, mejor no", SpeakerId::Owner, None)
        .await;

    assert_eq!(
        h.system_control_executions
            .load(std::sync::atomic::Ordering::SeqCst),
        0
    );
    assert_eq!(
        h.speech.last_spoken().as_deref(),
        Some("De acuerdo, acción cancelada.")
    );
    assert!(h.audit_contents().contains("outcome=CANCELLED"));
}

#[tokio::test]
async fn test_echo_partial_is_ignored() {
    let mut h = harness(vec![], vec![]);
    h.speech.start_speaking("Hola, soy Nimbus");

    h.router
        .handle_event(CaptureEvent::Partial {
            text: "soy nimb".to_string(),
        })
        .await;

    // Playback continues uninterrupted
    assert_eq!(h.speech.stop_count(), 0);
    assert!(h.speech.is_speaking());
}

#[tokio::test]
async fn test_genuine_interruption_cancels_speech() {
    let mut h = harness(vec![], vec![]);
    h.speech.start_speaking("Hola, soy Nimbus");

    h.router
        .handle_event(CaptureEvent::Partial {
            text: "oye espera".to_string(),
        })
        .await;

    assert_eq!(h.speech.stop_count(), 1);
    assert_eq!(h.router.state(), RouterState::Idle);
    // The speaking flag fed back to the capture worker is cleared
    assert_eq!(h.capture.last_speaking(), Some(false));
}

#[tokio::test]
async fn test_partial_while_silent_is_noop() {
    let mut h = harness(vec![], vec![]);

    h.router
        .handle_event(CaptureEvent::Partial {
            text: "hola".to_string(),
        })
        .await;

    assert_eq!(h.speech.stop_count(), 0);
}

#[tokio::test]
async fn test_general_chat_streams_sentences() {
    let mut h = harness(vec![], vec!["Claro.", "Los gatos duermen mucho."]);

    h.router
        .handle_command("cuéntame sobre los gatos", SpeakerId::Guest, None)
        .await;

    assert_eq!(h.chat.call_count(), 1);
    let spoken = h.speech.spoken_texts();
    assert!(spoken.contains(&"Claro.".to_string()));
    assert!(spoken.contains(&"Los gatos duermen mucho.".to_string()));

    // The exchange lands in memory off the interactive path
    tokio::time::sleep(Duration::from_millis(100)).await;
    let cached = h.memory.cached_answer("cuéntame sobre los gatos").unwrap();
    assert_eq!(
        cached.as_deref(),
        Some("Claro. Los gatos duermen mucho.")
    );
}

#[tokio::test]
async fn test_cached_answer_skips_chat_model() {
    let mut h = harness(vec![], vec!["Nunca debería llegar aquí."]);
    h.memory
        .store_exchange("cuéntame sobre los gatos", "Ya te lo conté.")
        .unwrap();

    h.router
        .handle_command("cuéntame sobre los gatos", SpeakerId::Guest, None)
        .await;

    assert_eq!(h.chat.call_count(), 0);
    assert_eq!(h.speech.last_spoken().as_deref(), Some("Ya te lo conté."));
}

#[tokio::test]
async fn test_enrollment_intercepts_routing() {
    let mut h = harness(vec![], vec![]);

    h.router
        .handle_command("registra mi voz", SpeakerId::Owner, None)
        .await;

    assert!(h.router.registration_in_progress());
    assert_eq!(h.capture.last_registration(), Some(true));

    // While enrolling, even a known command goes to the step handler
    h.router
        .handle_command("qué hora es", SpeakerId::Owner, None)
        .await;
    let spoken = h.speech.last_spoken().unwrap();
    assert!(
        !spoken.starts_with("Son las "),
        "time plugin ran during enrollment: {spoken}"
    );
}

#[tokio::test]
async fn test_full_enrollment_persists_profile_and_reloads() {
    let mut h = harness(vec![], vec![]);

    h.router
        .handle_command("registra mi voz", SpeakerId::Owner, None)
        .await;

    for phrase in ENROLLMENT_PHRASES {
        h.router
            .handle_command(phrase, SpeakerId::Guest, Some(vec![0.1; 16000]))
            .await;
    }

    assert!(!h.router.registration_in_progress());
    assert_eq!(h.capture.last_registration(), Some(false));
    assert_eq!(h.capture.reload_count(), 1);
    assert!(h
        .speech
        .spoken_texts()
        .iter()
        .any(|t| t.contains("guardada con éxito")));

    // Profile on disk, unit-normalized
    let registry = VoiceRegistry::new(h.audit_dir.path().join("owner_voice.bin"));
    let profile = registry.load_owner_profile().unwrap().unwrap();
    assert!((profile.l2_norm() - 1.0).abs() < 1e-6);
}

#[tokio::test]
async fn test_enrollment_without_audio_fails_gracefully() {
    let mut h = harness(vec![], vec![]);

    h.router
        .handle_command("registra mi voz", SpeakerId::Owner, None)
        .await;

    // Accepted utterances but no raw audio attached
    for phrase in ENROLLMENT_PHRASES {
        h.router.handle_command(phrase, SpeakerId::Guest, None).await;
    }

    assert!(!h.router.registration_in_progress());
    assert!(h
        .speech
        .spoken_texts()
        .iter()
        .any(|t| t.contains("registro ha fallado")));
    assert_eq!(h.capture.reload_count(), 0);
}

#[tokio::test]
async fn test_show_chat_command_drives_ui() {
    let mut h = harness(vec![], vec![]);

    h.router
        .handle_command("abre el chat", SpeakerId::Guest, None)
        .await;

    assert_eq!(
        h.ui.chat_shown.load(std::sync::atomic::Ordering::SeqCst),
        1
    );
}

#[tokio::test]
async fn test_change_voice_switches_tts_voice() {
    let mut h = harness(vec![], vec![]);

    h.router
        .handle_command("habla como argentino", SpeakerId::Guest, None)
        .await;

    assert_eq!(h.speech.voice.lock().unwrap().as_str(), "argentino");
}

#[tokio::test]
async fn test_text_input_is_trusted_as_owner() {
    let mut h = harness(
        vec![("apaga la computadora", shutdown_resolution())],
        vec![],
    );

    h.router.handle_text_input("apaga la computadora").await;

    // Keyboard input is Owner: the action parks for confirmation instead
    // of being denied
    assert!(h.speech.last_spoken().unwrap().contains("acción crítica"));
}

#[tokio::test]
async fn test_classifier_general_chat_reroutes() {
    // The classifier can bounce an ambiguous system-looking utterance back
    // to general chat
    let mut h = harness(
        vec![(
            "sube el volumen de mi ánimo",
            IntentResolution::general_chat("sube el volumen de mi ánimo"),
        )],
        vec!["¡Ánimo!"],
    );

    h.router
        .handle_command("sube el volumen de mi ánimo", SpeakerId::Guest, None)
        .await;

    assert_eq!(h.classifier.call_count(), 1);
    assert_eq!(h.chat.call_count(), 1);
    assert!(h.speech.spoken_texts().contains(&"¡Ánimo!".to_string()));
}
