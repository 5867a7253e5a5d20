//! Intent resolution
//!
//! Two tiers: an immediate local keyword mapping (zero network cost) for
//! common commands, and a remote classifier for anything ambiguous. Remote
//! failures degrade to `general_chat`; rate-limit errors open a circuit
//! breaker that suppresses remote calls for a cooldown window.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::breaker::{is_rate_limit, CircuitBreaker};
use crate::Result;

/// Keywords that mark an utterance as a system command
const SYSTEM_KEYWORDS: &[&str] = &[
    "volumen",
    "abrir",
    "cerrar",
    "apagar",
    "apaga",
    "reiniciar",
    "reinicia",
    "stats",
    "cpu",
    "ram",
    "hora",
    "fecha",
    "tiempo",
    "registrar",
    "registra",
    "graba",
    "identidad",
    "biometría",
    // Voice change triggers
    "habla como",
    "habla en ",
    "habla con voz",
    "habla con acento",
    "cambia tu voz",
    "cambia la voz",
    "cambia el acento",
    "cambia idioma",
    "pon voz",
    "voz de",
    "habla diferente",
    // Chat panel triggers
    "muestra el chat",
    "abre el chat",
    "quiero escribir",
    "muéstrame el chat",
    "muestrame el chat",
    "cierra el chat",
    "oculta el chat",
    "esconde el chat",
    "abre el teclado",
];

/// Prefixes that resolve directly to `open_app`
const OPEN_TRIGGERS: &[&str] = &["abre ", "abrir ", "lanza ", "ejecuta "];

/// Prefixes that resolve directly to `close_app`
const CLOSE_TRIGGERS: &[&str] = &["cierra ", "cerrar ", "detén ", "detener ", "termina ", "quita "];

/// Substrings that resolve to `change_voice`
const VOICE_TRIGGERS: &[&str] = &[
    "habla como",
    "habla en ",
    "habla con voz de",
    "habla con voz",
    "habla con acento",
    "cambia tu voz a",
    "cambia la voz a",
    "cambia tu voz",
    "cambia la voz",
    "cambia el acento a",
    "cambia el acento",
    "cambia idioma a",
    "cambia idioma",
    "pon voz de",
    "pon voz",
    "voz de",
    "habla diferente",
];

/// Phrases that open the chat panel
const CHAT_OPEN_TRIGGERS: &[&str] = &[
    "muestra el chat",
    "abre el chat",
    "quiero escribir",
    "muéstrame el chat",
    "muestrame el chat",
    "abre el teclado",
];

/// Phrases that close the chat panel
const CHAT_CLOSE_TRIGGERS: &[&str] = &["cierra el chat", "oculta el chat", "esconde el chat"];

/// Phrases that start voice enrollment
const ENROLLMENT_TRIGGERS: &[&str] = &["registra", "graba", "identidad", "mi voz", "quién soy", "quien soy"];

/// A resolved intent with its parameters
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct IntentResolution {
    /// Intent name
    pub intent: String,
    /// Intent parameters
    #[serde(default, rename = "parameters")]
    pub params: Value,
}

impl IntentResolution {
    /// Build the `general_chat` fallback for a message
    #[must_use]
    pub fn general_chat(message: &str) -> Self {
        Self {
            intent: "general_chat".to_string(),
            params: json!({ "message": message }),
        }
    }
}

/// Result of the local fast path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FastPath {
    /// Intent resolved locally
    Intent(IntentResolution),
    /// The utterance asks to start voice enrollment
    StartEnrollment,
}

/// Whether the utterance belongs on the system-command path at all
#[must_use]
pub fn is_system_command(text_lower: &str) -> bool {
    SYSTEM_KEYWORDS.iter().any(|k| text_lower.contains(k))
}

/// Immediate local keyword → intent mapping
///
/// `None` means the command is ambiguous and needs the remote classifier.
#[must_use]
pub fn fast_path_intent(text_lower: &str) -> Option<FastPath> {
    let cmd = text_lower.trim();

    if ["hora", "tiempo"].iter().any(|t| cmd.contains(t)) {
        return Some(FastPath::Intent(IntentResolution {
            intent: "get_time".to_string(),
            params: json!({}),
        }));
    }

    if ["stats", "cpu", "ram"].iter().any(|t| cmd.contains(t)) {
        return Some(FastPath::Intent(IntentResolution {
            intent: "system_control".to_string(),
            params: json!({"action": "stats"}),
        }));
    }

    // Chat-panel phrases come before the app prefixes: "abre el chat"
    // opens the panel, not an application called "el chat"
    if CHAT_OPEN_TRIGGERS.iter().any(|t| cmd.contains(t)) {
        return Some(FastPath::Intent(IntentResolution {
            intent: "show_chat".to_string(),
            params: json!({"action": "show"}),
        }));
    }

    if CHAT_CLOSE_TRIGGERS.iter().any(|t| cmd.contains(t)) {
        return Some(FastPath::Intent(IntentResolution {
            intent: "hide_chat".to_string(),
            params: json!({"action": "hide"}),
        }));
    }

    for trigger in OPEN_TRIGGERS {
        if let Some(app) = cmd.strip_prefix(trigger) {
            let app = app.trim();
            if !app.is_empty() {
                return Some(FastPath::Intent(IntentResolution {
                    intent: "open_app".to_string(),
                    params: json!({"app": app}),
                }));
            }
        }
    }

    for trigger in CLOSE_TRIGGERS {
        if let Some(app) = cmd.strip_prefix(trigger) {
            let app = app.trim();
            if !app.is_empty() {
                return Some(FastPath::Intent(IntentResolution {
                    intent: "close_app".to_string(),
                    params: json!({"app": app}),
                }));
            }
        }
    }

    for trigger in VOICE_TRIGGERS {
        if let Some(pos) = cmd.find(trigger) {
            let request = cmd[pos + trigger.len()..].trim();
            let request = if request.is_empty() { cmd } else { request };
            return Some(FastPath::Intent(IntentResolution {
                intent: "change_voice".to_string(),
                params: json!({"voice_request": request}),
            }));
        }
    }

    if ENROLLMENT_TRIGGERS.iter().any(|t| cmd.contains(t)) {
        return Some(FastPath::StartEnrollment);
    }

    None
}

/// Remote intent-classification collaborator
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    /// Classify an utterance into an intent with parameters
    ///
    /// Implementations degrade to `general_chat` on recoverable failures.
    async fn classify(&self, text: &str) -> Result<IntentResolution>;
}

/// Classifier system instructions: strict-JSON intent catalogue
const CLASSIFIER_INSTRUCTIONS: &str = r#"Eres el motor de clasificación de intención de un asistente de voz.
Analiza el mensaje y devuelve EXCLUSIVAMENTE un JSON válido con esta estructura:
{"intent": "nombre_intencion", "parameters": {"param1": "valor1"}}

Intenciones y sus parámetros:
1. open_app: {"app": "nombre"}
2. close_app: {"app": "nombre"}
3. remember: {"info": "información a guardar"}
4. recall: {"query": "búsqueda en memoria"}
5. system_control: {"action": "shutdown/restart/cancel_shutdown/stats"}
6. change_voice: {"voice_request": "descripción de la voz deseada"}
7. show_chat: {"action": "show"}
8. hide_chat: {"action": "hide"}
9. get_time: {}
10. general_chat: {"message": "texto del usuario"}

Reglas:
- No incluyas texto extra ni markdown.
- Si no estás seguro, usa 'general_chat'."#;

#[derive(serde::Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(serde::Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(serde::Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

/// OpenAI-compatible remote classifier with a rate-limit circuit breaker
pub struct HttpIntentClassifier {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    breaker: Arc<CircuitBreaker>,
}

impl HttpIntentClassifier {
    /// Create a classifier for the given endpoint and model
    #[must_use]
    pub fn new(
        base_url: String,
        api_key: String,
        model: String,
        breaker: Arc<CircuitBreaker>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
            model,
            breaker,
        }
    }

    async fn request(&self, text: &str) -> Result<String> {
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": CLASSIFIER_INSTRUCTIONS},
                {"role": "user", "content": text},
            ],
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if is_rate_limit(Some(status), &body) {
                self.breaker.trip();
            }
            return Err(crate::Error::Classifier(format!(
                "classifier error {status}: {body}"
            )));
        }

        let parsed: CompletionResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| crate::Error::Classifier("empty classifier response".to_string()))
    }
}

#[async_trait]
impl IntentClassifier for HttpIntentClassifier {
    async fn classify(&self, text: &str) -> Result<IntentResolution> {
        if self.breaker.is_open() {
            tracing::debug!("classifier in cooldown, falling back to general chat");
            return Ok(IntentResolution::general_chat(text));
        }

        match self.request(text).await {
            Ok(raw) => Ok(parse_classifier_json(&raw)
                .unwrap_or_else(|| IntentResolution::general_chat(text))),
            Err(e) => {
                tracing::warn!(error = %e, "intent classification failed");
                Ok(IntentResolution::general_chat(text))
            }
        }
    }
}

/// Parse the classifier's JSON, tolerating markdown fences
fn parse_classifier_json(raw: &str) -> Option<IntentResolution> {
    let mut cleaned = raw.trim();
    if let Some(start) = cleaned.find("```json") {
        cleaned = &cleaned[start + 7..];
        if let Some(end) = cleaned.find("```") {
            cleaned = &cleaned[..end];
        }
    } else if cleaned.starts_with("```") {
        cleaned = cleaned.trim_matches('`');
    }

    serde_json::from_str(cleaned.trim()).ok()
}
