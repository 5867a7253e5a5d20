//! Authorization policy, admin sessions, and pending-action confirmation

mod audit;

pub use audit::{AuditLog, AuditOutcome};

use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::config::Config;
use crate::speaker::SpeakerId;

/// Intents gated on the speaker being the enrolled owner
pub const CRITICAL_INTENTS: &[&str] = &[
    "open_app",
    "close_app",
    "shutdown",
    "restart",
    "delete_file",
    "move_file",
    "system_control",
];

/// Window in which a pending action must be confirmed
const CONFIRMATION_WINDOW_SECS: i64 = 60;

/// Words accepted as verbal confirmation
const AFFIRMATIVE_WORDS: &[&str] = &["sí", "si", "confirmar", "procede", "adelante"];

/// A critical action awaiting verbal confirmation
#[derive(Debug, Clone)]
pub struct PendingAction {
    /// Intent to execute on confirmation
    pub intent: String,
    /// Intent parameters
    pub params: Value,
    created_at: DateTime<Utc>,
}

/// Controls access to critical intents and the admin session lifecycle
pub struct SecurityManager {
    admin_password: Option<String>,
    session_timeout: Duration,
    last_admin_activity: Mutex<Option<DateTime<Utc>>>,
    pending: Mutex<Option<PendingAction>>,
    audit: AuditLog,
}

impl SecurityManager {
    /// Create a manager from configuration
    ///
    /// With no admin password configured, authentication is permanently
    /// disabled — there is no hardcoded fallback.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        if config.security.admin_password.is_none() {
            tracing::warn!("no admin password configured, admin authentication disabled");
        }

        Self {
            admin_password: config.security.admin_password.clone(),
            session_timeout: config.security.session_timeout,
            last_admin_activity: Mutex::new(None),
            pending: Mutex::new(None),
            audit: AuditLog::new(config.audit_log_path()),
        }
    }

    /// Build directly from parts (used by tests and embedding callers)
    #[must_use]
    pub fn with_parts(
        admin_password: Option<String>,
        session_timeout: Duration,
        audit: AuditLog,
    ) -> Self {
        Self {
            admin_password,
            session_timeout,
            last_admin_activity: Mutex::new(None),
            pending: Mutex::new(None),
            audit,
        }
    }

    /// Whether the speaker may execute the intent
    ///
    /// Critical intents require the Owner; everything else is allowed for
    /// anyone. Every decision is audit-logged.
    #[must_use]
    pub fn is_authorized(&self, intent: &str, speaker: SpeakerId) -> bool {
        if !CRITICAL_INTENTS.contains(&intent) {
            self.audit
                .record(intent, &speaker.to_string(), AuditOutcome::Granted);
            return true;
        }

        if speaker == SpeakerId::Owner {
            self.audit
                .record(intent, &speaker.to_string(), AuditOutcome::Granted);
            return true;
        }

        tracing::warn!(intent, speaker = %speaker, "authorization denied");
        self.audit
            .record(intent, &speaker.to_string(), AuditOutcome::Denied);
        false
    }

    /// Whether an intent is in the critical set
    #[must_use]
    pub fn needs_verification(&self, intent: &str) -> bool {
        CRITICAL_INTENTS.contains(&intent)
    }

    /// Verify the admin password and start a session
    #[must_use]
    pub fn authenticate(&self, password: &str) -> bool {
        match &self.admin_password {
            Some(expected) if password == expected => {
                *self.last_admin_activity.lock().unwrap() = Some(Utc::now());
                self.audit
                    .record("admin", "ADMIN", AuditOutcome::SessionStarted);
                true
            }
            _ => {
                self.audit.record("admin", "ADMIN", AuditOutcome::AuthFailed);
                false
            }
        }
    }

    /// Whether the admin session is active; refreshes the sliding window
    #[must_use]
    pub fn is_session_valid(&self) -> bool {
        let mut last = self.last_admin_activity.lock().unwrap();
        let Some(started) = *last else {
            return false;
        };

        let elapsed = Utc::now() - started;
        if elapsed.to_std().unwrap_or(Duration::MAX) > self.session_timeout {
            *last = None;
            self.audit
                .record("admin", "ADMIN", AuditOutcome::SessionEnded);
            return false;
        }

        *last = Some(Utc::now());
        true
    }

    /// End the admin session
    pub fn logout(&self) {
        let mut last = self.last_admin_activity.lock().unwrap();
        if last.take().is_some() {
            self.audit
                .record("admin", "ADMIN", AuditOutcome::SessionEnded);
        }
    }

    /// Park a critical action awaiting confirmation
    ///
    /// A second call before resolution overwrites the first: at most one
    /// pending action exists system-wide.
    pub fn set_pending_action(&self, intent: &str, params: Value) {
        let mut pending = self.pending.lock().unwrap();
        if pending.is_some() {
            tracing::debug!(intent, "overwriting unresolved pending action");
        }
        *pending = Some(PendingAction {
            intent: intent.to_string(),
            params,
            created_at: Utc::now(),
        });
        self.audit.record(intent, "OWNER", AuditOutcome::Pending);
    }

    /// Whether an action is awaiting confirmation
    ///
    /// An action past its confirmation window is discarded here, so an
    /// expired pending action is indistinguishable from none at all.
    #[must_use]
    pub fn has_pending_action(&self) -> bool {
        let mut pending = self.pending.lock().unwrap();
        if let Some(action) = pending.as_ref() {
            let age = Utc::now() - action.created_at;
            if age.num_seconds() > CONFIRMATION_WINDOW_SECS {
                self.audit
                    .record(&action.intent, "OWNER", AuditOutcome::Expired);
                *pending = None;
            }
        }
        pending.is_some()
    }

    /// Interpret an utterance as confirmation of the pending action
    ///
    /// Returns the parked intent and parameters when confirmed. Returns
    /// `None` — discarding the action — when nothing is pending, the window
    /// expired, or the utterance is anything but an affirmative.
    #[must_use]
    pub fn confirm_action(&self, utterance: &str) -> Option<(String, Value)> {
        let mut pending = self.pending.lock().unwrap();
        let action = pending.take()?;

        let age = Utc::now() - action.created_at;
        if age.num_seconds() > CONFIRMATION_WINDOW_SECS {
            self.audit
                .record(&action.intent, "OWNER", AuditOutcome::Expired);
            return None;
        }

        let clean = utterance.to_lowercase();
        let clean = clean.trim();
        if AFFIRMATIVE_WORDS.iter().any(|word| clean.contains(word)) {
            self.audit
                .record(&action.intent, "OWNER", AuditOutcome::Confirmed);
            return Some((action.intent, action.params));
        }

        self.audit
            .record(&action.intent, "OWNER", AuditOutcome::Cancelled);
        None
    }

    #[cfg(test)]
    fn backdate_pending(&self, secs: i64) {
        if let Some(action) = self.pending.lock().unwrap().as_mut() {
            action.created_at -= chrono::Duration::seconds(secs);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn manager_with(password: Option<&str>) -> (tempfile::TempDir, SecurityManager) {
        let dir = tempfile::tempdir().unwrap();
        let audit = AuditLog::new(dir.path().join("audit.log"));
        let manager = SecurityManager::with_parts(
            password.map(String::from),
            Duration::from_secs(300),
            audit,
        );
        (dir, manager)
    }

    #[test]
    fn test_noncritical_intent_always_authorized() {
        let (_dir, sec) = manager_with(None);
        assert!(sec.is_authorized("get_time", SpeakerId::Guest));
        assert!(sec.is_authorized("general_chat", SpeakerId::Guest));
    }

    #[test]
    fn test_critical_intent_requires_owner() {
        let (dir, sec) = manager_with(None);
        assert!(sec.is_authorized("system_control", SpeakerId::Owner));
        assert!(!sec.is_authorized("system_control", SpeakerId::Guest));
        assert!(!sec.is_authorized("open_app", SpeakerId::Guest));

        let log = std::fs::read_to_string(dir.path().join("audit.log")).unwrap();
        assert_eq!(log.matches("outcome=DENIED").count(), 2);
        assert_eq!(log.matches("outcome=GRANTED").count(), 1);
    }

    #[test]
    fn test_authenticate_without_password_configured() {
        let (_dir, sec) = manager_with(None);
        // No configured secret: nothing authenticates, ever
        assert!(!sec.authenticate(""));
        assert!(!sec.authenticate("nimbus123"));
        assert!(!sec.is_session_valid());
    }

    #[test]
    fn test_session_lifecycle() {
        let (_dir, sec) = manager_with(Some("secreto"));
        assert!(!sec.authenticate("wrong"));
        assert!(!sec.is_session_valid());

        assert!(sec.authenticate("secreto"));
        assert!(sec.is_session_valid());

        sec.logout();
        assert!(!sec.is_session_valid());
    }

    #[test]
    fn test_session_expires() {
        let dir = tempfile::tempdir().unwrap();
        let audit = AuditLog::new(dir.path().join("audit.log"));
        let sec = SecurityManager::with_parts(
            Some("secreto".to_string()),
            Duration::from_secs(0),
            audit,
        );

        assert!(sec.authenticate("secreto"));
        std::thread::sleep(Duration::from_millis(10));
        assert!(!sec.is_session_valid());
    }

    #[test]
    fn test_confirm_without_pending_is_noop() {
        let (_dir, sec) = manager_with(None);
        assert!(sec.confirm_action("sí").is_none());
    }

    #[test]
    fn test_confirm_affirmative_returns_action() {
        let (_dir, sec) = manager_with(None);
        sec.set_pending_action("shutdown", json!({"action": "shutdown"}));

        let (intent, params) = sec.confirm_action("sí, procede").unwrap();
        assert_eq!(intent, "shutdown");
        assert_eq!(params["action"], "shutdown");

        // Consumed on confirmation
        assert!(!sec.has_pending_action());
    }

    #[test]
    fn test_confirm_anything_else_cancels() {
        let (_dir, sec) = manager_with(None);
        sec.set_pending_action("shutdown", json!({}));

        assert!(sec.confirm_action("no, espera").is_none());
        assert!(!sec.has_pending_action());
    }

    #[test]
    fn test_expired_action_is_discarded() {
        let (_dir, sec) = manager_with(None);
        sec.set_pending_action("shutdown", json!({}));
        sec.backdate_pending(61);

        // Identical to having no pending action at all
        assert!(sec.confirm_action("sí").is_none());
        assert!(!sec.has_pending_action());
    }

    #[test]
    fn test_expired_action_no_longer_pending() {
        let (_dir, sec) = manager_with(None);
        sec.set_pending_action("shutdown", json!({}));
        assert!(sec.has_pending_action());

        sec.backdate_pending(61);
        assert!(!sec.has_pending_action());
    }

    #[test]
    fn test_second_pending_action_overwrites_first() {
        let (_dir, sec) = manager_with(None);
        sec.set_pending_action("shutdown", json!({"action": "shutdown"}));
        sec.set_pending_action("restart", json!({"action": "restart"}));

        let (intent, _) = sec.confirm_action("confirmar").unwrap();
        assert_eq!(intent, "restart");
    }
}
