//! Append-only security audit log
//!
//! One line per decision: timestamp, intent, speaker, outcome. Write
//! failures are logged and swallowed — auditing must never take down the
//! command path.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Outcome tag recorded with each audit entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditOutcome {
    /// Authorization granted
    Granted,
    /// Authorization denied
    Denied,
    /// Critical action parked, awaiting confirmation
    Pending,
    /// Pending action confirmed for execution
    Confirmed,
    /// Pending action cancelled by the user
    Cancelled,
    /// Pending action expired unconfirmed
    Expired,
    /// Admin session started
    SessionStarted,
    /// Admin session ended
    SessionEnded,
    /// Admin authentication failed
    AuthFailed,
}

impl std::fmt::Display for AuditOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self {
            Self::Granted => "GRANTED",
            Self::Denied => "DENIED",
            Self::Pending => "PENDING",
            Self::Confirmed => "CONFIRMED",
            Self::Cancelled => "CANCELLED",
            Self::Expired => "EXPIRED",
            Self::SessionStarted => "SESSION_STARTED",
            Self::SessionEnded => "SESSION_ENDED",
            Self::AuthFailed => "AUTH_FAILED",
        };
        write!(f, "{tag}")
    }
}

/// Append-only audit log file
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    /// Create a log writing to the given path
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the log file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one audit entry
    pub fn record(&self, intent: &str, speaker: &str, outcome: AuditOutcome) {
        let line = format!(
            "{} [AUDIT] intent={intent} speaker={speaker} outcome={outcome}\n",
            chrono::Utc::now().to_rfc3339()
        );

        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| file.write_all(line.as_bytes()));

        if let Err(e) = result {
            tracing::error!(error = %e, path = %self.path.display(), "audit write failed");
        }

        tracing::info!(intent, speaker, outcome = %outcome, "audit");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entries_appended() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::new(dir.path().join("audit.log"));

        log.record("open_app", "GUEST", AuditOutcome::Denied);
        log.record("get_time", "OWNER", AuditOutcome::Granted);

        let content = std::fs::read_to_string(log.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("intent=open_app"));
        assert!(lines[0].contains("speaker=GUEST"));
        assert!(lines[0].contains("outcome=DENIED"));
        assert!(lines[1].contains("outcome=GRANTED"));
    }
}
