//! Capture worker supervision
//!
//! Spawns `nimbus capture-worker` as a child process, bridges its stdout
//! into an event channel, and forwards control signals over its stdin. The
//! event channel closing means the worker died; the daemon surfaces that as
//! a hard stop instead of silently swallowing it.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{mpsc, Mutex};

use crate::events::{CaptureEvent, ControlSignal};
use crate::{Error, Result};

/// Capacity of the bridged event channel
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Control-signal sink the router uses to talk back to the capture side
///
/// Signal delivery is best-effort: a dead worker is detected separately
/// through the event channel closing, so failures here are logged, not
/// propagated.
#[async_trait]
pub trait CaptureControl: Send + Sync {
    /// Update the assistant-speaking flag for echo gating
    async fn set_speaking(&self, active: bool);

    /// Enter or leave registration mode
    async fn set_registration(&self, active: bool);

    /// Ask the worker to re-read the owner profile from disk
    async fn reload_profile(&self);

    /// Adjust the speaker-verification threshold
    async fn set_threshold(&self, threshold: f32);
}

/// Handle to the spawned capture worker process
pub struct CaptureProcess {
    child: Mutex<Child>,
    stdin: Mutex<ChildStdin>,
}

impl CaptureProcess {
    /// Spawn the capture worker and return the handle plus its event stream
    ///
    /// # Errors
    ///
    /// Returns error if the child process cannot be spawned
    pub fn spawn() -> Result<(Self, mpsc::Receiver<CaptureEvent>)> {
        let exe = std::env::current_exe()?;

        let mut child = Command::new(exe)
            .arg("capture-worker")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Capture(format!("failed to spawn capture worker: {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Capture("capture worker stdout unavailable".to_string()))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Capture("capture worker stdin unavailable".to_string()))?;

        tracing::info!(pid = ?child.id(), "capture worker spawned");

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => match serde_json::from_str::<CaptureEvent>(&line) {
                        Ok(event) => {
                            if tx.send(event).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "malformed capture event");
                        }
                    },
                    Ok(None) => {
                        tracing::error!("capture worker event stream ended");
                        break;
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "capture worker read error");
                        break;
                    }
                }
            }
            // Dropping tx closes the channel; the daemon treats that as
            // worker death.
        });

        Ok((
            Self {
                child: Mutex::new(child),
                stdin: Mutex::new(stdin),
            },
            rx,
        ))
    }

    /// Write one control signal line to the worker
    async fn send(&self, signal: &ControlSignal) {
        let line = match serde_json::to_string(signal) {
            Ok(line) => line,
            Err(e) => {
                tracing::error!(error = %e, "failed to encode control signal");
                return;
            }
        };

        let mut stdin = self.stdin.lock().await;
        let write = async {
            stdin.write_all(line.as_bytes()).await?;
            stdin.write_all(b"\n").await?;
            stdin.flush().await
        };
        if let Err(e) = write.await {
            tracing::warn!(error = %e, ?signal, "control signal delivery failed");
        }
    }

    /// Terminate the worker process
    pub async fn shutdown(&self) {
        let mut child = self.child.lock().await;
        if let Err(e) = child.kill().await {
            tracing::debug!(error = %e, "capture worker already gone");
        }
    }
}

#[async_trait]
impl CaptureControl for CaptureProcess {
    async fn set_speaking(&self, active: bool) {
        self.send(&ControlSignal::Speaking { active }).await;
    }

    async fn set_registration(&self, active: bool) {
        self.send(&ControlSignal::Registration { active }).await;
    }

    async fn reload_profile(&self) {
        self.send(&ControlSignal::ReloadProfile).await;
    }

    async fn set_threshold(&self, threshold: f32) {
        self.send(&ControlSignal::SetThreshold { threshold }).await;
    }
}
