//! Foreground-application context probe
//!
//! Plugins receive a snapshot of what the user is doing so they can act on
//! "close that" style commands. Probing is a blocking system call, so the
//! default implementation runs it on the blocking pool.

use async_trait::async_trait;

/// Number of processes included in the context summary
const TOP_PROCESSES: usize = 5;

/// Snapshot of the user's current foreground context
#[derive(Debug, Clone, Default)]
pub struct ForegroundContext {
    /// Name of the focused application, when the platform exposes it
    pub focused_app: Option<String>,

    /// Short human-readable summary of running applications
    pub summary: String,
}

/// Context collaborator contract
#[async_trait]
pub trait ContextProbe: Send + Sync {
    /// Capture the current foreground context
    async fn current(&self) -> ForegroundContext;
}

/// Probe built on a process snapshot
///
/// There is no portable focused-window API, so `focused_app` stays `None`
/// here; the summary lists the busiest user processes instead.
pub struct ProcessProbe;

#[async_trait]
impl ContextProbe for ProcessProbe {
    async fn current(&self) -> ForegroundContext {
        let result = tokio::task::spawn_blocking(|| {
            let mut system = sysinfo::System::new();
            system.refresh_processes(sysinfo::ProcessesToUpdate::All, true);

            let mut processes: Vec<(String, f32)> = system
                .processes()
                .values()
                .map(|p| (p.name().to_string_lossy().into_owned(), p.cpu_usage()))
                .collect();
            processes.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
            processes.truncate(TOP_PROCESSES);

            let names: Vec<String> = processes.into_iter().map(|(name, _)| name).collect();
            ForegroundContext {
                focused_app: None,
                summary: format!("procesos activos: {}", names.join(", ")),
            }
        })
        .await;

        result.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "context probe failed");
            ForegroundContext::default()
        })
    }
}

/// No-op probe for headless and test configurations
pub struct NullProbe;

#[async_trait]
impl ContextProbe for NullProbe {
    async fn current(&self) -> ForegroundContext {
        ForegroundContext::default()
    }
}
