//! Built-in command plugins

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::plugins::{CommandPlugin, PluginOutcome, PluginRegistry, UiCommand};
use crate::context::ForegroundContext;
use crate::db::MemoryRepo;
use crate::{Error, Result};

/// Spanish month names for spoken dates
const MONTHS: [&str; 12] = [
    "enero",
    "febrero",
    "marzo",
    "abril",
    "mayo",
    "junio",
    "julio",
    "agosto",
    "septiembre",
    "octubre",
    "noviembre",
    "diciembre",
];

/// Build a registry with every built-in plugin registered
#[must_use]
pub fn builtin_registry() -> PluginRegistry {
    let mut registry = PluginRegistry::new();
    registry.register(Arc::new(GetTimePlugin));
    registry.register(Arc::new(OpenAppPlugin));
    registry.register(Arc::new(CloseAppPlugin));
    registry.register(Arc::new(SystemControlPlugin));
    registry.register(Arc::new(ShowChatPlugin));
    registry.register(Arc::new(HideChatPlugin));
    registry.register(Arc::new(RememberPlugin));
    registry.register(Arc::new(RecallPlugin));
    registry
}

/// Extract a string parameter
fn str_param<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params.get(key).and_then(Value::as_str).map(str::trim)
}

/// Speaks the current time and date
pub struct GetTimePlugin;

#[async_trait]
impl CommandPlugin for GetTimePlugin {
    fn intent(&self) -> &'static str {
        "get_time"
    }

    async fn execute(
        &self,
        _params: &Value,
        _context: &ForegroundContext,
        _memory: &MemoryRepo,
    ) -> Result<PluginOutcome> {
        use chrono::{Datelike, Local, Timelike};

        let now = Local::now();
        let month = MONTHS[now.month0() as usize];
        let text = format!(
            "Son las {}:{:02} de hoy {} de {}",
            now.hour(),
            now.minute(),
            now.day(),
            month
        );
        Ok(PluginOutcome::Spoken(text))
    }
}

/// Launches an application by name
pub struct OpenAppPlugin;

#[async_trait]
impl CommandPlugin for OpenAppPlugin {
    fn intent(&self) -> &'static str {
        "open_app"
    }

    async fn execute(
        &self,
        params: &Value,
        _context: &ForegroundContext,
        _memory: &MemoryRepo,
    ) -> Result<PluginOutcome> {
        let Some(app) = str_param(params, "app").filter(|a| !a.is_empty()) else {
            return Ok(PluginOutcome::Spoken(
                "No entendí qué aplicación quieres abrir.".to_string(),
            ));
        };

        tokio::process::Command::new(app)
            .spawn()
            .map_err(|e| Error::Plugin(format!("failed to launch {app}: {e}")))?;

        Ok(PluginOutcome::Spoken(format!("Abriendo {app}.")))
    }
}

/// Closes an application by name
pub struct CloseAppPlugin;

#[async_trait]
impl CommandPlugin for CloseAppPlugin {
    fn intent(&self) -> &'static str {
        "close_app"
    }

    async fn execute(
        &self,
        params: &Value,
        context: &ForegroundContext,
        _memory: &MemoryRepo,
    ) -> Result<PluginOutcome> {
        // "cierra eso" with no app name falls back to the focused app
        let target = str_param(params, "app")
            .filter(|a| !a.is_empty())
            .map(str::to_string)
            .or_else(|| context.focused_app.clone());

        let Some(app) = target else {
            return Ok(PluginOutcome::Spoken(
                "No entendí qué aplicación quieres cerrar.".to_string(),
            ));
        };

        let status = tokio::process::Command::new("pkill")
            .arg("-f")
            .arg(&app)
            .status()
            .await
            .map_err(|e| Error::Plugin(format!("pkill failed: {e}")))?;

        if status.success() {
            Ok(PluginOutcome::Spoken(format!("Cerrando {app}.")))
        } else {
            Ok(PluginOutcome::Spoken(format!(
                "No encontré ningún proceso llamado {app}."
            )))
        }
    }
}

/// Power actions and system stats
pub struct SystemControlPlugin;

#[async_trait]
impl CommandPlugin for SystemControlPlugin {
    fn intent(&self) -> &'static str {
        "system_control"
    }

    async fn execute(
        &self,
        params: &Value,
        _context: &ForegroundContext,
        _memory: &MemoryRepo,
    ) -> Result<PluginOutcome> {
        let action = str_param(params, "action").unwrap_or_default();

        let (command, args, reply): (&str, &[&str], &str) = match action {
            "shutdown" => (
                "shutdown",
                &["-h", "+1"],
                "Apagando el equipo en un minuto.",
            ),
            "restart" => ("shutdown", &["-r", "+1"], "Reiniciando el equipo."),
            "cancel_shutdown" => ("shutdown", &["-c"], "Apagado cancelado."),
            "stats" => {
                let summary = tokio::task::spawn_blocking(system_stats)
                    .await
                    .map_err(|e| Error::Plugin(e.to_string()))?;
                return Ok(PluginOutcome::Spoken(summary));
            }
            _ => {
                return Ok(PluginOutcome::Spoken(
                    "Acción de sistema no reconocida.".to_string(),
                ))
            }
        };

        tokio::process::Command::new(command)
            .args(args)
            .status()
            .await
            .map_err(|e| Error::Plugin(format!("{command} failed: {e}")))?;

        Ok(PluginOutcome::Spoken(reply.to_string()))
    }
}

/// Memory and CPU summary for the stats action
#[allow(clippy::cast_precision_loss)]
fn system_stats() -> String {
    let mut system = sysinfo::System::new();
    system.refresh_memory();
    system.refresh_cpu_usage();

    let used_gb = system.used_memory() as f64 / 1_073_741_824.0;
    let total_gb = system.total_memory() as f64 / 1_073_741_824.0;
    let cpu = system.global_cpu_usage();

    format!(
        "Uso de memoria: {used_gb:.1} de {total_gb:.1} gigabytes. Procesador al {cpu:.0} por ciento."
    )
}

/// Opens the chat panel
pub struct ShowChatPlugin;

#[async_trait]
impl CommandPlugin for ShowChatPlugin {
    fn intent(&self) -> &'static str {
        "show_chat"
    }

    async fn execute(
        &self,
        params: &Value,
        _context: &ForegroundContext,
        _memory: &MemoryRepo,
    ) -> Result<PluginOutcome> {
        let action = str_param(params, "action").unwrap_or("show");
        if action == "hide" {
            Ok(PluginOutcome::Ui(UiCommand::HideChat))
        } else {
            Ok(PluginOutcome::Ui(UiCommand::ShowChat))
        }
    }
}

/// Closes the chat panel
pub struct HideChatPlugin;

#[async_trait]
impl CommandPlugin for HideChatPlugin {
    fn intent(&self) -> &'static str {
        "hide_chat"
    }

    async fn execute(
        &self,
        _params: &Value,
        _context: &ForegroundContext,
        _memory: &MemoryRepo,
    ) -> Result<PluginOutcome> {
        Ok(PluginOutcome::Ui(UiCommand::HideChat))
    }
}

/// Stores a fact in long-term memory
pub struct RememberPlugin;

#[async_trait]
impl CommandPlugin for RememberPlugin {
    fn intent(&self) -> &'static str {
        "remember"
    }

    async fn execute(
        &self,
        params: &Value,
        _context: &ForegroundContext,
        memory: &MemoryRepo,
    ) -> Result<PluginOutcome> {
        let Some(info) = str_param(params, "info").filter(|i| !i.is_empty()) else {
            return Ok(PluginOutcome::Spoken(
                "No entendí qué debo recordar.".to_string(),
            ));
        };

        let memory = memory.clone();
        let info = info.to_string();
        tokio::task::spawn_blocking(move || memory.store_fact(&info))
            .await
            .map_err(|e| Error::Plugin(e.to_string()))??;
        Ok(PluginOutcome::Spoken("Entendido, lo recordaré.".to_string()))
    }
}

/// Searches long-term memory
pub struct RecallPlugin;

#[async_trait]
impl CommandPlugin for RecallPlugin {
    fn intent(&self) -> &'static str {
        "recall"
    }

    async fn execute(
        &self,
        params: &Value,
        _context: &ForegroundContext,
        memory: &MemoryRepo,
    ) -> Result<PluginOutcome> {
        let query = str_param(params, "query").unwrap_or_default().to_string();

        let memory = memory.clone();
        let found = tokio::task::spawn_blocking(move || memory.recall(&query))
            .await
            .map_err(|e| Error::Plugin(e.to_string()))??;

        match found {
            Some(fact) => Ok(PluginOutcome::Spoken(fact)),
            None => Ok(PluginOutcome::Spoken(
                "No recuerdo nada sobre eso.".to_string(),
            )),
        }
    }
}
