//! Plugin dispatch table
//!
//! Handlers are registered explicitly at startup, keyed by intent name.
//! Swapping a handler at runtime is an explicit [`PluginRegistry::replace`]
//! call, not a re-import. Plugin results are a closed sum type so router
//! branching is exhaustive instead of sentinel-string matching.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::context::ForegroundContext;
use crate::db::MemoryRepo;
use crate::Result;

/// UI-directed plugin result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiCommand {
    /// Open the chat panel
    ShowChat,
    /// Close the chat panel
    HideChat,
}

/// Result of a plugin execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginOutcome {
    /// Text for the speech output
    Spoken(String),
    /// Action for the avatar UI
    Ui(UiCommand),
    /// The plugin itself refused the action
    Denied(String),
}

/// A named intent handler
#[async_trait]
pub trait CommandPlugin: Send + Sync {
    /// Intent this plugin handles
    fn intent(&self) -> &'static str;

    /// Execute the intent with its parameters, the current foreground
    /// context, and the memory store
    async fn execute(
        &self,
        params: &Value,
        context: &ForegroundContext,
        memory: &MemoryRepo,
    ) -> Result<PluginOutcome>;
}

/// Dispatch table from intent name to handler
#[derive(Default)]
pub struct PluginRegistry {
    handlers: HashMap<&'static str, Arc<dyn CommandPlugin>>,
}

impl PluginRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin under its intent name
    pub fn register(&mut self, plugin: Arc<dyn CommandPlugin>) {
        let intent = plugin.intent();
        if self.handlers.insert(intent, plugin).is_some() {
            tracing::warn!(intent, "plugin registered twice, keeping the newest");
        } else {
            tracing::debug!(intent, "plugin registered");
        }
    }

    /// Replace the handler for an intent (explicit hot-swap)
    ///
    /// Returns the previous handler, if any.
    pub fn replace(
        &mut self,
        plugin: Arc<dyn CommandPlugin>,
    ) -> Option<Arc<dyn CommandPlugin>> {
        let intent = plugin.intent();
        tracing::info!(intent, "plugin handler replaced");
        self.handlers.insert(intent, plugin)
    }

    /// Whether a handler exists for the intent
    #[must_use]
    pub fn has_handler(&self, intent: &str) -> bool {
        self.handlers.contains_key(intent)
    }

    /// Registered intent names
    #[must_use]
    pub fn intents(&self) -> Vec<&'static str> {
        self.handlers.keys().copied().collect()
    }

    /// Execute the plugin for an intent
    ///
    /// `None` means no plugin is registered for the intent; the router falls
    /// back to its default response.
    pub async fn execute(
        &self,
        intent: &str,
        params: &Value,
        context: &ForegroundContext,
        memory: &MemoryRepo,
    ) -> Option<Result<PluginOutcome>> {
        let plugin = self.handlers.get(intent)?;
        Some(plugin.execute(params, context, memory).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoPlugin {
        reply: &'static str,
    }

    #[async_trait]
    impl CommandPlugin for EchoPlugin {
        fn intent(&self) -> &'static str {
            "echo"
        }

        async fn execute(
            &self,
            _params: &Value,
            _context: &ForegroundContext,
            _memory: &MemoryRepo,
        ) -> Result<PluginOutcome> {
            Ok(PluginOutcome::Spoken(self.reply.to_string()))
        }
    }

    #[tokio::test]
    async fn test_unknown_intent_is_none() {
        let registry = PluginRegistry::new();
        let memory = MemoryRepo::new(crate::db::init_memory().unwrap());
        let result = registry
            .execute(
                "missing",
                &Value::Null,
                &ForegroundContext::default(),
                &memory,
            )
            .await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_replace_swaps_handler() {
        let mut registry = PluginRegistry::new();
        registry.register(Arc::new(EchoPlugin { reply: "uno" }));

        let previous = registry.replace(Arc::new(EchoPlugin { reply: "dos" }));
        assert!(previous.is_some());

        let memory = MemoryRepo::new(crate::db::init_memory().unwrap());
        let outcome = registry
            .execute("echo", &Value::Null, &ForegroundContext::default(), &memory)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome, PluginOutcome::Spoken("dos".to_string()));
    }
}
