use askweb_core::{ChatModel, Error, Result};
use std::sync::Arc;

pub mod agent;
pub mod mock;
pub mod ollama;
pub mod openai_compat;
pub mod scripted;
pub mod sse;
pub mod web_search;

pub use agent::{budget_exceeded, Agent, AgentBuilder, AgentStream, Registry};
pub use mock::MockSearchProvider;
pub use scripted::ScriptedModel;
pub use web_search::WebSearchTool;

/// Non-empty, trimmed environment value.
pub(crate) fn env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub const MODEL_BACKENDS: [&str; 4] = ["auto", "openai_compat", "ollama", "scripted"];

/// Build the chat model named by `backend`.
///
/// `auto` picks `openai_compat` when its base URL is configured, then `ollama` when
/// `ASKWEB_OLLAMA_BASE_URL` is set, and otherwise fails with `NotConfigured` rather
/// than silently calling localhost.
pub fn model_from_env(
    backend: &str,
    model_override: Option<String>,
    client: reqwest::Client,
) -> Result<Arc<dyn ChatModel>> {
    match backend.trim().to_ascii_lowercase().as_str() {
        "openai_compat" => Ok(Arc::new(openai_compat::OpenAiCompatClient::from_env(
            client,
            model_override,
        )?)),
        "ollama" => Ok(Arc::new(ollama::OllamaClient::from_env(
            client,
            model_override,
        )?)),
        "scripted" => Ok(Arc::new(ScriptedModel::new())),
        "auto" => {
            if openai_compat::is_configured() {
                model_from_env("openai_compat", model_override, client)
            } else if ollama::is_configured() {
                model_from_env("ollama", model_override, client)
            } else {
                Err(Error::NotConfigured(
                    "no model backend configured (set ASKWEB_OPENAI_COMPAT_BASE_URL or ASKWEB_OLLAMA_BASE_URL, or pass --model-backend scripted)"
                        .to_string(),
                ))
            }
        }
        other => Err(Error::InvalidArgument(format!(
            "unknown model backend: {other} (expected one of: {})",
            MODEL_BACKENDS.join(", ")
        ))),
    }
}

/// Which model backends have their required environment present. Never reports values.
pub fn configured_backends() -> Vec<(&'static str, bool)> {
    vec![
        ("openai_compat", openai_compat::is_configured()),
        ("ollama", ollama::is_configured()),
        ("scripted", true),
    ]
}
