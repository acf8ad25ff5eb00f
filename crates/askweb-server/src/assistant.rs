use askweb_core::ChatModel;
use askweb_local::{Agent, Registry, WebSearchTool};
use std::sync::Arc;

/// Registry key the chat endpoint resolves by default.
pub const ASSISTANT_AGENT_ID: &str = "assistantAgent";

pub const ASSISTANT_INSTRUCTIONS: &str = "You are a kind and knowledgeable AI assistant. \
Answer the user's questions clearly and politely. \
When you need up-to-date information, use the web search tool.";

/// The general-purpose assistant: fixed instructions and the mock `webSearch` tool.
pub fn assistant_agent(model: Arc<dyn ChatModel>) -> Agent {
    Agent::builder("assistant", model)
        .instructions(ASSISTANT_INSTRUCTIONS)
        .tool(Arc::new(WebSearchTool::mock()))
        .build()
}

/// Every agent this binary serves, keyed by id.
pub fn registry(model: Arc<dyn ChatModel>) -> Registry {
    Registry::new().with_agent(ASSISTANT_AGENT_ID, assistant_agent(model))
}

#[cfg(test)]
mod tests {
    use super::*;
    use askweb_local::ScriptedModel;

    #[test]
    fn registry_serves_the_assistant() {
        let reg = registry(Arc::new(ScriptedModel::new()));
        assert_eq!(reg.ids().collect::<Vec<_>>(), vec![ASSISTANT_AGENT_ID]);
        let agent = reg.agent(ASSISTANT_AGENT_ID).unwrap();
        assert_eq!(agent.name(), "assistant");
        assert!(agent.instructions().contains("web search"));
        assert_eq!(agent.tools().len(), 1);
        assert_eq!(agent.tools()[0].id, "webSearch");
    }

    #[test]
    fn other_ids_are_not_found() {
        let reg = registry(Arc::new(ScriptedModel::new()));
        let err = reg.agent("researchAgent").err().expect("unknown agent");
        assert_eq!(err.code(), "agent_not_found");
    }
}
