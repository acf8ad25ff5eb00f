// Run the assistant in-process against the offline scripted model and print each event.
//
//   cargo run -p askweb-server --example agent_stream -- "rust ownership"

use askweb_core::{AgentEvent, Message};
use askweb_local::ScriptedModel;
use askweb_server::assistant;
use futures::StreamExt;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let prompt = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "rust ownership".to_string());
    let registry = assistant::registry(Arc::new(ScriptedModel::new()));
    let agent = registry.agent(assistant::ASSISTANT_AGENT_ID)?;

    let mut events = agent.stream(vec![Message::user(prompt)]);
    while let Some(ev) = events.next().await {
        match ev? {
            AgentEvent::Text(t) => print!("{t}"),
            AgentEvent::ToolCall(c) => println!("[call {} {}({})]", c.id, c.name, c.arguments),
            AgentEvent::ToolResult { id, is_error, .. } => {
                println!("[result {id}{}]", if is_error { " error" } else { "" })
            }
            AgentEvent::Finish { reason, steps } => {
                println!("\n[finish {} after {steps} steps]", reason.as_str())
            }
        }
    }
    Ok(())
}
