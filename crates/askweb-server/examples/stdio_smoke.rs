// Run (from the workspace root):
//   cargo build -p askweb-server && cargo run -p askweb-server --example stdio_smoke

#[cfg(not(feature = "stdio"))]
fn main() {
    eprintln!("stdio_smoke requires `--features stdio` (or default features enabled)");
}

#[cfg(feature = "stdio")]
use rmcp::{
    model::CallToolRequestParam,
    service::ServiceExt,
    transport::{ConfigureCommandExt, TokioChildProcess},
};
#[cfg(feature = "stdio")]
use tokio::process::Command;

#[cfg(feature = "stdio")]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Prefer an explicit binary path:
    //   ASKWEB_BIN=/abs/path/to/askweb cargo run -p askweb-server --example stdio_smoke
    let bin = match std::env::var("ASKWEB_BIN") {
        Ok(p) => std::path::PathBuf::from(p),
        Err(_) => {
            let root = std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR"));
            let workspace_root = root
                .parent()
                .and_then(|p| p.parent())
                .ok_or("failed to compute workspace root")?;
            std::env::var("CARGO_TARGET_DIR")
                .ok()
                .map(std::path::PathBuf::from)
                .unwrap_or_else(|| workspace_root.join("target"))
                .join("debug")
                .join("askweb")
        }
    };

    let service = ()
        .serve(TokioChildProcess::new(Command::new(&bin).configure(
            |cmd| {
                cmd.args(["mcp-stdio"]);
            },
        ))?)
        .await?;

    let tools = service.list_tools(Default::default()).await?;
    for t in &tools.tools {
        println!("tool: {} - {}", t.name, t.description.as_deref().unwrap_or(""));
    }

    let query = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "rust ownership".to_string());
    let result = service
        .call_tool(CallToolRequestParam {
            name: "web_search".into(),
            arguments: serde_json::json!({ "query": query, "limit": 2 })
                .as_object()
                .cloned(),
        })
        .await?;
    for c in &result.content {
        if let Some(t) = c.as_text() {
            println!("{}", t.text);
        }
    }

    service.cancel().await?;
    Ok(())
}
