use anyhow::Result;
use askweb_core::SearchArgs;
use askweb_local::{web_search::search_bounded, MockSearchProvider};
use askweb_server::{assistant, config, http};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[cfg(feature = "stdio")]
mod mcp;

#[derive(Parser, Debug)]
#[command(name = "askweb")]
#[command(about = "Chat endpoint backed by an LLM agent, plus a web search tool over MCP stdio", long_about = None)]
struct Cli {
    /// Verbose logging (debug level) to stderr. `RUST_LOG` takes precedence.
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the chat endpoint (`POST /api/chat`, data stream responses).
    Serve(config::ServeConfig),
    /// Run as an MCP stdio server exposing `web_search`.
    #[cfg(feature = "stdio")]
    McpStdio,
    /// Run one search through the shared search contract and print the results (json).
    Search(SearchCmd),
    /// Diagnose configuration/launch issues (json; no secrets).
    Doctor(DoctorCmd),
    /// Print version info.
    Version(VersionCmd),
}

#[derive(clap::Args, Debug)]
struct SearchCmd {
    /// Search query.
    query: String,
    /// Number of results (default 5, max 10).
    #[arg(long)]
    limit: Option<i64>,
}

#[derive(clap::Args, Debug)]
struct DoctorCmd {
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
    /// Spawn `askweb mcp-stdio` and call `list_tools` to prove an MCP host can start it.
    #[arg(long, action = clap::ArgAction::Set, default_value_t = true)]
    check_stdio: bool,
    /// Timeout for the stdio handshake (ms).
    #[arg(long, default_value_t = 3000)]
    timeout_ms: u64,
    /// Model backend to check. Allowed: auto, openai_compat, ollama, scripted
    #[arg(long, env = "ASKWEB_MODEL_BACKEND", default_value = "auto")]
    model_backend: String,
}

#[derive(clap::Args, Debug)]
struct VersionCmd {
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        "askweb=debug,askweb_server=debug,askweb_local=debug,rmcp=info"
    } else {
        "askweb=info,askweb_server=info,askweb_local=info,rmcp=warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // stdout belongs to the MCP transport and to JSON command output.
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();
}

fn http_client() -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .user_agent(concat!("askweb/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

#[tokio::main]
async fn main() -> Result<()> {
    let loaded = config::load_env_file();
    let cli = Cli::parse();
    init_logging(cli.verbose);
    match loaded {
        Ok(0) => {}
        Ok(n) => tracing::debug!(vars = n, "loaded env file"),
        Err(e) => tracing::warn!(error = %e, "could not read {}", config::ENV_FILE_VAR),
    }

    match cli.command {
        Commands::Serve(cfg) => {
            let model = askweb_local::model_from_env(
                &cfg.model_backend,
                cfg.model.clone(),
                http_client()?,
            )?;
            tracing::info!(
                backend = model.name(),
                agent = %cfg.agent,
                max_duration_s = cfg.max_duration().as_secs(),
                "starting chat endpoint"
            );
            let registry = assistant::registry(model);
            // Fail at startup rather than 404 on every request.
            registry.agent(&cfg.agent)?;
            let state = http::AppState::new(registry, cfg.agent.clone(), cfg.max_duration());
            http::serve(state, cfg.bind).await?;
        }
        #[cfg(feature = "stdio")]
        Commands::McpStdio => {
            mcp::serve_stdio()
                .await
                .map_err(|e| anyhow::anyhow!(e.to_string()))?;
        }
        Commands::Search(args) => {
            let q = SearchArgs {
                query: Some(args.query),
                limit: args.limit,
            }
            .validate()?;
            let provider = MockSearchProvider::new();
            let results = search_bounded(&provider, &q).await?;
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
        Commands::Doctor(args) => doctor(args).await?,
        Commands::Version(args) => {
            let payload = serde_json::json!({
                "name": "askweb",
                "version": env!("CARGO_PKG_VERSION"),
                "features": {
                    "stdio": cfg!(feature = "stdio"),
                },
            });
            match args.output.to_ascii_lowercase().as_str() {
                "text" => println!("askweb {}", env!("CARGO_PKG_VERSION")),
                _ => println!("{}", serde_json::to_string_pretty(&payload)?),
            }
        }
    }

    Ok(())
}

async fn doctor(args: DoctorCmd) -> Result<()> {
    let t0 = std::time::Instant::now();
    let mut checks: Vec<serde_json::Value> = Vec::new();

    // Env presence only; never print values.
    let backends = askweb_local::configured_backends();
    let model = askweb_local::model_from_env(&args.model_backend, None, http_client()?);
    checks.push(serde_json::json!({
        "name": "model_backend",
        "ok": model.is_ok(),
        "message": match &model {
            Ok(m) => format!("model backend resolves to {}", m.name()),
            Err(e) => e.to_string(),
        },
        "hint": if model.is_ok() {
            ""
        } else {
            "Set ASKWEB_OPENAI_COMPAT_BASE_URL (+ ASKWEB_OPENAI_COMPAT_MODEL) or ASKWEB_OLLAMA_BASE_URL, or use --model-backend scripted for an offline demo."
        },
    }));

    let mut stdio_ok: Option<bool> = None;
    let mut stdio_tool_count: Option<usize> = None;
    let mut stdio_error: Option<serde_json::Value> = None;
    let mut stdio_elapsed_ms: Option<u128> = None;

    #[cfg(feature = "stdio")]
    if args.check_stdio {
        use rmcp::service::ServiceExt;
        use rmcp::transport::{ConfigureCommandExt, TokioChildProcess};
        use tokio::process::Command;

        let exe = std::env::current_exe().unwrap_or_else(|_| std::path::PathBuf::from("askweb"));
        let child = TokioChildProcess::new(Command::new(exe).configure(|cmd| {
            cmd.args(["mcp-stdio"]);
            cmd.env("RUST_LOG", "error");
        }))?;
        let check_t0 = std::time::Instant::now();
        let res = tokio::time::timeout(
            std::time::Duration::from_millis(args.timeout_ms),
            async move {
                let service = ().serve(child).await?;
                let tools = service.list_tools(Default::default()).await?;
                let _ = service.cancel().await;
                Ok::<_, anyhow::Error>(tools)
            },
        )
        .await;
        stdio_elapsed_ms = Some(check_t0.elapsed().as_millis());

        match res {
            Ok(Ok(tools)) => {
                stdio_ok = Some(tools.tools.iter().any(|t| t.name == "web_search"));
                stdio_tool_count = Some(tools.tools.len());
            }
            Ok(Err(e)) => {
                stdio_ok = Some(false);
                stdio_error = Some(serde_json::json!({
                    "code": "handshake_failed",
                    "message": e.to_string(),
                    "hint": "The child closed the stdio transport early. Common causes: stdout contamination, wrong args (not running mcp-stdio), or a crash on startup."
                }));
            }
            Err(_elapsed) => {
                stdio_ok = Some(false);
                stdio_error = Some(serde_json::json!({
                    "code": "timeout",
                    "message": format!("stdio handshake timed out after {}ms", args.timeout_ms),
                    "hint": "The child did not answer list_tools in time."
                }));
            }
        }
    }

    #[cfg(not(feature = "stdio"))]
    if args.check_stdio {
        stdio_ok = Some(false);
    }

    checks.push(serde_json::json!({
        "name": "mcp_stdio_handshake",
        "ok": if args.check_stdio { stdio_ok.unwrap_or(false) } else { true },
        "skipped": !args.check_stdio,
        "message": if !args.check_stdio {
            "stdio MCP handshake skipped"
        } else if stdio_ok.unwrap_or(false) {
            "stdio MCP handshake succeeded"
        } else {
            "stdio MCP handshake failed"
        },
        "hint": if !args.check_stdio || stdio_ok.unwrap_or(false) {
            ""
        } else if cfg!(feature = "stdio") {
            "Check that the MCP host points at this `askweb` binary with args [\"mcp-stdio\"]."
        } else {
            "`mcp-stdio` requires building with feature `stdio`."
        },
        "tool_count": stdio_tool_count,
        "elapsed_ms": stdio_elapsed_ms,
        "error": stdio_error,
    }));

    let agents: Vec<String> = assistant::registry(Arc::new(askweb_local::ScriptedModel::new()))
        .ids()
        .map(str::to_string)
        .collect();
    let ok = checks.iter().all(|c| c["ok"].as_bool().unwrap_or(false));
    let payload = serde_json::json!({
        "schema_version": 1,
        "kind": "doctor",
        "ok": ok,
        "name": "askweb",
        "version": env!("CARGO_PKG_VERSION"),
        "platform": {
            "os": std::env::consts::OS,
            "arch": std::env::consts::ARCH,
        },
        "features": {
            "stdio": cfg!(feature = "stdio"),
        },
        "elapsed_ms": t0.elapsed().as_millis(),
        "configured": {
            "model_backends": backends
                .iter()
                .map(|(name, on)| (name.to_string(), serde_json::json!(on)))
                .collect::<serde_json::Map<_, _>>(),
            "agents": agents,
        },
        "checks": checks,
    });
    match args.output.to_ascii_lowercase().as_str() {
        "text" => {
            println!("askweb {} (ok={})", env!("CARGO_PKG_VERSION"), ok);
            let flags = backends
                .iter()
                .map(|(name, on)| format!("{name}={on}"))
                .collect::<Vec<_>>()
                .join(" ");
            println!("model_backends: {flags}");
            for c in &checks {
                println!(
                    "- {}: {} ({})",
                    c["name"].as_str().unwrap_or(""),
                    if c["ok"].as_bool().unwrap_or(false) { "ok" } else { "FAIL" },
                    c["message"].as_str().unwrap_or("")
                );
            }
        }
        _ => println!("{}", serde_json::to_string_pretty(&payload)?),
    }
    Ok(())
}
