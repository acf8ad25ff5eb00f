use crate::assistant::ASSISTANT_AGENT_ID;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

pub const ENV_FILE_VAR: &str = "ASKWEB_ENV_FILE";

/// Settings for `askweb serve`. Every flag falls back to an `ASKWEB_*` variable.
#[derive(clap::Args, Debug, Clone)]
pub struct ServeConfig {
    /// Address for the HTTP listener.
    #[arg(long, env = "ASKWEB_BIND", default_value = "127.0.0.1:3000")]
    pub bind: SocketAddr,
    /// Agent id used when a request does not pass `?agent=`.
    #[arg(long, env = "ASKWEB_AGENT", default_value = ASSISTANT_AGENT_ID)]
    pub agent: String,
    /// Execution budget per chat request, in seconds.
    #[arg(long = "max-duration-s", env = "ASKWEB_MAX_DURATION_S", default_value_t = 300)]
    pub max_duration_s: u64,
    /// Model backend. Allowed: auto, openai_compat, ollama, scripted
    #[arg(long, env = "ASKWEB_MODEL_BACKEND", default_value = "auto")]
    pub model_backend: String,
    /// Model name override for the selected backend.
    #[arg(long, env = "ASKWEB_MODEL")]
    pub model: Option<String>,
}

impl ServeConfig {
    pub fn max_duration(&self) -> Duration {
        Duration::from_secs(self.max_duration_s.max(1))
    }
}

/// Load `KEY=VALUE` lines from the file named by `ASKWEB_ENV_FILE`, if any.
///
/// MCP hosts and service managers rarely run an interactive shell, so this gives them one
/// place to keep model credentials. Variables already present in the process win; values
/// are never logged. Returns how many variables were set.
///
/// Runs before logging is initialized, so the caller reports the outcome.
pub fn load_env_file() -> std::io::Result<usize> {
    match std::env::var(ENV_FILE_VAR)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
    {
        Some(path) => load_env_file_from(Path::new(&path)),
        None => Ok(0),
    }
}

pub fn load_env_file_from(path: &Path) -> std::io::Result<usize> {
    let txt = std::fs::read_to_string(path)?;
    let mut set = 0;
    for raw in txt.lines() {
        let s = raw.trim();
        if s.is_empty() || s.starts_with('#') {
            continue;
        }
        let s = s.strip_prefix("export ").unwrap_or(s);
        let Some((k, v)) = s.split_once('=') else {
            continue;
        };
        let k = k.trim();
        let v = unquote(v.trim());
        if k.is_empty() {
            continue;
        }
        if std::env::var_os(k).is_none() {
            std::env::set_var(k, v);
            set += 1;
        }
    }
    Ok(set)
}

fn unquote(v: &str) -> &str {
    for q in ['"', '\''] {
        if let Some(inner) = v.strip_prefix(q).and_then(|s| s.strip_suffix(q)) {
            return inner;
        }
    }
    v
}
