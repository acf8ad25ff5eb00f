use assert_cmd::Command;
use predicates::prelude::*;

fn askweb() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("askweb"));
    cmd.env_remove("ASKWEB_ENV_FILE");
    cmd
}

#[test]
fn version_json_and_text() {
    let out = askweb().args(["version"]).assert().success();
    let v: serde_json::Value =
        serde_json::from_slice(&out.get_output().stdout).expect("version json");
    assert_eq!(v["name"].as_str(), Some("askweb"));
    assert!(v["version"].is_string());
    assert!(v["features"]["stdio"].is_boolean());

    askweb()
        .args(["version", "--output", "text"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("askweb "));
}

#[test]
fn search_prints_bounded_results() {
    let out = askweb()
        .args(["search", "rust ownership", "--limit", "2"])
        .assert()
        .success();
    let v: serde_json::Value = serde_json::from_slice(&out.get_output().stdout).expect("json");
    let arr = v.as_array().expect("array");
    assert_eq!(arr.len(), 2);
    assert_eq!(arr[1]["url"].as_str(), Some("https://example.com/2"));

    let out = askweb()
        .args(["search", "x", "--limit", "99"])
        .assert()
        .success();
    let v: serde_json::Value = serde_json::from_slice(&out.get_output().stdout).expect("json");
    assert_eq!(v.as_array().map(Vec::len), Some(3));
}

#[test]
fn search_rejects_invalid_input() {
    askweb()
        .args(["search", "   "])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid argument"));

    askweb()
        .args(["search", "x", "--limit", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("limit"));
}

#[test]
fn doctor_reports_booleans_without_secrets() {
    let out = askweb()
        .args(["doctor", "--check-stdio", "false", "--model-backend", "scripted"])
        .env("ASKWEB_OPENAI_COMPAT_BASE_URL", "http://127.0.0.1:9")
        .env("ASKWEB_OPENAI_COMPAT_API_KEY", "sk-secret-value")
        .assert()
        .success();
    let stdout = String::from_utf8_lossy(&out.get_output().stdout).to_string();
    assert!(!stdout.contains("sk-secret-value"));
    let v: serde_json::Value = serde_json::from_str(&stdout).expect("doctor json");
    assert_eq!(v["kind"].as_str(), Some("doctor"));
    assert_eq!(v["ok"].as_bool(), Some(true));
    assert_eq!(
        v["configured"]["model_backends"]["openai_compat"].as_bool(),
        Some(true)
    );
    assert!(v["configured"]["model_backends"]["ollama"].is_boolean());
    assert_eq!(v["configured"]["agents"][0].as_str(), Some("assistantAgent"));
}

#[test]
fn serve_fails_fast_without_a_model_backend() {
    askweb()
        .args(["serve", "--model-backend", "auto", "--bind", "127.0.0.1:0"])
        .env_remove("ASKWEB_OPENAI_COMPAT_BASE_URL")
        .env_remove("ASKWEB_OLLAMA_BASE_URL")
        .assert()
        .failure()
        .stderr(predicate::str::contains("not configured"));
}

#[test]
fn serve_rejects_unknown_default_agent() {
    askweb()
        .args([
            "serve",
            "--model-backend",
            "scripted",
            "--agent",
            "researchAgent",
            "--bind",
            "127.0.0.1:0",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("agent not found"));
}
