//! Error envelope for failed tool calls. Codes come from `askweb_core::Error::code`, the
//! same set the chat endpoint reports.

use askweb_core::Error as AskwebError;
use serde::Serialize;

pub(crate) fn retryable(e: &AskwebError) -> bool {
    // Invalid input and missing configuration need a change before a retry helps.
    matches!(e, AskwebError::Upstream(_) | AskwebError::Timeout(_))
}

pub(crate) fn hint(e: &AskwebError) -> &'static str {
    match e {
        AskwebError::InvalidArgument(_) => {
            "Pass a non-empty `query` string and, optionally, an integer `limit` between 1 and 10."
        }
        AskwebError::NotConfigured(_) => "The search backend is not configured for this server.",
        AskwebError::Upstream(_) => "The search backend failed; retrying later may help.",
        AskwebError::Timeout(_) => "The search did not finish in time; retrying later may help.",
        AskwebError::AgentNotFound(_) | AskwebError::UnknownTool(_) => "",
    }
}

pub(crate) fn add_envelope_fields(payload: &mut serde_json::Value, kind: &str, elapsed_ms: u128) {
    payload["schema_version"] = serde_json::json!(super::SCHEMA_VERSION);
    payload["kind"] = serde_json::json!(kind);
    payload["elapsed_ms"] = serde_json::json!(elapsed_ms);
}

pub(crate) fn error_obj(
    code: &'static str,
    message: impl ToString,
    hint: impl ToString,
    retryable: bool,
) -> serde_json::Value {
    #[derive(Serialize)]
    struct ErrorObject {
        code: &'static str,
        message: String,
        hint: String,
        retryable: bool,
    }

    let e = ErrorObject {
        code,
        message: message.to_string(),
        hint: hint.to_string(),
        retryable,
    };
    match serde_json::to_value(e) {
        Ok(v) => v,
        Err(_) => serde_json::json!({
            "code": code,
            "message": message.to_string(),
            "hint": hint.to_string(),
            "retryable": retryable
        }),
    }
}

/// `{ok:false, error:{...}}` plus envelope fields, for a failed call to `kind`.
pub(crate) fn error_payload(e: &AskwebError, kind: &str, elapsed_ms: u128) -> serde_json::Value {
    let mut payload = serde_json::json!({
        "ok": false,
        "error": error_obj(e.code(), e, hint(e), retryable(e)),
    });
    add_envelope_fields(&mut payload, kind, elapsed_ms);
    payload
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_payload_carries_code_hint_and_retryable() {
        let v = error_payload(
            &AskwebError::InvalidArgument("query must not be empty".into()),
            "web_search",
            3,
        );
        assert_eq!(v["ok"].as_bool(), Some(false));
        assert_eq!(v["kind"].as_str(), Some("web_search"));
        assert_eq!(v["schema_version"].as_u64(), Some(1));
        assert_eq!(v["error"]["code"].as_str(), Some("invalid_argument"));
        assert_eq!(v["error"]["retryable"].as_bool(), Some(false));
        assert!(v["error"]["message"]
            .as_str()
            .unwrap()
            .contains("query must not be empty"));
        assert!(!v["error"]["hint"].as_str().unwrap().is_empty());
    }

    #[test]
    fn codes_match_the_chat_endpoint() {
        for e in [
            AskwebError::InvalidArgument("x".into()),
            AskwebError::AgentNotFound("x".into()),
            AskwebError::Timeout("x".into()),
            AskwebError::Upstream("x".into()),
            AskwebError::NotConfigured("x".into()),
            AskwebError::UnknownTool("x".into()),
        ] {
            let v = error_payload(&e, "web_search", 0);
            assert_eq!(v["error"]["code"].as_str(), Some(e.code()), "{e}");
            assert_eq!(v["error"]["message"].as_str(), Some(e.to_string().as_str()));
        }
    }

    #[test]
    fn only_transient_failures_are_retryable() {
        assert!(retryable(&AskwebError::Upstream("x".into())));
        assert!(retryable(&AskwebError::Timeout("x".into())));
        assert!(!retryable(&AskwebError::NotConfigured("x".into())));
        assert!(!retryable(&AskwebError::InvalidArgument("x".into())));
    }
}
