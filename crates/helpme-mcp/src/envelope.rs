//! JSON shape shared by `helpme call` and the MCP tool results.

use helpme_core::ResultEnvelope;

pub const SCHEMA_VERSION: u64 = 1;

pub(crate) fn add_envelope_fields(payload: &mut serde_json::Value, kind: &str, elapsed_ms: u128) {
    payload["schema_version"] = serde_json::json!(SCHEMA_VERSION);
    payload["kind"] = serde_json::json!(kind);
    payload["elapsed_ms"] = serde_json::json!(elapsed_ms);
}

/// `{schema_version, kind, ok, elapsed_ms, envelope}`, plus `error{kind, retryable}` for
/// failures that came from a classified error.
pub fn payload_for(kind: &str, envelope: &ResultEnvelope, elapsed_ms: u128) -> serde_json::Value {
    let mut payload = serde_json::json!({
        "ok": envelope.is_success(),
        "envelope": envelope,
    });
    if let Some(k) = envelope.error_kind() {
        payload["error"] = serde_json::json!({
            "kind": k.as_str(),
            "retryable": k.retryable(),
        });
    }
    add_envelope_fields(&mut payload, kind, elapsed_ms);
    payload
}
