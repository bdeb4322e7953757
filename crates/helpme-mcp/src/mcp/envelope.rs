use helpme_core::ResultEnvelope;
use rmcp::model::{CallToolResult, Content};

use crate::envelope::payload_for;

/// Structured content for machine consumers; `content[0].text` is what gets spoken.
pub(crate) fn tool_result(kind: &str, envelope: &ResultEnvelope, elapsed_ms: u128) -> CallToolResult {
    let mut r = CallToolResult::structured(payload_for(kind, envelope, elapsed_ms));
    r.content = vec![Content::text(envelope.speech_text())];
    r
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_content_is_the_speech() {
        let r = tool_result("list_search_results", &ResultEnvelope::text("Nothing yet."), 0);
        let text = r.content.first().and_then(|c| c.as_text()).map(|t| t.text.as_str());
        assert_eq!(text, Some("Nothing yet."));
        assert!(r.structured_content.is_some());
    }
}
