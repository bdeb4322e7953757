//! MCP stdio surface: one tool per capability.

use rmcp::{
    handler::server::router::tool::ToolRouter as RmcpToolRouter,
    handler::server::wrapper::Parameters,
    model::{CallToolResult, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router,
    transport::stdio,
    ErrorData as McpError, ServiceExt,
};
use std::sync::Arc;
use std::time::Instant;

use crate::capabilities::{
    Assistant, DirectionsArgs, DistanceArgs, LocationArgs, ReadSearchResultArgs, WebReadArgs,
    WebSearchArgs,
};

mod envelope;
use envelope::tool_result;

#[derive(Clone)]
pub struct HelpmeMcp {
    tool_router: RmcpToolRouter<Self>,
    assistant: Arc<Assistant>,
}

#[tool_router]
impl HelpmeMcp {
    pub fn new(assistant: Arc<Assistant>) -> Self {
        Self {
            tool_router: Self::tool_router(),
            assistant,
        }
    }

    #[tool(description = "Search the web for information about a topic and summarize the results")]
    async fn web_search(
        &self,
        params: Parameters<Option<WebSearchArgs>>,
    ) -> Result<CallToolResult, McpError> {
        let t0 = Instant::now();
        let args = params.0.unwrap_or_default();
        let env = self.assistant.web_search(&args.topic).await;
        Ok(tool_result("web_search", &env, t0.elapsed().as_millis()))
    }

    #[tool(
        description = "Read and explain the content of a web page, optionally focused on a topic"
    )]
    async fn web_read(
        &self,
        params: Parameters<Option<WebReadArgs>>,
    ) -> Result<CallToolResult, McpError> {
        let t0 = Instant::now();
        let args = params.0.unwrap_or_default();
        let env = self
            .assistant
            .web_read(&args.url, args.topic.as_deref())
            .await;
        Ok(tool_result("web_read", &env, t0.elapsed().as_millis()))
    }

    #[tool(description = "Read a result from the previous search (numbered from 1)")]
    async fn read_search_result(
        &self,
        params: Parameters<Option<ReadSearchResultArgs>>,
    ) -> Result<CallToolResult, McpError> {
        let t0 = Instant::now();
        let args = params.0.unwrap_or_default();
        let env = self.assistant.read_search_result(args.result_number).await;
        Ok(tool_result("read_search_result", &env, t0.elapsed().as_millis()))
    }

    #[tool(description = "List the most recent search results")]
    async fn list_search_results(&self) -> Result<CallToolResult, McpError> {
        let t0 = Instant::now();
        let env = self.assistant.list_search_results().await;
        Ok(tool_result("list_search_results", &env, t0.elapsed().as_millis()))
    }

    #[tool(description = "Explain what is currently visible on the user's screen")]
    async fn explain_screen(&self) -> Result<CallToolResult, McpError> {
        let t0 = Instant::now();
        let env = self.assistant.explain_screen().await;
        Ok(tool_result("explain_screen", &env, t0.elapsed().as_millis()))
    }

    #[tool(description = "Get highlighted text from the screen (not available yet)")]
    async fn get_highlighted_text(&self) -> Result<CallToolResult, McpError> {
        let t0 = Instant::now();
        let env = self.assistant.get_highlighted_text().await;
        Ok(tool_result("get_highlighted_text", &env, t0.elapsed().as_millis()))
    }

    #[tool(description = "Find the address and coordinates of a place (experimental)")]
    async fn get_location(
        &self,
        params: Parameters<Option<LocationArgs>>,
    ) -> Result<CallToolResult, McpError> {
        let t0 = Instant::now();
        let args = params.0.unwrap_or_default();
        let env = self.assistant.get_location(&args.place).await;
        Ok(tool_result("get_location", &env, t0.elapsed().as_millis()))
    }

    #[tool(description = "Straight-line distance in miles between two places (experimental)")]
    async fn get_distance(
        &self,
        params: Parameters<Option<DistanceArgs>>,
    ) -> Result<CallToolResult, McpError> {
        let t0 = Instant::now();
        let args = params.0.unwrap_or_default();
        let env = self
            .assistant
            .get_distance(&args.origin, &args.destination)
            .await;
        Ok(tool_result("get_distance", &env, t0.elapsed().as_millis()))
    }

    #[tool(
        description = "Directions between two places: driving (default), walking or bicycle (experimental)"
    )]
    async fn get_directions(
        &self,
        params: Parameters<Option<DirectionsArgs>>,
    ) -> Result<CallToolResult, McpError> {
        let t0 = Instant::now();
        let args = params.0.unwrap_or_default();
        let env = self
            .assistant
            .get_directions(&args.origin, &args.destination, args.mode.as_deref())
            .await;
        Ok(tool_result("get_directions", &env, t0.elapsed().as_millis()))
    }
}

#[tool_handler]
impl rmcp::ServerHandler for HelpmeMcp {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(crate::descriptors::instructions()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

/// Serve until the client closes stdin.
pub async fn serve_stdio(assistant: Arc<Assistant>) -> Result<(), McpError> {
    let svc = HelpmeMcp::new(assistant);
    let running = svc
        .serve(stdio())
        .await
        .map_err(|e| McpError::internal_error(e.to_string(), None))?;
    tracing::info!("mcp stdio server ready");
    running
        .waiting()
        .await
        .map_err(|e| McpError::internal_error(e.to_string(), None))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AssistantConfig;

    fn p<T>(v: T) -> Parameters<Option<T>> {
        Parameters(Some(v))
    }

    fn server() -> HelpmeMcp {
        let assistant = Assistant::from_config(&AssistantConfig::default()).expect("assistant");
        HelpmeMcp::new(Arc::new(assistant))
    }

    fn structured(r: &CallToolResult) -> serde_json::Value {
        r.structured_content.clone().expect("structured content")
    }

    #[tokio::test]
    async fn list_without_search_is_a_spoken_failure() {
        let svc = server();
        let r = svc.list_search_results().await.unwrap();
        let v = structured(&r);
        assert_eq!(v["kind"], "list_search_results");
        assert_eq!(v["ok"], false);
        let text = r.content[0].as_text().map(|t| t.text.clone()).unwrap_or_default();
        assert!(text.contains("perform a search first"), "{text}");
    }

    #[tokio::test]
    async fn failures_carry_error_kind_and_retry_hint() {
        let svc = server();
        let r = svc.list_search_results().await.unwrap();
        let v = structured(&r);
        assert_eq!(v["error"]["kind"], "not_found");
        assert_eq!(v["error"]["retryable"], false);
        assert_eq!(v["envelope"]["kind"], "not_found");

        let r = svc.web_search(Parameters(None)).await.unwrap();
        let v = structured(&r);
        assert_eq!(v["error"]["kind"], "invalid_argument");
        assert_eq!(v["error"]["retryable"], false);

        let r = svc.get_highlighted_text().await.unwrap();
        assert!(structured(&r).get("error").is_none());
    }

    #[tokio::test]
    async fn missing_arguments_are_invalid_not_errors() {
        let svc = server();
        let r = svc.web_search(Parameters(None)).await.unwrap();
        assert_eq!(structured(&r)["envelope"]["status"], "failure");

        let r = svc
            .read_search_result(p(ReadSearchResultArgs { result_number: 2 }))
            .await
            .unwrap();
        assert_eq!(structured(&r)["ok"], false);
    }

    #[tokio::test]
    async fn highlighted_text_is_the_fixed_literal() {
        let svc = server();
        let r = svc.get_highlighted_text().await.unwrap();
        let text = r.content[0].as_text().map(|t| t.text.clone());
        assert_eq!(
            text.as_deref(),
            Some(crate::capabilities::HIGHLIGHTED_TEXT_MESSAGE)
        );
    }
}
