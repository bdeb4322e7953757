#![cfg(feature = "stdio")]

use std::collections::BTreeSet;

#[test]
fn helpme_stdio_lists_tools_and_answers_offline_calls() {
    let rt = tokio::runtime::Runtime::new().expect("tokio runtime");
    rt.block_on(async {
        use rmcp::{
            model::CallToolRequestParam,
            service::ServiceExt,
            transport::{ConfigureCommandExt, TokioChildProcess},
        };

        let dir = tempfile::tempdir()?;
        let lock = dir.path().join("helpme.lock");
        let bin = assert_cmd::cargo::cargo_bin!("helpme");
        let service = ()
            .serve(TokioChildProcess::new(
                tokio::process::Command::new(bin).configure(|cmd| {
                    cmd.args(["mcp-stdio"]);
                    cmd.env("HELPME_LOCK_FILE", &lock);
                    cmd.env("HELPME_LOG_DIR", "off");
                    cmd.env_remove("HELPME_ENV_FILE");
                }),
            )?)
            .await?;

        let tools = service.list_tools(Default::default()).await?;
        let names: BTreeSet<String> = tools
            .tools
            .iter()
            .map(|t| t.name.clone().into_owned())
            .collect();
        for must_have in [
            "web_search",
            "web_read",
            "read_search_result",
            "list_search_results",
            "explain_screen",
            "get_highlighted_text",
            "get_location",
            "get_distance",
            "get_directions",
        ] {
            assert!(names.contains(must_have), "missing tool {must_have}");
        }

        // The server holds the single-instance lock while it runs.
        assert!(lock.exists(), "lock file not created");

        let resp = service
            .call_tool(CallToolRequestParam {
                name: "list_search_results".into(),
                arguments: None,
            })
            .await?;
        let text = resp
            .content
            .first()
            .and_then(|c| c.as_text())
            .map(|t| t.text.clone())
            .unwrap_or_default();
        assert!(text.contains("perform a search first"), "{text}");
        let v = resp.structured_content.clone().expect("structured content");
        assert_eq!(v["schema_version"].as_u64(), Some(1));
        assert_eq!(v["kind"].as_str(), Some("list_search_results"));
        assert_eq!(v["envelope"]["status"].as_str(), Some("failure"));
        assert_eq!(v["error"]["kind"].as_str(), Some("not_found"));

        let resp = service
            .call_tool(CallToolRequestParam {
                name: "read_search_result".into(),
                arguments: Some(
                    serde_json::json!({ "result_number": 3 })
                        .as_object()
                        .cloned()
                        .unwrap(),
                ),
            })
            .await?;
        let v = resp.structured_content.clone().expect("structured content");
        assert_eq!(v["ok"].as_bool(), Some(false));

        let resp = service
            .call_tool(CallToolRequestParam {
                name: "get_highlighted_text".into(),
                arguments: None,
            })
            .await?;
        let text = resp
            .content
            .first()
            .and_then(|c| c.as_text())
            .map(|t| t.text.clone());
        assert_eq!(
            text.as_deref(),
            Some("Highlighted text functionality not implemented yet.")
        );

        service.cancel().await?;
        Ok::<(), Box<dyn std::error::Error>>(())
    })
    .expect("mcp stdio contract");
}
