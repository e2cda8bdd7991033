//! End-to-end protocol scenarios over the line channel.

use agentic_web_scraper::services::StaticFetcher;
use agentic_web_scraper::transport::LineChannel;
use agentic_web_scraper::{ServerContext, tools};
use serde_json::{Value, json};

const PAGE: &str = "<html><head><title>Example Domain</title></head>\
    <body><h1>Example</h1><p>An example page.</p><a href=\"/more\">More</a></body></html>";

fn context() -> ServerContext {
    ServerContext::offline(StaticFetcher::new().with_page("https://example.com/", PAGE))
}

async fn exchange(ctx: &ServerContext, requests: &[Value]) -> Vec<Value> {
    let input: String = requests.iter().map(|r| format!("{r}\n")).collect();
    exchange_raw(ctx, &input).await
}

async fn exchange_raw(ctx: &ServerContext, input: &str) -> Vec<Value> {
    let dispatcher = tools::dispatcher(ctx).expect("standard tools register");
    let mut output = Vec::new();
    LineChannel::new(input.as_bytes(), &mut output, dispatcher)
        .run()
        .await
        .expect("in-memory I/O does not fail");
    String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).expect("each output line is one JSON object"))
        .collect()
}

#[tokio::test]
async fn tools_list_matches_registration_order() {
    let responses = exchange(&context(), &[json!({"method": "tools/list"})]).await;
    let tools = responses[0]["result"]["tools"].as_array().unwrap();
    let names: Vec<&str> = tools.iter().map(|t| t["name"].as_str().unwrap()).collect();
    assert_eq!(
        names,
        [
            "scrape_url",
            "scrape_multiple_urls",
            "start_research",
            "research_interactive",
            "list_research_projects",
            "export_research_report",
            "analyze_url",
            "get_token_metrics",
        ]
    );

    let scrape = &tools[0];
    assert_eq!(scrape["inputSchema"]["required"], json!(["url"]));
    assert_eq!(scrape["inputSchema"]["properties"]["url"]["type"], "string");
}

#[tokio::test]
async fn malformed_line_keeps_the_channel_alive() {
    let input = "{\"method\": \"tools/list\"\n{\"method\":\"initialize\"}\n";
    let responses = exchange_raw(&context(), input).await;
    assert_eq!(responses.len(), 2);
    assert_eq!(responses[0]["error"]["code"], -32700);
    assert_eq!(responses[1]["result"]["server_info"]["name"], "agentic-web-scraper");
}

#[tokio::test]
async fn unknown_tool_is_invalid_params() {
    let responses = exchange(
        &context(),
        &[json!({"method": "tools/call", "params": {"name": "nonexistent", "arguments": {}}})],
    )
    .await;
    assert_eq!(responses[0]["error"]["code"], -32602);
    assert_eq!(responses[0]["error"]["message"], "Unknown tool: nonexistent");
    assert!(responses[0].get("result").is_none());
}

#[tokio::test]
async fn unknown_method_is_method_not_found() {
    let responses = exchange(&context(), &[json!({"method": "prompts/list"})]).await;
    assert_eq!(responses[0]["error"]["code"], -32601);
}

#[tokio::test]
async fn scrape_url_in_markdown() {
    let responses = exchange(
        &context(),
        &[json!({
            "method": "tools/call",
            "params": {
                "name": "scrape_url",
                "arguments": {"url": "https://example.com/", "output_format": "markdown"}
            }
        })],
    )
    .await;
    let result = &responses[0]["result"];
    assert_eq!(result["success"], true);
    assert_eq!(result["format"], "markdown");
    let markdown = result["data"].as_str().unwrap();
    assert!(markdown.contains("# title\n\n**title**: Example Domain"));
    assert!(markdown.contains("# metadata\n\n## status_code\n\n**status_code**: 200"));
}

#[tokio::test]
async fn batch_summary_accounts_for_every_url() {
    let responses = exchange(
        &context(),
        &[json!({
            "method": "tools/call",
            "params": {
                "name": "scrape_multiple_urls",
                "arguments": {"urls": ["a", "b", "c"], "concurrent_limit": 2}
            }
        })],
    )
    .await;
    let result = &responses[0]["result"];
    let summary = &result["summary"];
    assert_eq!(summary["total_urls"], 3);
    let successful = summary["successful"].as_u64().unwrap();
    let failed = summary["failed"].as_u64().unwrap();
    assert_eq!(successful + failed, 3);
    assert_eq!(result["results"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn research_round_trip() {
    let ctx = context();
    let responses = exchange(
        &ctx,
        &[json!({
            "method": "tools/call",
            "params": {
                "name": "start_research",
                "arguments": {
                    "research_question": "What makes a page useful?",
                    "initial_urls": ["https://example.com/"],
                    "citation_format": "mla"
                }
            }
        })],
    )
    .await;
    let project_id = responses[0]["result"]["project"]["project_id"]
        .as_str()
        .unwrap()
        .to_string();

    let responses = exchange(
        &ctx,
        &[
            json!({"method": "tools/call", "params": {"name": "list_research_projects"}}),
            json!({
                "method": "tools/call",
                "params": {"name": "export_research_report", "arguments": {"project_id": project_id}}
            }),
            json!({
                "method": "tools/call",
                "params": {"name": "export_research_report", "arguments": {"project_id": "nope"}}
            }),
        ],
    )
    .await;

    assert_eq!(responses[0]["result"]["total"], 1);
    assert_eq!(responses[0]["result"]["projects"][0]["project_id"], project_id.as_str());

    let report = responses[1]["result"]["report"].as_str().unwrap();
    assert!(report.contains("\"example.com.\" Web."));

    assert_eq!(responses[2]["error"]["code"], -32603);
    assert_eq!(
        responses[2]["error"]["message"],
        "Tool execution failed: Research project not found: nope"
    );
}

#[tokio::test]
async fn usage_metrics_follow_analysis_calls() {
    let ctx = context();
    let responses = exchange(
        &ctx,
        &[
            json!({
                "method": "tools/call",
                "params": {
                    "name": "analyze_url",
                    "arguments": {"url": "https://example.com/", "question": "What is this page?"}
                }
            }),
            json!({"method": "tools/call", "params": {"name": "get_token_metrics"}}),
        ],
    )
    .await;
    assert_eq!(responses[0]["result"]["success"], true);
    assert_eq!(responses[0]["result"]["format"], "markdown");
    assert_eq!(responses[1]["result"]["metrics"]["total_requests"], 1);
}
