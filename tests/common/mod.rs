//! Shared helpers for the HTTP integration tests.

#![allow(dead_code)]

use serde_json::Value;
use taskrelay::events::StreamEvent;

/// Read an NDJSON stream body to its end and parse every line
pub async fn read_ndjson(response: reqwest::Response) -> Vec<Value> {
    let body = response.text().await.expect("stream body");
    body.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).expect("valid json line"))
        .collect()
}

pub fn event_types(lines: &[Value]) -> Vec<String> {
    lines
        .iter()
        .map(|line| line["type"].as_str().unwrap_or("error").to_string())
        .collect()
}

pub async fn post_event(client: &reqwest::Client, url: &str, event: &StreamEvent) -> Value {
    let response = client.post(url).json(event).send().await.expect("post event");
    assert_eq!(response.status(), reqwest::StatusCode::ACCEPTED);
    response.json().await.expect("post response body")
}
