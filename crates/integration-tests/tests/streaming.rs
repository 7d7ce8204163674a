//! End-to-end coverage of the SSE surfaces: raw event streams with resume,
//! and profile-shaped block streams.

use std::time::Duration;

use eventsource_stream::{Event, Eventsource};
use futures::StreamExt;
use indoc::indoc;
use integration_tests::TestServer;
use serde_json::Value;

const STREAM_DEADLINE: Duration = Duration::from_secs(10);

async fn start_run(server: &TestServer, message: &str) -> String {
    let body: Value = server
        .client()
        .post("/api/v1/chat", &serde_json::json!({ "message": message }))
        .await
        .json()
        .await
        .unwrap();

    body["runId"].as_str().unwrap().to_string()
}

/// Collects every SSE event until the server ends the stream.
async fn collect_events(server: &TestServer, path: &str, last_event_id: Option<&str>) -> Vec<Event> {
    let mut request = server.client().request(reqwest::Method::GET, path);

    if let Some(id) = last_event_id {
        request = request.header("Last-Event-ID", id);
    }

    let response = request.send().await.unwrap();
    assert_eq!(response.status(), 200);
    assert!(
        response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .starts_with("text/event-stream")
    );

    let collect = async {
        let mut events = Vec::new();
        let mut stream = response.bytes_stream().eventsource();

        while let Some(event) = stream.next().await {
            events.push(event.unwrap());
        }

        events
    };

    tokio::time::timeout(STREAM_DEADLINE, collect)
        .await
        .expect("stream should end before the deadline")
}

#[tokio::test]
async fn event_stream_delivers_ordered_ids_and_tags() {
    let server = TestServer::spawn("").await;

    let run_id = start_run(&server, "#count:5").await;
    let events = collect_events(&server, &format!("/api/v1/chat/{run_id}/stream"), None).await;

    // 5 deltas + model.complete + run.completed.
    assert_eq!(events.len(), 7);

    let ids: Vec<u64> = events.iter().map(|e| e.id.parse().unwrap()).collect();
    assert_eq!(ids, (1..=7).collect::<Vec<u64>>());

    assert_eq!(events[0].event, "model.delta");
    assert_eq!(events[5].event, "model.complete");
    assert_eq!(events[6].event, "run.completed");

    let first: Value = serde_json::from_str(&events[0].data).unwrap();
    assert_eq!(first["text"], "delta 0 ");
}

#[tokio::test]
async fn last_event_id_resumes_after_the_given_id() {
    let server = TestServer::spawn("").await;

    let run_id = start_run(&server, "#count:5").await;

    // Drain once so the run is finished and buffered.
    let all = collect_events(&server, &format!("/api/v1/chat/{run_id}/stream"), None).await;
    assert_eq!(all.len(), 7);

    let resumed = collect_events(&server, &format!("/api/v1/chat/{run_id}/stream"), Some("5")).await;
    let ids: Vec<u64> = resumed.iter().map(|e| e.id.parse().unwrap()).collect();

    assert_eq!(ids, vec![6, 7]);
}

#[tokio::test]
async fn evicted_events_surface_as_an_id_gap() {
    let server = TestServer::spawn(indoc! {r#"
        [registry]
        buffer_size = 3
    "#})
    .await;

    let run_id = start_run(&server, "#count:10").await;

    // Let the run finish; only the last 3 of its 12 events stay buffered.
    tokio::time::sleep(Duration::from_millis(300)).await;

    let events = collect_events(&server, &format!("/api/v1/chat/{run_id}/stream"), None).await;
    let ids: Vec<u64> = events.iter().map(|e| e.id.parse().unwrap()).collect();

    assert_eq!(ids, vec![10, 11, 12]);
    assert!(ids[0] > 1, "the id jump is the client's gap signal");
}

#[tokio::test]
async fn unknown_run_stream_is_a_404() {
    let server = TestServer::spawn("").await;

    let response = server.client().get("/api/v1/chat/missing/stream").await;
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn block_stream_shapes_updates_and_summary() {
    let server = TestServer::spawn("").await;

    let run_id = start_run(&server, "#count:3").await;
    let events = collect_events(
        &server,
        &format!("/api/v1/chat/{run_id}/blocks?profile=console"),
        None,
    )
    .await;

    let summary = events.last().unwrap();
    assert_eq!(summary.event, "summary");

    let updates: Vec<Value> = events
        .iter()
        .filter(|e| e.event == "update")
        .map(|e| serde_json::from_str(&e.data).unwrap())
        .collect();

    assert!(!updates.is_empty());

    let full = "delta 0 delta 1 delta 2 ";
    assert_eq!(updates.last().unwrap()["full_content"], full);

    let concatenated: String = updates
        .iter()
        .map(|u| u["delta"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(concatenated, full);

    let indices: Vec<u64> = updates.iter().map(|u| u["index"].as_u64().unwrap()).collect();
    for pair in indices.windows(2) {
        assert!(pair[1] > pair[0]);
    }

    let summary: Value = serde_json::from_str(&summary.data).unwrap();
    assert_eq!(summary["total_chars"].as_u64().unwrap() as usize, full.len());
}

#[tokio::test]
async fn block_mode_profile_emits_complete_blocks() {
    let server = TestServer::spawn("").await;

    let run_id = start_run(&server, "A short answer. ").await;
    let events = collect_events(
        &server,
        &format!("/api/v1/chat/{run_id}/blocks?profile=whatsapp"),
        None,
    )
    .await;

    let blocks: Vec<Value> = events
        .iter()
        .filter(|e| e.event == "block")
        .map(|e| serde_json::from_str(&e.data).unwrap())
        .collect();

    assert!(!blocks.is_empty());
    assert_eq!(blocks.last().unwrap()["is_last"], true);
    assert_eq!(blocks[0]["is_first"], true);

    let content: String = blocks
        .iter()
        .map(|b| b["content"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(content, "A short answer. ");
}

#[tokio::test]
async fn unknown_profile_is_a_validation_error() {
    let server = TestServer::spawn("").await;

    let run_id = start_run(&server, "hello").await;

    let response = server
        .client()
        .get(&format!("/api/v1/chat/{run_id}/blocks?profile=matrix"))
        .await;

    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}
