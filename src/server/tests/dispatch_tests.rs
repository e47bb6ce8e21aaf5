use serde_json::json;
use std::collections::HashSet;
use std::time::Duration;

use super::{ call, next, raw_connection };
use crate::protocol::{
    error_codes,
    JSONRPCMessage,
    JSONRPCNotification,
    JSONRPCRequest,
    RequestId,
};
use crate::transport::Transport;

fn error_code(message: &JSONRPCMessage) -> Option<i32> {
    match message {
        JSONRPCMessage::Error(error) => Some(error.error.code),
        _ => None,
    }
}

fn result_text(message: &JSONRPCMessage) -> String {
    match message {
        JSONRPCMessage::Response(response) =>
            response.result["content"][0]["text"].as_str().unwrap_or_default().to_string(),
        other => panic!("expected a response, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unknown_method() {
    let client = raw_connection();
    let request = JSONRPCRequest::new(RequestId::Number(1), "tools/explode", None);
    client.send(&request.into()).await.unwrap();

    let reply = next(&client).await;
    assert_eq!(reply.id(), Some(&RequestId::Number(1)));
    assert_eq!(error_code(&reply), Some(error_codes::METHOD_NOT_FOUND));
}

#[tokio::test]
async fn test_server_only_method_is_not_routed() {
    let client = raw_connection();
    let request = JSONRPCRequest::new(
        RequestId::String("e".to_string()),
        "elicitation/create",
        Some(json!({ "message": "hi", "requestedSchema": {} }))
    );
    client.send(&request.into()).await.unwrap();

    let reply = next(&client).await;
    assert_eq!(reply.id(), Some(&RequestId::String("e".to_string())));
    assert_eq!(error_code(&reply), Some(error_codes::METHOD_NOT_FOUND));
}

#[tokio::test]
async fn test_unknown_tool() {
    let client = raw_connection();
    client.send(&call(1, "nope", json!({}))).await.unwrap();
    assert_eq!(error_code(&next(&client).await), Some(error_codes::METHOD_NOT_FOUND));
}

#[tokio::test]
async fn test_invalid_arguments() {
    let client = raw_connection();
    client.send(&call(1, "slow", json!({ "millis": "soon" }))).await.unwrap();
    assert_eq!(error_code(&next(&client).await), Some(error_codes::INVALID_PARAMS));
}

#[tokio::test]
async fn test_tool_failure_is_a_result() {
    let client = raw_connection();
    client.send(&call(1, "fail", json!({}))).await.unwrap();

    match next(&client).await {
        JSONRPCMessage::Response(response) => {
            assert_eq!(response.result["isError"], json!(true));
            assert!(response.result["content"][0]["text"].as_str().unwrap().contains("boom"));
        }
        other => panic!("expected a response, got {:?}", other),
    }
}

#[tokio::test]
async fn test_panic_does_not_kill_the_session() {
    let client = raw_connection();
    client.send(&call(1, "panic", json!({}))).await.unwrap();
    assert_eq!(error_code(&next(&client).await), Some(error_codes::INTERNAL_ERROR));

    client.send(&call(2, "echo", json!({ "still": "alive" }))).await.unwrap();
    let reply = next(&client).await;
    assert_eq!(reply.id(), Some(&RequestId::Number(2)));
    assert!(matches!(reply, JSONRPCMessage::Response(_)));
}

#[tokio::test]
async fn test_slow_call_does_not_delay_fast_call() {
    let client = raw_connection();
    client.send(&call(1, "slow", json!({ "millis": 1000 }))).await.unwrap();
    client.send(&call(2, "echo", json!({ "x": 1 }))).await.unwrap();

    let first = next(&client).await;
    assert_eq!(first.id(), Some(&RequestId::Number(2)));

    let second = next(&client).await;
    assert_eq!(second.id(), Some(&RequestId::Number(1)));
    assert_eq!(result_text(&second), "slept 1000");
}

#[tokio::test]
async fn test_duplicate_in_flight_id_is_rejected() {
    let client = raw_connection();
    client.send(&call(7, "slow", json!({ "millis": 300 }))).await.unwrap();
    client.send(&call(7, "echo", json!({}))).await.unwrap();

    let rejected = next(&client).await;
    assert_eq!(rejected.id(), Some(&RequestId::Number(7)));
    assert_eq!(error_code(&rejected), Some(error_codes::INVALID_REQUEST));

    let completed = next(&client).await;
    assert_eq!(result_text(&completed), "slept 300");

    // Once answered, the id may be used again
    client.send(&call(7, "echo", json!({}))).await.unwrap();
    assert!(matches!(next(&client).await, JSONRPCMessage::Response(_)));
}

#[tokio::test]
async fn test_exactly_one_response_per_request() {
    let client = raw_connection();
    for id in 1..=5 {
        client.send(&call(id, "echo", json!({ "id": id }))).await.unwrap();
    }

    let mut seen = HashSet::new();
    for _ in 0..5 {
        let reply = next(&client).await;
        assert!(seen.insert(reply.id().cloned().unwrap()));
    }
    assert_eq!(seen.len(), 5);

    let extra = tokio::time::timeout(Duration::from_millis(200), client.receive()).await;
    assert!(extra.is_err(), "unexpected extra message: {:?}", extra);
}

#[tokio::test]
async fn test_progress_is_ordered_and_precedes_response() {
    let client = raw_connection();
    let request = JSONRPCRequest::new(
        RequestId::Number(1),
        "tools/call",
        Some(json!({ "name": "steps", "arguments": {}, "_meta": { "progressToken": "0" } }))
    );
    client.send(&request.into()).await.unwrap();

    let mut progress = Vec::new();
    loop {
        match next(&client).await {
            JSONRPCMessage::Notification(notification) => {
                assert_eq!(notification.method, "notifications/progress");
                let params = notification.params.unwrap();
                assert_eq!(params["progressToken"], json!("0"));
                progress.push(params["progress"].as_f64().unwrap());
            }
            response => {
                assert_eq!(result_text(&response), "finished");
                break;
            }
        }
    }
    assert_eq!(progress, vec![0.0, 0.5, 1.0]);
}

#[tokio::test]
async fn test_no_progress_without_token() {
    let client = raw_connection();
    client.send(&call(1, "steps", json!({}))).await.unwrap();
    let reply = next(&client).await;
    assert_eq!(result_text(&reply), "finished");
}

#[tokio::test]
async fn test_log_level_filters_messages() {
    let client = raw_connection();
    let set_level = JSONRPCRequest::new(
        RequestId::Number(1),
        "logging/setLevel",
        Some(json!({ "level": "warning" }))
    );
    client.send(&set_level.into()).await.unwrap();
    assert!(matches!(next(&client).await, JSONRPCMessage::Response(_)));

    client.send(&call(2, "chatty", json!({}))).await.unwrap();
    match next(&client).await {
        JSONRPCMessage::Notification(notification) => {
            let params = notification.params.unwrap();
            assert_eq!(params["level"], json!("error"));
            assert_eq!(params["logger"], json!("test"));
            assert_eq!(params["data"], json!("serious"));
        }
        other => panic!("expected a log notification, got {:?}", other),
    }
    assert_eq!(result_text(&next(&client).await), "logged");
}

#[tokio::test]
async fn test_ping_and_notifications() {
    let client = raw_connection();
    let initialized = JSONRPCNotification::new("notifications/initialized", None);
    client.send(&initialized.into()).await.unwrap();
    let cancelled = JSONRPCNotification::new(
        "notifications/cancelled",
        Some(json!({ "requestId": 99, "reason": "changed my mind" }))
    );
    client.send(&cancelled.into()).await.unwrap();

    client.send(&JSONRPCRequest::new(RequestId::Number(3), "ping", None).into()).await.unwrap();
    match next(&client).await {
        JSONRPCMessage::Response(response) => {
            assert_eq!(response.id, RequestId::Number(3));
            assert_eq!(response.result, json!({}));
        }
        other => panic!("expected a response, got {:?}", other),
    }
}
