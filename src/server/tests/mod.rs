//! Server tests over in-memory transports.

mod dispatch_tests;

use serde_json::{ json, Map, Value };
use std::time::Duration;

use crate::protocol::{
    CallToolResult,
    ElicitAction,
    Error,
    JSONRPCMessage,
    JSONRPCRequest,
    LoggingLevel,
    RequestId,
    Tool,
};
use crate::server::{ RequestContext, Server, ServerBuilder };
use crate::transport::{ StreamTransport, Transport };

/// Tools exercising every dispatch path
pub(crate) fn test_builder() -> ServerBuilder {
    Server::builder()
        .with_server_name("test-server")
        .with_server_version("0.0.1")
        .with_callback_timeout(Duration::from_millis(500))
        .with_tool(Tool::new("echo", "Echo the arguments"), |arguments, _ctx| async move {
            Ok(CallToolResult::structured(Value::Object(arguments)))
        })
        .with_tool(
            Tool::new("slow", "Answer after a delay").with_input_schema(
                json!({
                    "type": "object",
                    "properties": { "millis": { "type": "integer" } },
                    "required": ["millis"]
                })
            ),
            |arguments, _ctx| async move {
                let millis = arguments
                    .get("millis")
                    .and_then(Value::as_u64)
                    .unwrap_or(0);
                tokio::time::sleep(Duration::from_millis(millis)).await;
                Ok(CallToolResult::text(format!("slept {}", millis)))
            }
        )
        .with_tool(Tool::new("fail", "Always fails"), |_arguments, _ctx| async move {
            Err(Error::ToolExecution("boom".to_string()))
        })
        .with_tool(Tool::new("panic", "Panics"), |_arguments, _ctx| async move {
            if true {
                panic!("handler exploded");
            }
            Ok(CallToolResult::text("unreachable"))
        })
        .with_tool(Tool::new("steps", "Reports progress"), |_arguments, ctx: RequestContext| async move {
            ctx.progress(0.0, Some(1.0), Some("start")).await?;
            ctx.progress(0.5, Some(1.0), None).await?;
            // Regressions are dropped
            ctx.progress(0.25, Some(1.0), None).await?;
            ctx.progress(1.0, Some(1.0), Some("done")).await?;
            Ok(CallToolResult::text("finished"))
        })
        .with_tool(Tool::new("chatty", "Logs at info"), |_arguments, ctx: RequestContext| async move {
            ctx.log(LoggingLevel::Info, Some("test"), "informational").await?;
            ctx.log(LoggingLevel::Error, Some("test"), "serious").await?;
            Ok(CallToolResult::text("logged"))
        })
        .with_tool(Tool::new("ask", "Elicit a number"), |_arguments, ctx: RequestContext| async move {
            Ok(CallToolResult::text(ask(&ctx).await))
        })
        .with_tool(Tool::new("ask_twice", "Two elicitations at once"), |_arguments, ctx: RequestContext| async move {
            let (first, second) = tokio::join!(ask(&ctx), ask(&ctx));
            Ok(CallToolResult::text(format!("{} / {}", first, second)))
        })
        .with_tool(Tool::new("joke", "Sample a joke"), |_arguments, ctx: RequestContext| async move {
            match ctx.sample("Tell me a joke!").await {
                Ok(text) => Ok(CallToolResult::text(text)),
                Err(e) => Ok(CallToolResult::text(format!("callback failed: {}", e))),
            }
        })
}

/// Elicit a number and describe the outcome
pub(crate) async fn ask(ctx: &RequestContext) -> String {
    let schema = json!({
        "type": "object",
        "properties": { "number": { "type": "integer" } },
        "required": ["number"]
    });
    match ctx.elicit("pick a number", schema).await {
        Ok(answer) =>
            match answer.action {
                ElicitAction::Accept =>
                    format!(
                        "accepted {}",
                        answer.accepted().and_then(|c| c.get("number")).cloned().unwrap_or(Value::Null)
                    ),
                ElicitAction::Decline => {
                    assert!(answer.content.is_none());
                    "declined".to_string()
                }
                ElicitAction::Cancel => "cancelled".to_string(),
            }
        Err(Error::CallbackFailed(message)) => format!("callback failed: {}", message),
        Err(other) => format!("unexpected error: {}", other),
    }
}

/// Serve a fresh test server on one end of an in-memory pair
pub(crate) fn raw_connection() -> StreamTransport {
    let server = test_builder().build().unwrap();
    let (local, remote) = StreamTransport::pair();
    let _session = server.serve(local);
    remote
}

pub(crate) async fn next(transport: &StreamTransport) -> JSONRPCMessage {
    tokio::time::timeout(Duration::from_secs(5), transport.receive()).await
        .expect("timed out waiting for a message")
        .expect("transport failed")
}

pub(crate) fn call(id: i64, name: &str, arguments: Value) -> JSONRPCMessage {
    JSONRPCRequest::new(
        RequestId::Number(id),
        "tools/call",
        Some(json!({ "name": name, "arguments": arguments }))
    ).into()
}

pub(crate) fn arguments(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}
