//! Client tests against an in-process server

use serde_json::{ json, Map, Value };
use std::collections::HashMap;
use std::sync::{ Arc, Mutex };

use crate::client::{ Client, ClientBuilder };
use crate::protocol::{
    CallToolResult,
    Error,
    GetPromptResult,
    JSONRPCNotification,
    LoggingLevel,
    Prompt,
    PromptArgument,
    PromptMessage,
    ReadResourceResult,
    Reference,
    Resource,
    ResourceContents,
    ResourceTemplate,
    Tool,
};
use crate::server::services::completion::prefix_completion;
use crate::server::{ RequestContext, Server };
use crate::transport::StreamTransport;

fn server() -> Server {
    Server::builder()
        .with_server_name("client-test-server")
        .with_server_version("1.2.3")
        .with_instructions("be nice")
        .with_tool(Tool::new("first", "Registered first"), |_arguments, _ctx| async move {
            Ok(CallToolResult::text("one"))
        })
        .with_tool(Tool::new("second", "Registered second"), |_arguments, ctx: RequestContext| async move {
            ctx.progress(0.0, Some(2.0), Some("half way there")).await?;
            ctx.log(LoggingLevel::Warning, Some("second"), json!({ "step": 1 })).await?;
            ctx.progress(2.0, Some(2.0), None).await?;
            Ok(CallToolResult::text("two"))
        })
        .with_resource(Resource::new("memo://readme", "readme"), |request, _ctx| async move {
            Ok(ReadResourceResult {
                contents: vec![ResourceContents::text(request.uri, "static text")],
            })
        })
        .with_resource_template(
            ResourceTemplate::new("users://{id}/profile", "profile"),
            |request, _ctx| async move {
                let id = request.variable("id").unwrap_or_default().to_string();
                Ok(ReadResourceResult {
                    contents: vec![ResourceContents::text(request.uri, format!("profile of {}", id))],
                })
            },
            Some(prefix_completion(["alice", "albert", "bob"], false))
        )
        .with_prompt(
            Prompt::new("summarize", "Summarize text").with_argument(
                PromptArgument::required("text", "What to summarize")
            ),
            |arguments: HashMap<String, String>, _ctx| async move {
                Ok(GetPromptResult {
                    description: None,
                    messages: vec![PromptMessage::user_text(format!("summarize: {}", arguments["text"]))],
                })
            },
            None
        )
        .build()
        .unwrap()
}

async fn connect(builder: ClientBuilder) -> Client {
    let (local, remote) = StreamTransport::pair();
    let _session = server().serve(local);
    builder.connect(remote).await.unwrap()
}

#[tokio::test]
async fn test_handshake() {
    let client = connect(Client::builder().with_client_name("tester")).await;

    assert_eq!(client.server_info().name, "client-test-server");
    assert_eq!(client.server_info().version, "1.2.3");
    assert_eq!(client.instructions(), Some("be nice"));
    assert!(client.server_capabilities().tools.is_some());
    assert!(client.server_capabilities().completions.is_some());
    assert!(client.is_connected());
    client.ping().await.unwrap();
}

#[tokio::test]
async fn test_tools_are_listed_in_registration_order() {
    let client = connect(Client::builder()).await;
    let tools = client.list_tools().await.unwrap();
    let names: Vec<&str> = tools.tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["first", "second"]);
    assert_eq!(tools.tools[0].input_schema, json!({ "type": "object" }));
}

#[tokio::test]
async fn test_tools_registered_while_serving_are_visible() {
    let server = server();
    let (local, remote) = StreamTransport::pair();
    let _session = server.serve(local);
    let client = Client::builder().connect(remote).await.unwrap();

    server
        .tool_registry()
        .register(Tool::new("late", "Registered after connecting"), |_arguments, _ctx| async move {
            Ok(CallToolResult::text("late"))
        })
        .unwrap();

    let names: Vec<String> = client.list_tools().await.unwrap().tools.into_iter().map(|t| t.name).collect();
    assert_eq!(names, vec!["first", "second", "late"]);
    let result = client.call_tool("late", Map::new()).await.unwrap();
    assert_eq!(result.first_text(), Some("late"));

    assert!(server.tool_registry().unregister("late"));
    let err = client.call_tool("late", Map::new()).await.unwrap_err();
    assert!(matches!(err, Error::MethodNotFound(_)), "{:?}", err);
}

#[tokio::test]
async fn test_unknown_tool_is_method_not_found() {
    let client = connect(Client::builder()).await;
    let err = client.call_tool("third", Map::new()).await.unwrap_err();
    assert!(matches!(err, Error::MethodNotFound(_)), "{:?}", err);
}

#[tokio::test]
async fn test_progress_and_logs_reach_the_client() {
    let logs: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = logs.clone();
    let client = connect(
        Client::builder().on_notification("notifications/message", move |n: JSONRPCNotification| {
            let sink = sink.clone();
            async move {
                sink.lock().unwrap().push(n.params.unwrap_or_default());
                Ok(())
            }
        })
    ).await;

    let mut updates = client.progress().subscribe();
    let result = client.call_tool_with_progress("second", Map::new(), "p-1").await.unwrap();
    assert_eq!(result.first_text(), Some("two"));

    let first = updates.recv().await.unwrap();
    assert_eq!(first.message.as_deref(), Some("half way there"));
    assert_eq!(first.percentage(), Some(0.0));
    let last = updates.recv().await.unwrap();
    assert!(last.is_complete());
    assert_eq!(client.progress().latest(&"p-1".into()).unwrap().progress, 2.0);

    // The log notification arrived before the response, so its handler already ran
    let logs = logs.lock().unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0]["level"], json!("warning"));
    assert_eq!(logs[0]["data"], json!({ "step": 1 }));
}

#[tokio::test]
async fn test_progress_handlers_run_before_the_call_returns() {
    let seen: Arc<Mutex<Vec<f64>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let client = connect(
        Client::builder().on_notification("notifications/progress", move |n: JSONRPCNotification| {
            let sink = sink.clone();
            async move {
                let progress = n.params.unwrap_or_default()["progress"].as_f64().unwrap_or(-1.0);
                sink.lock().unwrap().push(progress);
                Ok(())
            }
        })
    ).await;

    for round in 0..100 {
        seen.lock().unwrap().clear();
        let token = format!("round-{}", round);
        client.call_tool_with_progress("second", Map::new(), token).await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![0.0, 2.0], "round {}", round);
    }
}

#[tokio::test]
async fn test_logging_level() {
    let client = connect(Client::builder()).await;
    let mut all = client.notifications().subscribe();

    client.set_logging_level(LoggingLevel::Error).await.unwrap();
    client.call_tool("second", Map::new()).await.unwrap();
    client.ping().await.unwrap();

    // The warning was filtered and no progress token was given
    assert!(all.try_recv().is_err());
}

#[tokio::test]
async fn test_resources() {
    let client = connect(Client::builder()).await;

    let resources = client.list_resources().await.unwrap();
    assert_eq!(resources.resources[0].uri, "memo://readme");
    let templates = client.list_resource_templates().await.unwrap();
    assert_eq!(templates.resource_templates[0].uri_template, "users://{id}/profile");

    let read = client.read_resource("users://al%20ice/profile").await.unwrap();
    match &read.contents[0] {
        ResourceContents::Text(text) => {
            assert_eq!(text.text, "profile of al ice");
            assert_eq!(text.uri, "users://al%20ice/profile");
        }
        other => panic!("unexpected contents {:?}", other),
    }

    let read = client.read_resource("memo://readme").await.unwrap();
    assert_eq!(read.contents[0].uri(), "memo://readme");

    let err = client.read_resource("memo://missing").await.unwrap_err();
    assert!(matches!(err, Error::ResourceNotFound(_)), "{:?}", err);
}

#[tokio::test]
async fn test_completion() {
    let client = connect(Client::builder()).await;

    let result = client
        .complete(Reference::Resource { uri: "users://{id}/profile".to_string() }, "id", "al").await
        .unwrap();
    assert_eq!(result.completion.values, vec!["alice", "albert"]);
    assert_eq!(result.completion.total, Some(2));

    let result = client
        .complete(Reference::Prompt { name: "summarize".to_string() }, "text", "x").await
        .unwrap();
    assert!(result.completion.values.is_empty());

    let err = client
        .complete(Reference::Prompt { name: "missing".to_string() }, "text", "x").await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidParams(_)), "{:?}", err);
}

#[tokio::test]
async fn test_prompts() {
    let client = connect(Client::builder()).await;

    let prompts = client.list_prompts().await.unwrap();
    assert_eq!(prompts.prompts[0].name, "summarize");

    let mut arguments = HashMap::new();
    arguments.insert("text".to_string(), "a long story".to_string());
    let prompt = client.get_prompt("summarize", Some(arguments)).await.unwrap();
    assert_eq!(prompt.messages[0].content.as_text(), Some("summarize: a long story"));

    let err = client.get_prompt("summarize", None).await.unwrap_err();
    assert!(matches!(err, Error::InvalidParams(_)), "{:?}", err);
}

#[tokio::test]
async fn test_close() {
    let client = connect(Client::builder()).await;
    client.close().await.unwrap();
    assert!(!client.is_connected());

    let err = client.ping().await.unwrap_err();
    assert!(matches!(err, Error::ConnectionClosed), "{:?}", err);
}
