//! The demo client against the demo server over an in-memory connection

use serde_json::{ json, Map, Value };
use std::time::{ Duration, Instant };

use mcp_duplex::client::Client;
use mcp_duplex::demo;
use mcp_duplex::protocol::{ Error, ProgressToken, Reference, ResourceContents };
use mcp_duplex::StreamTransport;

async fn connect() -> Client {
    let server = demo::build_server(demo::server_config()).unwrap();
    let (local, remote) = StreamTransport::pair();
    let _session = server.serve(local);
    demo::client::client_builder().connect(remote).await.unwrap()
}

fn operands(x: i64, y: i64) -> Map<String, Value> {
    let mut arguments = Map::new();
    arguments.insert("x".to_string(), json!(x));
    arguments.insert("y".to_string(), json!(y));
    arguments
}

#[tokio::test]
async fn test_demo_server_info() {
    let client = connect().await;
    assert_eq!(client.server_info().name, "demo-server");
    assert!(client.instructions().is_some());

    let tools = client.list_tools().await.unwrap();
    let names: Vec<&str> = tools.tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["add", "multiply", "sub", "divide", "hello", "random", "loudJoke"]);

    let multiply = &tools.tools[1];
    let annotations = multiply.annotations.as_ref().unwrap();
    assert_eq!(annotations.title.as_deref(), Some("Multiply"));
    assert_eq!(annotations.read_only_hint, Some(true));
    assert!(multiply.output_schema.is_some());

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_demo_arithmetic() {
    let client = connect().await;

    let sum = client.call_tool("add", operands(1, 2)).await.unwrap();
    assert_eq!(sum.first_text(), Some("3"));

    let product = client.call_tool("multiply", operands(2, 3)).await.unwrap();
    assert_eq!(product.structured_content, Some(json!({ "result": 6 })));

    let difference = client.call_tool("sub", operands(5, 7)).await.unwrap();
    assert_eq!(difference.first_text(), Some("-2"));

    let mut notifications = client.notifications().subscribe();
    let difference = client.call_tool("sub", operands(10, 4)).await.unwrap();
    assert_eq!(difference.first_text(), Some("6"));
    let log = notifications.try_recv().unwrap();
    assert_eq!(log.method, "notifications/message");
    let params = log.params.unwrap();
    assert_eq!(params["level"], json!("info"));
    assert_eq!(params["logger"], json!("my-log"));
    assert_eq!(params["data"], json!("subtract 10 - 4"));

    let by_zero = client.call_tool("divide", operands(1, 0)).await.unwrap();
    assert!(by_zero.is_error());

    let err = client.call_tool("add", Map::new()).await.unwrap_err();
    assert!(matches!(err, Error::InvalidParams(_)), "{:?}", err);
}

#[tokio::test]
async fn test_demo_hello_waits_before_answering() {
    let client = connect().await;
    let mut arguments = Map::new();
    arguments.insert("name".to_string(), json!("Ada"));

    let started = Instant::now();
    let greeting = client.call_tool("hello", arguments).await.unwrap();
    assert!(started.elapsed() >= Duration::from_secs(1));
    assert_eq!(greeting.first_text(), Some("hello, Ada"));
}

#[tokio::test]
async fn test_demo_divide_reports_progress() {
    let client = connect().await;
    let mut updates = client.progress().subscribe();

    let quotient = client.call_tool_with_progress("divide", operands(10, 2), "0").await.unwrap();
    assert_eq!(quotient.first_text(), Some("5"));

    let first = updates.recv().await.unwrap();
    assert_eq!(first.progress, 0.0);
    assert_eq!(first.message.as_deref(), Some("dividing"));
    let last = updates.recv().await.unwrap();
    assert!(last.is_complete());
    assert_eq!(client.progress().latest(&ProgressToken::from("0")).unwrap().progress, 1.0);
}

#[tokio::test]
async fn test_demo_callbacks() {
    let client = connect().await;

    let joke = client.call_tool("loudJoke", Map::new()).await.unwrap();
    assert_eq!(joke.first_text(), Some("YOU'RE ABSOLUTELY RIGHT!"));

    for _ in 0..5 {
        let random = client.call_tool("random", Map::new()).await.unwrap();
        let number: i64 = random.first_text().unwrap().parse().unwrap();
        assert!(number == demo::client::FAVOURITE_NUMBER || (0..100).contains(&number));
    }
}

#[tokio::test]
async fn test_demo_resources_and_prompts() {
    let client = connect().await;

    let templates = client.list_resource_templates().await.unwrap();
    assert_eq!(templates.resource_templates[0].uri_template, demo::resources::CONFIG_TEMPLATE);

    let config = client.read_resource("config://foobar").await.unwrap();
    match &config.contents[0] {
        ResourceContents::Text(text) => assert_eq!(text.text, "raboof"),
        other => panic!("unexpected contents {:?}", other),
    }

    let completion = client
        .complete(Reference::Resource { uri: demo::resources::CONFIG_TEMPLATE.to_string() }, "key", "a").await
        .unwrap();
    assert_eq!(completion.completion.values, vec!["asdf"]);

    let completion = client
        .complete(Reference::Prompt { name: "greeting".to_string() }, "name", "j").await
        .unwrap();
    assert_eq!(completion.completion.values, vec!["James", "Josh"]);

    let mut arguments = std::collections::HashMap::new();
    arguments.insert("name".to_string(), "James".to_string());
    let prompt = client.get_prompt("greeting", Some(arguments)).await.unwrap();
    assert_eq!(prompt.messages[0].content.as_text(), Some("hello, James"));

    let prompt = client.get_prompt("greeting", None).await.unwrap();
    assert_eq!(prompt.messages[0].content.as_text(), Some("hello, world"));
}

#[tokio::test]
async fn test_demo_client_run() {
    let client = connect().await;
    demo::client::run(&client).await.unwrap();

    let err = client.call_tool("nope", Map::new()).await.unwrap_err();
    assert!(matches!(err, Error::MethodNotFound(_)), "{:?}", err);
    client.close().await.unwrap();
}
