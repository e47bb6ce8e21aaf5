//! The demo client: answers callbacks and walks through every server feature.

use serde_json::{ json, Map, Value };
use std::collections::HashMap;

use crate::client::{ Client, ClientBuilder };
use crate::protocol::{
    CallToolResult,
    Content,
    CreateMessageParams,
    CreateMessageResult,
    ElicitRequestParams,
    ElicitResult,
    Error,
    JSONRPCNotification,
    Method,
    ProgressParams,
    Reference,
    ResourceContents,
    Role,
};
use crate::demo::resources::CONFIG_TEMPLATE;

/// The number the demo user always gives
pub const FAVOURITE_NUMBER: i64 = 12345;

/// What the demo "model" answers to every sampling request
pub const SAMPLED_TEXT: &str = "You're absolutely right!";

pub async fn answer_elicitation(params: ElicitRequestParams) -> Result<ElicitResult, Error> {
    println!("Server has elicited: {}", params.message);
    let mut content = Map::new();
    content.insert("number".to_string(), json!(FAVOURITE_NUMBER));
    Ok(ElicitResult::accept(content))
}

pub async fn answer_sampling(params: CreateMessageParams) -> Result<CreateMessageResult, Error> {
    let prompt = params.messages
        .first()
        .and_then(|m| m.content.as_text())
        .unwrap_or_default()
        .to_string();
    println!("Server asked to sample: {}", prompt);
    Ok(CreateMessageResult {
        role: Role::Assistant,
        content: Content::text(SAMPLED_TEXT),
        model: "demo-model".to_string(),
        stop_reason: Some("endTurn".to_string()),
    })
}

async fn print_progress(notification: JSONRPCNotification) -> Result<(), Error> {
    let params: ProgressParams = notification.parse_params()?;
    let percentage = match params.total {
        Some(total) if total > 0.0 => (params.progress / total) * 100.0,
        _ => params.progress * 100.0,
    };
    println!("Progress: {:.2}% - {}", percentage, params.message.unwrap_or_default());
    Ok(())
}

/// A builder with the demo callback handlers and progress printing installed
pub fn client_builder() -> ClientBuilder {
    Client::builder()
        .with_client_name("demo-client")
        .with_elicitation_handler(answer_elicitation)
        .with_sampling_handler(answer_sampling)
        .on_notification(Method::NotificationsProgress.as_str(), print_progress)
}

fn operands(x: i64, y: i64) -> Map<String, Value> {
    let mut arguments = Map::new();
    arguments.insert("x".to_string(), json!(x));
    arguments.insert("y".to_string(), json!(y));
    arguments
}

fn describe(result: &CallToolResult) -> String {
    let text = result.first_text().unwrap_or_default();
    if result.is_error() { format!("error: {}", text) } else { text.to_string() }
}

/// Run every demo interaction against a connected server
pub async fn run(client: &Client) -> Result<(), Error> {
    let info = client.server_info();
    println!("Connected to {} {}", info.name, info.version);
    println!("Server capabilities: {}", serde_json::to_string(client.server_capabilities())?);

    let tools = client.list_tools().await?;
    let names: Vec<&str> = tools.tools.iter().map(|t| t.name.as_str()).collect();
    println!("Tools: {}", names.join(", "));

    let result = client.call_tool("add", operands(1, 2)).await?;
    println!("result of add = {}", describe(&result));

    let result = client.call_tool("multiply", operands(2, 3)).await?;
    let structured = result.structured_content.clone().unwrap_or(Value::Null);
    println!("result of multiple = {}", structured);

    let result = client.call_tool("sub", operands(5, 3)).await?;
    println!("result of sub = {}", describe(&result));

    let result = client.call_tool_with_progress("divide", operands(10, 2), "0").await?;
    println!("result of divide = {}", describe(&result));

    for _ in 0..5 {
        let result = client.call_tool("random", Map::new()).await?;
        println!("random = {}", describe(&result));
    }

    let result = client.call_tool("loudJoke", Map::new()).await?;
    println!("joke = {}", describe(&result));

    let templates = client.list_resource_templates().await?;
    for template in &templates.resource_templates {
        println!("Resource template: {} ({})", template.uri_template, template.name);
    }

    let resource = client.read_resource("config://foobar").await?;
    for contents in &resource.contents {
        if let ResourceContents::Text(text) = contents {
            println!("{} = {}", text.uri, text.text);
        }
    }

    let completion = client.complete(
        Reference::Resource { uri: CONFIG_TEMPLATE.to_string() },
        "key",
        "a"
    ).await?;
    println!("Completions for key 'a': {:?}", completion.completion.values);

    let mut arguments = HashMap::new();
    arguments.insert("name".to_string(), "James".to_string());
    let prompt = client.get_prompt("greeting", Some(arguments)).await?;
    for message in &prompt.messages {
        println!("Prompt message: {}", message.content.as_text().unwrap_or_default());
    }

    Ok(())
}
