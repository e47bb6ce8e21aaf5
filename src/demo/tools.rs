//! Arithmetic and callback tools of the demo server.

use rand::Rng;
use schemars::JsonSchema;
use serde::{ Deserialize, Serialize };
use serde_json::{ json, Value };
use std::time::Duration;
use tracing::{ debug, warn };

use crate::protocol::{ CallToolResult, Error, LoggingLevel, Tool, ToolAnnotations };
use crate::server::services::tools::NoArguments;
use crate::server::{ RequestContext, ServerBuilder };

/// Two integer operands
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct Operands {
    /// Left operand
    pub x: i64,
    /// Right operand
    pub y: i64,
}

/// Output of `multiply`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Product {
    pub result: i64,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct HelloArguments {
    /// Who to greet
    pub name: String,
}

/// Schema of the answer `random` asks the user for
pub fn favourite_number_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "number": { "type": "integer" }
        },
        "required": ["number"]
    })
}

fn overflow(op: &str) -> Error {
    Error::ToolExecution(format!("{} overflowed", op))
}

async fn add(args: Operands, _ctx: RequestContext) -> Result<CallToolResult, Error> {
    let sum = args.x.checked_add(args.y).ok_or_else(|| overflow("add"))?;
    Ok(CallToolResult::text(sum.to_string()))
}

async fn multiply(args: Operands, _ctx: RequestContext) -> Result<Product, Error> {
    let result = args.x.checked_mul(args.y).ok_or_else(|| overflow("multiply"))?;
    Ok(Product { result })
}

async fn sub(args: Operands, ctx: RequestContext) -> Result<CallToolResult, Error> {
    ctx.log(LoggingLevel::Info, Some("my-log"), format!("subtract {} - {}", args.x, args.y)).await?;
    let difference = args.x.checked_sub(args.y).ok_or_else(|| overflow("sub"))?;
    Ok(CallToolResult::text(difference.to_string()))
}

async fn divide(args: Operands, ctx: RequestContext) -> Result<CallToolResult, Error> {
    ctx.progress(0.0, Some(1.0), Some("dividing")).await?;
    let quotient = args.x
        .checked_div(args.y)
        .ok_or_else(|| Error::ToolExecution("division by zero".to_string()))?;
    ctx.progress(1.0, Some(1.0), Some("divided")).await?;
    Ok(CallToolResult::text(quotient.to_string()))
}

async fn hello(args: HelloArguments, _ctx: RequestContext) -> Result<CallToolResult, Error> {
    tokio::time::sleep(Duration::from_secs(1)).await;
    Ok(CallToolResult::text(format!("hello, {}", args.name)))
}

fn coin_flip() -> bool {
    rand::thread_rng().gen_bool(0.5)
}

fn random_number() -> i64 {
    rand::thread_rng().gen_range(0..100)
}

/// The `number` field of an accepted answer, as an integer or numeric string
fn number_from(content: &serde_json::Map<String, Value>) -> Option<i64> {
    match content.get("number")? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

async fn random(_args: NoArguments, ctx: RequestContext) -> Result<CallToolResult, Error> {
    if coin_flip() {
        match ctx.elicit("what is your favorite number?", favourite_number_schema()).await {
            Ok(answer) => {
                if let Some(number) = answer.accepted().and_then(number_from) {
                    return Ok(CallToolResult::text(number.to_string()));
                }
                debug!("No usable number elicited ({:?})", answer.action);
            }
            Err(e) => warn!("Elicitation failed, falling back to a random number: {}", e),
        }
    }
    Ok(CallToolResult::text(random_number().to_string()))
}

async fn loud_joke(_args: NoArguments, ctx: RequestContext) -> Result<CallToolResult, Error> {
    if !ctx.supports_sampling() {
        return Ok(CallToolResult::text("NO JOKE"));
    }
    let joke = ctx.sample("Tell me a joke!").await?;
    Ok(CallToolResult::text(joke.to_uppercase()))
}

/// Register the demo tools on `builder`
pub fn register(builder: ServerBuilder) -> ServerBuilder {
    builder
        .with_typed_tool(Tool::new("add", "Add two numbers"), add)
        .with_structured_tool(
            Tool::new("multiply", "Multiply two numbers").with_annotations(ToolAnnotations {
                title: Some("Multiply".to_string()),
                read_only_hint: Some(true),
                destructive_hint: Some(false),
                idempotent_hint: Some(true),
                ..Default::default()
            }),
            multiply
        )
        .with_typed_tool(Tool::new("sub", "Subtract y from x, logging the operation"), sub)
        .with_typed_tool(Tool::new("divide", "Divide x by y, reporting progress"), divide)
        .with_typed_tool(Tool::new("hello", "Greet someone after a short delay"), hello)
        .with_typed_tool(
            Tool::new("random", "A random number, or the user's favourite one"),
            random
        )
        .with_typed_tool(Tool::new("loudJoke", "A joke from the client's model, shouted"), loud_joke)
}
