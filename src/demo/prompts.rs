//! The `greeting` prompt.

use std::collections::HashMap;

use crate::protocol::{ Error, GetPromptResult, Prompt, PromptArgument, PromptMessage };
use crate::server::services::completion::prefix_completion;
use crate::server::{ RequestContext, ServerBuilder };

/// Names offered when completing `name`
pub const NAMES: [&str; 2] = ["James", "Josh"];

async fn greeting(arguments: HashMap<String, String>, _ctx: RequestContext) -> Result<GetPromptResult, Error> {
    let name = arguments.get("name").map(String::as_str).unwrap_or("world");
    Ok(GetPromptResult {
        description: Some("Greet the user".to_string()),
        messages: vec![PromptMessage::user_text(format!("hello, {}", name))],
    })
}

pub fn register(builder: ServerBuilder) -> ServerBuilder {
    builder.with_prompt(
        Prompt::new("greeting", "Greet the user").with_argument(
            PromptArgument::optional("name", "Who to greet")
        ),
        greeting,
        Some(prefix_completion(NAMES, true))
    )
}
