//! The `config://{key}` resource template.

use crate::protocol::{ Error, ReadResourceResult, ResourceContents, ResourceTemplate };
use crate::server::services::completion::prefix_completion;
use crate::server::services::resources::ResourceRequest;
use crate::server::{ RequestContext, ServerBuilder };

pub const CONFIG_TEMPLATE: &str = "config://{key}";

/// Keys offered when completing `key`
pub const CONFIG_KEYS: [&str; 2] = ["asdf", "zxcv"];

async fn read_config(request: ResourceRequest, _ctx: RequestContext) -> Result<ReadResourceResult, Error> {
    let key = request
        .variable("key")
        .ok_or_else(|| Error::InvalidParams(format!("No key in {}", request.uri)))?;
    let value: String = key.chars().rev().collect();
    Ok(ReadResourceResult {
        contents: vec![ResourceContents::text(request.uri.clone(), value)],
    })
}

pub fn register(builder: ServerBuilder) -> ServerBuilder {
    builder.with_resource_template(
        ResourceTemplate::new(CONFIG_TEMPLATE, "Configuration")
            .with_description("Provides configuration data")
            .with_mime_type("text/plain"),
        read_config,
        Some(prefix_completion(CONFIG_KEYS, false))
    )
}
