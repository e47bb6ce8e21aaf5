//! Service provider for server components
//!
//! The service provider is the registry of everything a server offers. It is
//! shared by every connection the server accepts.

pub mod completion;
pub mod prompts;
pub mod resources;
pub mod tools;

use std::sync::Arc;

use crate::protocol::{ CompleteParams, CompleteResult, Error, Reference, ServerCapabilities };
use crate::server::services::prompts::PromptManager;
use crate::server::services::resources::ResourceRegistry;
use crate::server::services::tools::ToolRegistry;

/// Service provider for server handlers
#[derive(Clone, Default)]
pub struct ServiceProvider {
    resource_registry: Arc<ResourceRegistry>,
    tool_registry: Arc<ToolRegistry>,
    prompt_manager: Arc<PromptManager>,
}

impl ServiceProvider {
    /// Create a new service provider
    pub fn new(
        resource_registry: Arc<ResourceRegistry>,
        tool_registry: Arc<ToolRegistry>,
        prompt_manager: Arc<PromptManager>
    ) -> Self {
        Self {
            resource_registry,
            tool_registry,
            prompt_manager,
        }
    }

    pub fn resource_registry(&self) -> &ResourceRegistry {
        &self.resource_registry
    }

    pub fn tool_registry(&self) -> &ToolRegistry {
        &self.tool_registry
    }

    pub fn prompt_manager(&self) -> &PromptManager {
        &self.prompt_manager
    }

    /// Capabilities advertised in the `initialize` result
    pub fn capabilities(&self) -> ServerCapabilities {
        ServerCapabilities {
            tools: Some(self.tool_registry.capabilities().clone()),
            resources: Some(self.resource_registry.capabilities().clone()),
            prompts: Some(self.prompt_manager.capabilities().clone()),
            logging: Some(Default::default()),
            completions: Some(Default::default()),
        }
    }

    /// Route `completion/complete` to the referenced prompt or template
    pub async fn complete(&self, params: CompleteParams) -> Result<CompleteResult, Error> {
        match params.reference {
            Reference::Prompt { name } => self.prompt_manager.complete(&name, params.argument).await,
            Reference::Resource { uri } =>
                self.resource_registry.complete(&uri, params.argument).await,
        }
    }
}
