use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{ Arc, RwLock, RwLockReadGuard, RwLockWriteGuard };
use tracing::{ debug, info };

use crate::protocol::{
    CompleteArgument,
    CompleteResult,
    Content,
    Error,
    GetPromptResult,
    Prompt,
    PromptArgument,
    PromptMessage,
    PromptsCapability,
    Role,
};
use crate::server::context::RequestContext;
use crate::server::services::completion::{ complete_with, CompletionHandler };

impl Prompt {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: Some(description.into()),
            arguments: None,
        }
    }

    /// Declare an argument the prompt accepts
    pub fn with_argument(mut self, argument: PromptArgument) -> Self {
        self.arguments.get_or_insert_with(Vec::new).push(argument);
        self
    }
}

impl PromptArgument {
    pub fn required(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: Some(description.into()),
            required: Some(true),
        }
    }

    pub fn optional(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: Some(description.into()),
            required: Some(false),
        }
    }
}

impl PromptMessage {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Content::text(text),
        }
    }

    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: Content::text(text),
        }
    }
}

pub type PromptFuture = BoxFuture<'static, Result<GetPromptResult, Error>>;

/// Renders a prompt from its string arguments
pub type PromptHandler = Arc<
    dyn (Fn(HashMap<String, String>, RequestContext) -> PromptFuture) + Send + Sync
>;

struct PromptEntry {
    prompt: Prompt,
    handler: PromptHandler,
    completion: Option<CompletionHandler>,
}

#[derive(Default)]
struct Prompts {
    order: Vec<String>,
    by_name: HashMap<String, Arc<PromptEntry>>,
}

/// Manager for prompt templates
pub struct PromptManager {
    prompts: RwLock<Prompts>,
    capabilities: PromptsCapability,
}

impl Default for PromptManager {
    fn default() -> Self {
        Self::new(PromptsCapability::default())
    }
}

impl PromptManager {
    /// Create a new prompt manager
    pub fn new(capabilities: PromptsCapability) -> Self {
        Self {
            prompts: RwLock::new(Prompts::default()),
            capabilities,
        }
    }

    pub fn capabilities(&self) -> &PromptsCapability {
        &self.capabilities
    }

    fn read(&self) -> RwLockReadGuard<'_, Prompts> {
        self.prompts.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Prompts> {
        self.prompts.write().unwrap_or_else(|p| p.into_inner())
    }

    /// Add a prompt to the manager
    pub fn register_prompt<F, Fut>(&self, prompt: Prompt, handler: F) -> Result<(), Error>
        where
            F: Fn(HashMap<String, String>, RequestContext) -> Fut + Send + Sync + 'static,
            Fut: Future<Output = Result<GetPromptResult, Error>> + Send + 'static
    {
        self.insert(prompt, handler, None)
    }

    /// Add a prompt whose arguments can be completed
    pub fn register_prompt_with_completion<F, Fut>(
        &self,
        prompt: Prompt,
        handler: F,
        completion: CompletionHandler
    )
        -> Result<(), Error>
        where
            F: Fn(HashMap<String, String>, RequestContext) -> Fut + Send + Sync + 'static,
            Fut: Future<Output = Result<GetPromptResult, Error>> + Send + 'static
    {
        self.insert(prompt, handler, Some(completion))
    }

    fn insert<F, Fut>(
        &self,
        prompt: Prompt,
        handler: F,
        completion: Option<CompletionHandler>
    )
        -> Result<(), Error>
        where
            F: Fn(HashMap<String, String>, RequestContext) -> Fut + Send + Sync + 'static,
            Fut: Future<Output = Result<GetPromptResult, Error>> + Send + 'static
    {
        let name = prompt.name.clone();
        let mut prompts = self.write();

        if prompts.by_name.contains_key(&name) {
            return Err(Error::InvalidParams(format!("Prompt already exists: {}", name)));
        }

        let handler: PromptHandler = Arc::new(
            move |arguments: HashMap<String, String>, ctx: RequestContext| {
                handler(arguments, ctx).boxed()
            }
        );
        prompts.order.push(name.clone());
        prompts.by_name.insert(name.clone(), Arc::new(PromptEntry { prompt, handler, completion }));
        info!("Registered prompt {}", name);
        Ok(())
    }

    /// All prompts in registration order
    pub fn list_prompts(&self) -> Vec<Prompt> {
        let prompts = self.read();
        prompts.order
            .iter()
            .filter_map(|name| prompts.by_name.get(name))
            .map(|entry| entry.prompt.clone())
            .collect()
    }

    fn entry(&self, name: &str) -> Result<Arc<PromptEntry>, Error> {
        self.read()
            .by_name.get(name)
            .cloned()
            .ok_or_else(|| Error::PromptNotFound(name.to_string()))
    }

    /// Render a prompt by name with the provided arguments
    pub async fn get_prompt(
        &self,
        name: &str,
        arguments: Option<HashMap<String, String>>,
        ctx: RequestContext
    ) -> Result<GetPromptResult, Error> {
        let entry = self.entry(name)?;
        let arguments = arguments.unwrap_or_default();

        // Validate required arguments
        for expected in entry.prompt.arguments.iter().flatten() {
            if expected.required == Some(true) && !arguments.contains_key(&expected.name) {
                return Err(
                    Error::InvalidParams(format!("Missing required argument: {}", expected.name))
                );
            }
        }

        debug!("Rendering prompt: {}", name);
        (entry.handler)(arguments, ctx).await
    }

    /// Complete an argument of the prompt `name`
    pub async fn complete(&self, name: &str, argument: CompleteArgument) -> Result<CompleteResult, Error> {
        let entry = self.entry(name)?;
        let declared = entry.prompt.arguments
            .iter()
            .flatten()
            .any(|a| a.name == argument.name);
        let completion = if declared { entry.completion.clone() } else { None };
        complete_with(completion, argument).await
    }
}
