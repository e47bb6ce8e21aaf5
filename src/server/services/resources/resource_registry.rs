//! Resource registry
//!
//! Holds static resources (exact URI) and resource templates. Reads resolve
//! an exact static URI first, then the most specific matching template.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{ Arc, RwLock, RwLockReadGuard, RwLockWriteGuard };
use tracing::{ debug, info };

use crate::protocol::{
    CompleteArgument,
    CompleteResult,
    Error,
    ReadResourceResult,
    Resource,
    ResourceTemplate,
    ResourcesCapability,
};
use crate::server::context::RequestContext;
use crate::server::services::completion::{ complete_with, CompletionHandler };
use crate::server::services::resources::uri_template::UriTemplate;

/// A read request after URI resolution
#[derive(Debug, Clone)]
pub struct ResourceRequest {
    /// The URI as requested
    pub uri: String,

    /// Decoded placeholder values; empty for static resources
    pub variables: HashMap<String, String>,
}

impl ResourceRequest {
    pub fn variable(&self, name: &str) -> Option<&str> {
        self.variables.get(name).map(String::as_str)
    }
}

impl Resource {
    pub fn new(uri: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            name: name.into(),
            description: None,
            mime_type: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }
}

impl ResourceTemplate {
    pub fn new(uri_template: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            uri_template: uri_template.into(),
            name: name.into(),
            description: None,
            mime_type: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }
}

pub type ResourceFuture = BoxFuture<'static, Result<ReadResourceResult, Error>>;

/// Handler type for reading resources
pub type ResourceHandler = Arc<
    dyn (Fn(ResourceRequest, RequestContext) -> ResourceFuture) + Send + Sync
>;

struct StaticResource {
    resource: Resource,
    handler: ResourceHandler,
}

struct TemplateResource {
    descriptor: ResourceTemplate,
    template: UriTemplate,
    handler: ResourceHandler,
    completion: Option<CompletionHandler>,
}

#[derive(Default)]
struct Resources {
    statics: Vec<StaticResource>,
    templates: Vec<TemplateResource>,
}

/// Registry of resources and resource templates
pub struct ResourceRegistry {
    resources: RwLock<Resources>,
    capabilities: ResourcesCapability,
}

impl Default for ResourceRegistry {
    fn default() -> Self {
        Self::new(ResourcesCapability::default())
    }
}

fn boxed_handler<F, Fut>(handler: F) -> ResourceHandler
    where
        F: Fn(ResourceRequest, RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ReadResourceResult, Error>> + Send + 'static
{
    Arc::new(move |request: ResourceRequest, ctx: RequestContext| handler(request, ctx).boxed())
}

impl ResourceRegistry {
    /// Create a new resource registry
    pub fn new(capabilities: ResourcesCapability) -> Self {
        Self {
            resources: RwLock::new(Resources::default()),
            capabilities,
        }
    }

    pub fn capabilities(&self) -> &ResourcesCapability {
        &self.capabilities
    }

    fn read(&self) -> RwLockReadGuard<'_, Resources> {
        self.resources.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Resources> {
        self.resources.write().unwrap_or_else(|p| p.into_inner())
    }

    /// Register a resource with a fixed URI
    pub fn register_resource<F, Fut>(&self, resource: Resource, handler: F) -> Result<(), Error>
        where
            F: Fn(ResourceRequest, RequestContext) -> Fut + Send + Sync + 'static,
            Fut: Future<Output = Result<ReadResourceResult, Error>> + Send + 'static
    {
        let mut resources = self.write();
        if resources.statics.iter().any(|r| r.resource.uri == resource.uri) {
            return Err(Error::InvalidParams(format!("Resource already exists: {}", resource.uri)));
        }

        info!("Registered resource {}", resource.uri);
        resources.statics.push(StaticResource {
            resource,
            handler: boxed_handler(handler),
        });
        Ok(())
    }

    /// Register a resource template
    pub fn register_template<F, Fut>(&self, descriptor: ResourceTemplate, handler: F) -> Result<(), Error>
        where
            F: Fn(ResourceRequest, RequestContext) -> Fut + Send + Sync + 'static,
            Fut: Future<Output = Result<ReadResourceResult, Error>> + Send + 'static
    {
        self.insert_template(descriptor, boxed_handler(handler), None)
    }

    /// Register a resource template together with a completion handler for its placeholders
    pub fn register_template_with_completion<F, Fut>(
        &self,
        descriptor: ResourceTemplate,
        handler: F,
        completion: CompletionHandler
    )
        -> Result<(), Error>
        where
            F: Fn(ResourceRequest, RequestContext) -> Fut + Send + Sync + 'static,
            Fut: Future<Output = Result<ReadResourceResult, Error>> + Send + 'static
    {
        self.insert_template(descriptor, boxed_handler(handler), Some(completion))
    }

    fn insert_template(
        &self,
        descriptor: ResourceTemplate,
        handler: ResourceHandler,
        completion: Option<CompletionHandler>
    ) -> Result<(), Error> {
        let template = UriTemplate::parse(&descriptor.uri_template)?;

        let mut resources = self.write();
        if resources.templates.iter().any(|t| t.descriptor.uri_template == descriptor.uri_template) {
            return Err(
                Error::InvalidParams(format!("Resource template already exists: {}", descriptor.uri_template))
            );
        }

        info!("Registered resource template {}", descriptor.uri_template);
        resources.templates.push(TemplateResource {
            descriptor,
            template,
            handler,
            completion,
        });
        Ok(())
    }

    /// Static resources in registration order
    pub fn list_resources(&self) -> Vec<Resource> {
        self.read()
            .statics.iter()
            .map(|r| r.resource.clone())
            .collect()
    }

    /// Resource templates in registration order
    pub fn list_templates(&self) -> Vec<ResourceTemplate> {
        self.read()
            .templates.iter()
            .map(|t| t.descriptor.clone())
            .collect()
    }

    /// Find the handler for `uri` and the placeholder values it binds
    fn resolve(&self, uri: &str) -> Option<(ResourceHandler, ResourceRequest)> {
        let resources = self.read();

        if let Some(found) = resources.statics.iter().find(|r| r.resource.uri == uri) {
            return Some((
                found.handler.clone(),
                ResourceRequest {
                    uri: uri.to_string(),
                    variables: HashMap::new(),
                },
            ));
        }

        // Registration order breaks ties, so keep the first of equally specific matches.
        let mut best: Option<(&TemplateResource, HashMap<String, String>)> = None;
        for candidate in &resources.templates {
            let Some(variables) = candidate.template.match_uri(uri) else {
                continue;
            };
            let better = match &best {
                None => true,
                Some((current, _)) => candidate.template.specificity_cmp(&current.template).is_lt(),
            };
            if better {
                best = Some((candidate, variables));
            }
        }

        best.map(|(found, variables)| {
            debug!("Resolved {} via template {}", uri, found.template.as_str());
            (
                found.handler.clone(),
                ResourceRequest {
                    uri: uri.to_string(),
                    variables,
                },
            )
        })
    }

    /// Read a resource
    pub async fn read_resource(
        &self,
        uri: &str,
        ctx: RequestContext
    ) -> Result<ReadResourceResult, Error> {
        let (handler, request) = self
            .resolve(uri)
            .ok_or_else(|| Error::ResourceNotFound(uri.to_string()))?;
        handler(request, ctx).await
    }

    /// Complete a placeholder of the template registered as `uri_template`
    pub async fn complete(
        &self,
        uri_template: &str,
        argument: CompleteArgument
    ) -> Result<CompleteResult, Error> {
        let completion = {
            let resources = self.read();
            let found = resources.templates
                .iter()
                .find(|t| t.descriptor.uri_template == uri_template)
                .ok_or_else(|| Error::ResourceNotFound(uri_template.to_string()))?;
            found.completion.clone()
        };
        complete_with(completion, argument).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ResourceContents;
    use crate::server::services::completion::prefix_completion;

    fn reply(text: String, uri: String) -> Result<ReadResourceResult, Error> {
        Ok(ReadResourceResult {
            contents: vec![ResourceContents::text(uri, text)],
        })
    }

    fn text_of(result: &ReadResourceResult) -> &str {
        match &result.contents[0] {
            ResourceContents::Text(text) => &text.text,
            ResourceContents::Blob(_) => panic!("expected text contents"),
        }
    }

    fn registry() -> ResourceRegistry {
        let registry = ResourceRegistry::default();
        registry
            .register_template(ResourceTemplate::new("file:///{path}", "any"), |request, _ctx| async move {
                reply(format!("generic {}", request.variable("path").unwrap_or("")), request.uri)
            })
            .unwrap();
        registry
            .register_template(ResourceTemplate::new("file:///logs/{name}", "logs"), |request, _ctx| async move {
                reply(format!("log {}", request.variable("name").unwrap_or("")), request.uri)
            })
            .unwrap();
        registry
            .register_resource(Resource::new("file:///logs/latest", "latest"), |request, _ctx| async move {
                reply("static".to_string(), request.uri)
            })
            .unwrap();
        registry
    }

    #[tokio::test]
    async fn test_static_resource_wins() {
        let registry = registry();
        let (ctx, _remote) = RequestContext::detached("resources/read");
        let result = registry.read_resource("file:///logs/latest", ctx).await.unwrap();
        assert_eq!(text_of(&result), "static");
    }

    #[tokio::test]
    async fn test_most_specific_template_wins() {
        let registry = registry();
        let (ctx, _remote) = RequestContext::detached("resources/read");
        let result = registry.read_resource("file:///logs/today", ctx.clone()).await.unwrap();
        assert_eq!(text_of(&result), "log today");

        let result = registry.read_resource("file:///readme", ctx).await.unwrap();
        assert_eq!(text_of(&result), "generic readme");
    }

    #[tokio::test]
    async fn test_unknown_uri() {
        let registry = registry();
        let (ctx, _remote) = RequestContext::detached("resources/read");
        let err = registry.read_resource("http://example.com", ctx).await.unwrap_err();
        assert!(matches!(err, Error::ResourceNotFound(uri) if uri == "http://example.com"));
    }

    #[test]
    fn test_listing_and_duplicates() {
        let registry = registry();
        let templates: Vec<String> = registry
            .list_templates()
            .into_iter()
            .map(|t| t.uri_template)
            .collect();
        assert_eq!(templates, vec!["file:///{path}", "file:///logs/{name}"]);
        assert_eq!(registry.list_resources().len(), 1);

        let duplicate = registry.register_template(
            ResourceTemplate::new("file:///{path}", "again"),
            |request, _ctx| async move { reply(String::new(), request.uri) }
        );
        assert!(matches!(duplicate, Err(Error::InvalidParams(_))));

        let invalid = registry.register_template(
            ResourceTemplate::new("file:///{path", "broken"),
            |request, _ctx| async move { reply(String::new(), request.uri) }
        );
        assert!(matches!(invalid, Err(Error::InvalidParams(_))));
    }

    #[tokio::test]
    async fn test_template_completion() {
        let registry = ResourceRegistry::default();
        registry
            .register_template_with_completion(
                ResourceTemplate::new("config://{key}", "Configuration"),
                |request, _ctx| async move { reply(String::new(), request.uri) },
                prefix_completion(["asdf", "zxcv"], false)
            )
            .unwrap();

        let argument = CompleteArgument {
            name: "key".to_string(),
            value: "z".to_string(),
        };
        let result = registry.complete("config://{key}", argument.clone()).await.unwrap();
        assert_eq!(result.completion.values, vec!["zxcv"]);

        let missing = registry.complete("other://{key}", argument).await;
        assert!(matches!(missing, Err(Error::ResourceNotFound(_))));
    }
}
