use futures::future::BoxFuture;
use futures::FutureExt;
use jsonschema::JSONSchema;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{ json, Map, Value };
use std::collections::HashMap;
use std::future::Future;
use std::sync::{ Arc, RwLock, RwLockReadGuard, RwLockWriteGuard };
use tracing::{ debug, info, warn };

use crate::protocol::{ CallToolParams, CallToolResult, Error, Tool, ToolAnnotations, ToolsCapability };
use crate::server::context::RequestContext;

/// Boxed future returned by tool handlers
pub type ToolFuture = BoxFuture<'static, Result<CallToolResult, Error>>;

/// Handler type for tools: raw arguments plus the request context
pub type ToolHandler = Arc<dyn (Fn(Map<String, Value>, RequestContext) -> ToolFuture) + Send + Sync>;

/// Arguments of a tool that takes none
#[derive(Debug, Clone, Default, serde::Deserialize, JsonSchema)]
pub struct NoArguments {}

/// The JSON Schema of `T`, as generated by schemars
pub fn schema_of<T>() -> Value where T: JsonSchema {
    let schema = schemars::schema_for!(T);
    serde_json::to_value(schema).unwrap_or_else(|_| json!({ "type": "object" }))
}

impl Tool {
    /// Create a tool descriptor that accepts any object
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: Some(description.into()),
            input_schema: json!({ "type": "object" }),
            output_schema: None,
            annotations: None,
        }
    }

    /// Set the input schema
    pub fn with_input_schema(mut self, schema: Value) -> Self {
        self.input_schema = schema;
        self
    }

    /// Derive the input schema from `A`
    pub fn with_input<A>(self) -> Self where A: JsonSchema {
        self.with_input_schema(schema_of::<A>())
    }

    /// Derive the output schema from `R`
    pub fn with_output<R>(mut self) -> Self where R: JsonSchema {
        self.output_schema = Some(schema_of::<R>());
        self
    }

    /// Attach behavioural hints
    pub fn with_annotations(mut self, annotations: ToolAnnotations) -> Self {
        self.annotations = Some(annotations);
        self
    }
}

/// A registered tool: descriptor, compiled argument validator and handler
pub struct ToolDefinition {
    tool: Tool,
    validator: JSONSchema,
    handler: ToolHandler,
}

impl ToolDefinition {
    fn new(tool: Tool, handler: ToolHandler) -> Result<Self, Error> {
        let validator = JSONSchema::compile(&tool.input_schema).map_err(|e| {
            Error::InvalidParams(format!("Invalid input schema for tool {}: {}", tool.name, e))
        })?;
        Ok(Self { tool, validator, handler })
    }

    pub fn tool(&self) -> &Tool {
        &self.tool
    }

    /// Check arguments against the input schema
    pub fn validate(&self, arguments: &Map<String, Value>) -> Result<(), Error> {
        let instance = Value::Object(arguments.clone());
        if let Err(errors) = self.validator.validate(&instance) {
            let details = errors
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(
                Error::InvalidParams(format!("Invalid arguments for tool {}: {}", self.tool.name, details))
            );
        }
        Ok(())
    }
}

#[derive(Default)]
struct Tools {
    order: Vec<String>,
    by_name: HashMap<String, Arc<ToolDefinition>>,
}

/// Registry of the tools a server offers.
///
/// Tools can be added at startup or while connections are being served.
/// Listing follows registration order.
pub struct ToolRegistry {
    tools: RwLock<Tools>,
    tool_capabilities: ToolsCapability,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new(ToolsCapability::default())
    }
}

impl ToolRegistry {
    pub fn new(tool_capabilities: ToolsCapability) -> Self {
        Self {
            tools: RwLock::new(Tools::default()),
            tool_capabilities,
        }
    }

    pub fn capabilities(&self) -> &ToolsCapability {
        &self.tool_capabilities
    }

    fn read(&self) -> RwLockReadGuard<'_, Tools> {
        self.tools.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tools> {
        self.tools.write().unwrap_or_else(|p| p.into_inner())
    }

    fn insert(&self, definition: ToolDefinition) -> Result<(), Error> {
        let name = definition.tool.name.clone();
        let mut tools = self.write();

        // Prevent duplicate tools
        if tools.by_name.contains_key(&name) {
            return Err(Error::InvalidParams(format!("Tool already exists: {}", name)));
        }

        tools.order.push(name.clone());
        tools.by_name.insert(name.clone(), Arc::new(definition));
        info!("Registered tool {}", name);
        Ok(())
    }

    /// Register a tool that receives its arguments as a JSON object
    pub fn register<F, Fut>(&self, tool: Tool, handler: F) -> Result<(), Error>
        where
            F: Fn(Map<String, Value>, RequestContext) -> Fut + Send + Sync + 'static,
            Fut: Future<Output = Result<CallToolResult, Error>> + Send + 'static
    {
        let handler: ToolHandler = Arc::new(
            move |arguments: Map<String, Value>, ctx: RequestContext| {
                handler(arguments, ctx).boxed()
            }
        );
        self.insert(ToolDefinition::new(tool, handler)?)
    }

    /// Register a tool whose arguments deserialize into `A`.
    ///
    /// The input schema is generated from `A`.
    pub fn register_typed<A, F, Fut>(&self, tool: Tool, handler: F) -> Result<(), Error>
        where
            A: DeserializeOwned + JsonSchema + Send + 'static,
            F: Fn(A, RequestContext) -> Fut + Send + Sync + 'static,
            Fut: Future<Output = Result<CallToolResult, Error>> + Send + 'static
    {
        let handler = Arc::new(handler);
        self.register(tool.with_input::<A>(), move |arguments, ctx| {
            let handler = handler.clone();
            async move {
                let args = parse_arguments::<A>(arguments)?;
                handler(args, ctx).await
            }
        })
    }

    /// Register a tool with structured output.
    ///
    /// Input and output schemas are generated from `A` and `R`; the returned
    /// value becomes `structuredContent` and is mirrored as text content.
    pub fn register_structured<A, R, F, Fut>(&self, tool: Tool, handler: F) -> Result<(), Error>
        where
            A: DeserializeOwned + JsonSchema + Send + 'static,
            R: Serialize + JsonSchema + 'static,
            F: Fn(A, RequestContext) -> Fut + Send + Sync + 'static,
            Fut: Future<Output = Result<R, Error>> + Send + 'static
    {
        let handler = Arc::new(handler);
        self.register(tool.with_input::<A>().with_output::<R>(), move |arguments, ctx| {
            let handler = handler.clone();
            async move {
                let args = parse_arguments::<A>(arguments)?;
                let output = handler(args, ctx).await?;
                Ok(CallToolResult::structured(serde_json::to_value(output)?))
            }
        })
    }

    /// Remove a tool; returns whether it existed
    pub fn unregister(&self, name: &str) -> bool {
        let mut tools = self.write();
        let removed = tools.by_name.remove(name).is_some();
        if removed {
            tools.order.retain(|n| n != name);
            info!("Unregistered tool {}", name);
        }
        removed
    }

    /// All tools in registration order
    pub fn list_tools(&self) -> Vec<Tool> {
        let tools = self.read();
        tools.order
            .iter()
            .filter_map(|name| tools.by_name.get(name))
            .map(|definition| definition.tool.clone())
            .collect()
    }

    pub fn get_tool(&self, name: &str) -> Option<Tool> {
        self.read()
            .by_name.get(name)
            .map(|definition| definition.tool.clone())
    }

    pub fn len(&self) -> usize {
        self.read().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Validate the arguments and run the tool.
    ///
    /// Unknown tools are `MethodNotFound` and bad arguments `InvalidParams`;
    /// any other failure of the handler is reported as an `isError` result.
    pub async fn call_tool(
        &self,
        params: CallToolParams,
        ctx: RequestContext
    ) -> Result<CallToolResult, Error> {
        let definition = self
            .read()
            .by_name.get(&params.name)
            .cloned()
            .ok_or_else(|| Error::MethodNotFound(format!("Unknown tool: {}", params.name)))?;

        let arguments = params.arguments.unwrap_or_default();
        definition.validate(&arguments)?;

        debug!("Calling tool {}", params.name);
        match (definition.handler)(arguments, ctx).await {
            Ok(result) => Ok(result),
            Err(Error::InvalidParams(message)) => Err(Error::InvalidParams(message)),
            Err(e) => {
                warn!("Tool {} failed: {}", params.name, e);
                Ok(CallToolResult::error(e.to_string()))
            }
        }
    }
}

fn parse_arguments<A>(arguments: Map<String, Value>) -> Result<A, Error> where A: DeserializeOwned {
    serde_json::from_value(Value::Object(arguments)).map_err(|e| Error::InvalidParams(e.to_string()))
}
