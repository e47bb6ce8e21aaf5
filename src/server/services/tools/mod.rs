pub mod tool_registry;

pub use tool_registry::{ schema_of, NoArguments, ToolDefinition, ToolFuture, ToolHandler, ToolRegistry };
