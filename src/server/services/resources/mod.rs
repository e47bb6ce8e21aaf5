pub mod resource_registry;
pub mod uri_template;

pub use resource_registry::{ ResourceFuture, ResourceHandler, ResourceRegistry, ResourceRequest };
pub use uri_template::UriTemplate;
