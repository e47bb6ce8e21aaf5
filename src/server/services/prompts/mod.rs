pub mod manager;

pub use manager::{ PromptFuture, PromptHandler, PromptManager };
