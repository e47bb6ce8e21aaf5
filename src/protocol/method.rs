//! Type-safe definitions for the protocol method identifiers.

use serde::{ Deserialize, Serialize };
use std::fmt::{ self, Display };
use std::str::FromStr;

use crate::protocol::Error;

/// The methods this crate speaks, in both directions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Method {
    /// Session handshake
    #[serde(rename = "initialize")]
    Initialize,

    /// Liveness check, either direction
    #[serde(rename = "ping")]
    Ping,

    /// Sent by the client once the handshake has completed
    #[serde(rename = "notifications/initialized")]
    NotificationsInitialized,

    /// Progress update notification
    #[serde(rename = "notifications/progress")]
    NotificationsProgress,

    /// Request cancellation notification
    #[serde(rename = "notifications/cancelled")]
    NotificationsCancelled,

    /// Log message notification
    #[serde(rename = "notifications/message")]
    NotificationsMessage,

    #[serde(rename = "tools/list")]
    ToolsList,

    #[serde(rename = "tools/call")]
    ToolsCall,

    #[serde(rename = "resources/list")]
    ResourcesList,

    #[serde(rename = "resources/templates/list")]
    ResourcesTemplatesList,

    #[serde(rename = "resources/read")]
    ResourcesRead,

    #[serde(rename = "prompts/list")]
    PromptsList,

    #[serde(rename = "prompts/get")]
    PromptsGet,

    /// Argument completion for prompts and resource templates
    #[serde(rename = "completion/complete")]
    CompletionComplete,

    /// Set the minimum level of forwarded log messages
    #[serde(rename = "logging/setLevel")]
    LoggingSetLevel,

    /// Ask the user for structured input
    #[serde(rename = "elicitation/create")]
    ElicitationCreate,

    /// Ask the client's model for a completion
    #[serde(rename = "sampling/createMessage")]
    SamplingCreateMessage,
}

/// Which side may originate a method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodDirection {
    ClientToServer,
    ServerToClient,
    Bidirectional,
}

impl Method {
    /// Get the string representation of the method
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Initialize => "initialize",
            Method::Ping => "ping",
            Method::NotificationsInitialized => "notifications/initialized",
            Method::NotificationsProgress => "notifications/progress",
            Method::NotificationsCancelled => "notifications/cancelled",
            Method::NotificationsMessage => "notifications/message",
            Method::ToolsList => "tools/list",
            Method::ToolsCall => "tools/call",
            Method::ResourcesList => "resources/list",
            Method::ResourcesTemplatesList => "resources/templates/list",
            Method::ResourcesRead => "resources/read",
            Method::PromptsList => "prompts/list",
            Method::PromptsGet => "prompts/get",
            Method::CompletionComplete => "completion/complete",
            Method::LoggingSetLevel => "logging/setLevel",
            Method::ElicitationCreate => "elicitation/create",
            Method::SamplingCreateMessage => "sampling/createMessage",
        }
    }

    /// Check if this method is a notification
    pub fn is_notification(&self) -> bool {
        matches!(
            self,
            Method::NotificationsInitialized |
                Method::NotificationsProgress |
                Method::NotificationsCancelled |
                Method::NotificationsMessage
        )
    }

    /// Determines if the method is client-to-server, server-to-client, or bidirectional
    pub fn direction(&self) -> MethodDirection {
        match self {
            | Method::Initialize
            | Method::NotificationsInitialized
            | Method::ToolsList
            | Method::ToolsCall
            | Method::ResourcesList
            | Method::ResourcesTemplatesList
            | Method::ResourcesRead
            | Method::PromptsList
            | Method::PromptsGet
            | Method::CompletionComplete
            | Method::LoggingSetLevel => MethodDirection::ClientToServer,

            | Method::NotificationsMessage
            | Method::ElicitationCreate
            | Method::SamplingCreateMessage => MethodDirection::ServerToClient,

            | Method::Ping
            | Method::NotificationsProgress
            | Method::NotificationsCancelled => MethodDirection::Bidirectional,
        }
    }
}

impl Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let method = match s {
            "initialize" => Method::Initialize,
            "ping" => Method::Ping,
            "notifications/initialized" => Method::NotificationsInitialized,
            "notifications/progress" => Method::NotificationsProgress,
            "notifications/cancelled" => Method::NotificationsCancelled,
            "notifications/message" => Method::NotificationsMessage,
            "tools/list" => Method::ToolsList,
            "tools/call" => Method::ToolsCall,
            "resources/list" => Method::ResourcesList,
            "resources/templates/list" => Method::ResourcesTemplatesList,
            "resources/read" => Method::ResourcesRead,
            "prompts/list" => Method::PromptsList,
            "prompts/get" => Method::PromptsGet,
            "completion/complete" => Method::CompletionComplete,
            "logging/setLevel" => Method::LoggingSetLevel,
            "elicitation/create" => Method::ElicitationCreate,
            "sampling/createMessage" => Method::SamplingCreateMessage,
            other => {
                return Err(Error::MethodNotFound(other.to_string()));
            }
        };
        Ok(method)
    }
}
