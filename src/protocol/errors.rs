//! Error handling for the protocol core
//!
//! This module defines the crate-wide error type, the JSON-RPC error codes and
//! the mapping between errors and wire-level error objects.

use serde_json::Value;
use thiserror::Error;

use crate::protocol::{ JSONRPCError, JSONRPCErrorDetails, JSONRPCMessage, RequestId, JSONRPC_VERSION };

/// Standard JSON-RPC 2.0 error codes and MCP-specific error codes
pub mod error_codes {
    /// Parse error
    pub const PARSE_ERROR: i32 = -32700;
    /// Invalid request
    pub const INVALID_REQUEST: i32 = -32600;
    /// Method not found
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Invalid params
    pub const INVALID_PARAMS: i32 = -32602;
    /// Internal error
    pub const INTERNAL_ERROR: i32 = -32603;
    /// Resource not found
    pub const RESOURCE_NOT_FOUND: i32 = -32002;
    /// Tool execution error
    pub const TOOL_EXECUTION_ERROR: i32 = -32003;
    /// A server-to-client callback failed
    pub const CALLBACK_FAILED: i32 = -32004;
    /// Request timeout
    pub const REQUEST_TIMEOUT: i32 = -32001;
}

/// The main Error type for the library
#[derive(Error, Debug)]
pub enum Error {
    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Transport-related errors
    #[error("Transport error: {0}")]
    Transport(String),

    /// Input that is not a well-formed JSON-RPC 2.0 message
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// Method not found
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    /// Invalid parameters
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    /// Request that cannot be accepted, e.g. a duplicate in-flight id
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// No resource or template matches the URI
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    /// No prompt with that name
    #[error("Prompt not found: {0}")]
    PromptNotFound(String),

    /// A tool handler failed
    #[error("Tool execution failed: {0}")]
    ToolExecution(String),

    /// An elicitation or sampling callback could not be completed
    #[error("Callback failed: {0}")]
    CallbackFailed(String),

    /// The connection is gone
    #[error("Connection closed")]
    ConnectionClosed,

    /// Request timeout
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// An error response from the peer that maps to no other variant
    #[error("Remote error {code}: {message}")]
    Rpc {
        code: i32,
        message: String,
        data: Option<Value>,
    },

    /// Other internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Convert an error to a JSON-RPC error code
    pub fn to_code(&self) -> i32 {
        use error_codes::*;
        match self {
            Error::Json(_) => PARSE_ERROR,
            Error::MalformedMessage(_) => PARSE_ERROR,
            Error::MethodNotFound(_) => METHOD_NOT_FOUND,
            Error::InvalidParams(_) => INVALID_PARAMS,
            Error::InvalidRequest(_) => INVALID_REQUEST,
            Error::ResourceNotFound(_) => RESOURCE_NOT_FOUND,
            Error::PromptNotFound(_) => INVALID_PARAMS,
            Error::ToolExecution(_) => TOOL_EXECUTION_ERROR,
            Error::CallbackFailed(_) => CALLBACK_FAILED,
            Error::Timeout(_) => REQUEST_TIMEOUT,
            Error::Rpc { code, .. } => *code,
            Error::Io(_) => INTERNAL_ERROR,
            Error::Transport(_) => INTERNAL_ERROR,
            Error::ConnectionClosed => INTERNAL_ERROR,
            Error::Internal(_) => INTERNAL_ERROR,
        }
    }

    /// The wire-level error object for this error
    pub fn to_error_details(&self) -> JSONRPCErrorDetails {
        match self {
            Error::Rpc { code, message, data } =>
                JSONRPCErrorDetails {
                    code: *code,
                    message: message.clone(),
                    data: data.clone(),
                },
            other =>
                JSONRPCErrorDetails {
                    code: other.to_code(),
                    message: other.to_string(),
                    data: None,
                },
        }
    }

    /// Map an error object received from the peer back to an error.
    ///
    /// Codes that identify a single variant are mapped to it; everything else
    /// keeps its code and data in `Error::Rpc`.
    pub fn from_error_details(details: JSONRPCErrorDetails) -> Self {
        use error_codes::*;
        match details.code {
            METHOD_NOT_FOUND => Error::MethodNotFound(details.message),
            INVALID_PARAMS => Error::InvalidParams(details.message),
            INVALID_REQUEST => Error::InvalidRequest(details.message),
            RESOURCE_NOT_FOUND => Error::ResourceNotFound(details.message),
            TOOL_EXECUTION_ERROR => Error::ToolExecution(details.message),
            CALLBACK_FAILED => Error::CallbackFailed(details.message),
            _ =>
                Error::Rpc {
                    code: details.code,
                    message: details.message,
                    data: details.data,
                },
        }
    }

    /// Create an error response payload from this error
    pub fn to_response_payload(&self, id: RequestId) -> JSONRPCError {
        JSONRPCError {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            error: self.to_error_details(),
        }
    }

    /// Whether the connection that produced this error is unusable
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Io(_) | Error::ConnectionClosed | Error::Transport(_))
    }
}

// Manual implementation of Clone that handles non-cloneable types
impl Clone for Error {
    fn clone(&self) -> Self {
        match self {
            Error::Json(e) => Error::MalformedMessage(format!("JSON error: {}", e)),
            Error::Io(e) => Error::Transport(format!("I/O error: {}", e)),
            Error::Transport(s) => Error::Transport(s.clone()),
            Error::MalformedMessage(s) => Error::MalformedMessage(s.clone()),
            Error::MethodNotFound(s) => Error::MethodNotFound(s.clone()),
            Error::InvalidParams(s) => Error::InvalidParams(s.clone()),
            Error::InvalidRequest(s) => Error::InvalidRequest(s.clone()),
            Error::ResourceNotFound(s) => Error::ResourceNotFound(s.clone()),
            Error::PromptNotFound(s) => Error::PromptNotFound(s.clone()),
            Error::ToolExecution(s) => Error::ToolExecution(s.clone()),
            Error::CallbackFailed(s) => Error::CallbackFailed(s.clone()),
            Error::ConnectionClosed => Error::ConnectionClosed,
            Error::Timeout(s) => Error::Timeout(s.clone()),
            Error::Rpc { code, message, data } =>
                Error::Rpc {
                    code: *code,
                    message: message.clone(),
                    data: data.clone(),
                },
            Error::Internal(s) => Error::Internal(s.clone()),
        }
    }
}

/// Helper to convert an error into an error message for `id`
pub fn to_error_message(id: RequestId, error: &Error) -> JSONRPCMessage {
    JSONRPCMessage::Error(error.to_response_payload(id))
}
