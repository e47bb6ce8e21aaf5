//! Helper functions for working with JSON-RPC messages

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{ Map, Value };

use crate::protocol::errors::Error;
use crate::protocol::{
    JSONRPCError,
    JSONRPCErrorDetails,
    JSONRPCMessage,
    JSONRPCNotification,
    JSONRPCRequest,
    JSONRPCResponse,
    ProgressToken,
    RequestId,
    JSONRPC_VERSION,
};

/// Deserialize optional params, treating a missing value as an empty object.
fn parse_params<T>(params: Option<&Value>) -> Result<T, Error> where T: DeserializeOwned {
    let value = params.cloned().unwrap_or_else(|| Value::Object(Map::new()));
    serde_json::from_value(value).map_err(|e| Error::InvalidParams(e.to_string()))
}

/// Serialize params, omitting them when they serialize to `null`.
fn to_params<P>(params: &P) -> Result<Option<Value>, Error> where P: Serialize + ?Sized {
    let value = serde_json::to_value(params)?;
    Ok(if value.is_null() { None } else { Some(value) })
}

impl JSONRPCRequest {
    /// Create a new request
    pub fn new(id: RequestId, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: method.into(),
            params,
        }
    }

    /// Create a new request with serializable params
    pub fn with_params<P>(id: RequestId, method: impl Into<String>, params: &P) -> Result<Self, Error>
        where P: Serialize + ?Sized
    {
        Ok(Self::new(id, method, to_params(params)?))
    }

    /// Parse the params into a typed value
    pub fn parse_params<T>(&self) -> Result<T, Error> where T: DeserializeOwned {
        parse_params(self.params.as_ref())
    }

    /// The progress token carried in `params._meta`, if any
    pub fn progress_token(&self) -> Option<ProgressToken> {
        let token = self.params.as_ref()?.get("_meta")?.get("progressToken")?;
        serde_json::from_value(token.clone()).ok()
    }
}

impl JSONRPCNotification {
    /// Create a new notification
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
        }
    }

    /// Create a new notification with serializable params
    pub fn with_params<P>(method: impl Into<String>, params: &P) -> Result<Self, Error>
        where P: Serialize + ?Sized
    {
        Ok(Self::new(method, to_params(params)?))
    }

    /// Parse the params into a typed value
    pub fn parse_params<T>(&self) -> Result<T, Error> where T: DeserializeOwned {
        parse_params(self.params.as_ref())
    }
}

impl JSONRPCResponse {
    /// Create a new successful response
    pub fn new(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result,
        }
    }

    /// Parse the result into a typed value
    pub fn parse_result<T>(&self) -> Result<T, Error> where T: DeserializeOwned {
        serde_json::from_value(self.result.clone()).map_err(Error::from)
    }
}

impl JSONRPCError {
    /// Create a new error response
    pub fn new(id: RequestId, error: JSONRPCErrorDetails) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            error,
        }
    }
}

impl JSONRPCMessage {
    /// Get the request ID if this is a request or response
    pub fn id(&self) -> Option<&RequestId> {
        match self {
            JSONRPCMessage::Request(req) => Some(&req.id),
            JSONRPCMessage::Response(resp) => Some(&resp.id),
            JSONRPCMessage::Error(err) => Some(&err.id),
            JSONRPCMessage::Notification(_) => None,
        }
    }

    /// Get the method name if this is a request or notification
    pub fn method(&self) -> Option<&str> {
        match self {
            JSONRPCMessage::Request(req) => Some(&req.method),
            JSONRPCMessage::Notification(notification) => Some(&notification.method),
            JSONRPCMessage::Response(_) | JSONRPCMessage::Error(_) => None,
        }
    }

    /// The JSON-RPC version string carried by the message
    pub fn jsonrpc(&self) -> &str {
        match self {
            JSONRPCMessage::Request(req) => &req.jsonrpc,
            JSONRPCMessage::Notification(notification) => &notification.jsonrpc,
            JSONRPCMessage::Response(resp) => &resp.jsonrpc,
            JSONRPCMessage::Error(err) => &err.jsonrpc,
        }
    }

    /// The progress token of a request, if it carries one
    pub fn progress_token(&self) -> Option<ProgressToken> {
        match self {
            JSONRPCMessage::Request(req) => req.progress_token(),
            _ => None,
        }
    }

    pub fn is_request(&self) -> bool {
        matches!(self, JSONRPCMessage::Request(_))
    }

    pub fn is_notification(&self) -> bool {
        matches!(self, JSONRPCMessage::Notification(_))
    }

    pub fn is_response(&self) -> bool {
        matches!(self, JSONRPCMessage::Response(_) | JSONRPCMessage::Error(_))
    }
}

impl From<JSONRPCRequest> for JSONRPCMessage {
    fn from(value: JSONRPCRequest) -> Self {
        JSONRPCMessage::Request(value)
    }
}

impl From<JSONRPCNotification> for JSONRPCMessage {
    fn from(value: JSONRPCNotification) -> Self {
        JSONRPCMessage::Notification(value)
    }
}

impl From<JSONRPCResponse> for JSONRPCMessage {
    fn from(value: JSONRPCResponse) -> Self {
        JSONRPCMessage::Response(value)
    }
}

impl From<JSONRPCError> for JSONRPCMessage {
    fn from(value: JSONRPCError) -> Self {
        JSONRPCMessage::Error(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ CallToolParams, ElicitResult };
    use serde_json::json;

    #[test]
    fn test_progress_token_from_meta() {
        let params = CallToolParams::new(
            "divide",
            json!({ "a": 10, "b": 2 }).as_object().cloned().unwrap()
        ).with_progress_token("0");
        let request = JSONRPCRequest::with_params(RequestId::Number(3), "tools/call", &params).unwrap();

        assert_eq!(request.progress_token(), Some(ProgressToken::String("0".to_string())));
        let parsed: CallToolParams = request.parse_params().unwrap();
        assert_eq!(parsed, params);
    }

    #[test]
    fn test_missing_params_parse_as_empty_object() {
        let request = JSONRPCRequest::new(RequestId::Number(1), "tools/list", None);
        let parsed: crate::protocol::PaginatedRequestParams = request.parse_params().unwrap();
        assert!(parsed.cursor.is_none());
        assert!(request.progress_token().is_none());
    }

    #[test]
    fn test_bad_params_are_invalid_params() {
        let request = JSONRPCRequest::new(
            RequestId::Number(1),
            "tools/call",
            Some(json!({ "arguments": {} }))
        );
        let parsed: Result<CallToolParams, _> = request.parse_params();
        assert!(matches!(parsed, Err(Error::InvalidParams(_))));
    }

    #[test]
    fn test_response_parse_result() {
        let response = JSONRPCResponse::new(
            RequestId::String("abc".to_string()),
            json!({ "action": "decline" })
        );
        let result: ElicitResult = response.parse_result().unwrap();
        assert_eq!(result, ElicitResult::decline());
        assert_eq!(JSONRPCMessage::from(response).id(), Some(&RequestId::String("abc".to_string())));
    }
}
