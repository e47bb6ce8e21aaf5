//! Callback bridge
//!
//! Lets a handler send a request back to the client (elicitation, sampling)
//! and wait for the answer. Only the calling handler's task is suspended; the
//! session keeps serving other requests meanwhile.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{ debug, warn };

use crate::protocol::{
    Content,
    CreateMessageParams,
    CreateMessageResult,
    ElicitRequestParams,
    ElicitResult,
    Error,
    Method,
};
use crate::server::context::{ ConnectionState, StateCell };
use crate::session::Peer;

/// Default token budget for `sample`
const DEFAULT_SAMPLE_MAX_TOKENS: i64 = 500;

/// Issues server-to-client requests for one handler
#[derive(Clone)]
pub struct CallbackBridge {
    peer: Peer,
    timeout: Duration,
    state: StateCell,
    connection: Arc<ConnectionState>,
}

impl CallbackBridge {
    pub(crate) fn new(
        peer: Peer,
        timeout: Duration,
        state: StateCell,
        connection: Arc<ConnectionState>
    ) -> Self {
        Self {
            peer,
            timeout,
            state,
            connection,
        }
    }

    /// Ask the user a question and wait for the answer.
    ///
    /// A declined or cancelled elicitation is a normal result; transport
    /// failure, timeout and errors returned by the client are `CallbackFailed`.
    pub async fn elicit(
        &self,
        message: impl Into<String>,
        requested_schema: Value
    ) -> Result<ElicitResult, Error> {
        if !self.capability_declared(|c| c.supports_elicitation()) {
            return Err(Error::CallbackFailed("client does not support elicitation".to_string()));
        }

        let params = ElicitRequestParams {
            message: message.into(),
            requested_schema,
        };
        let result: ElicitResult = self.call(Method::ElicitationCreate, &params).await?;
        debug!("Elicitation answered with {:?}", result.action);
        Ok(result.normalized())
    }

    /// Ask the client's model to generate a message
    pub async fn create_message(
        &self,
        params: CreateMessageParams
    ) -> Result<CreateMessageResult, Error> {
        if !self.capability_declared(|c| c.supports_sampling()) {
            return Err(Error::CallbackFailed("client does not support sampling".to_string()));
        }

        self.call(Method::SamplingCreateMessage, &params).await
    }

    /// Sample a text answer to a single user prompt
    pub async fn sample(&self, prompt: &str) -> Result<String, Error> {
        let result = self.create_message(
            CreateMessageParams::user_text(prompt, DEFAULT_SAMPLE_MAX_TOKENS)
        ).await?;

        match result.content {
            Content::Text { text } => Ok(text),
            other => Err(Error::CallbackFailed(format!("expected text from sampling, got {:?}", other))),
        }
    }

    /// Before `initialize` nothing is known, so the request is attempted anyway.
    fn capability_declared(&self, check: impl Fn(&ConnectionState) -> bool) -> bool {
        self.connection.client_capabilities().is_none() || check(&self.connection)
    }

    async fn call<P, R>(&self, method: Method, params: &P) -> Result<R, Error>
        where P: Serialize, R: DeserializeOwned
    {
        if !self.state.begin_callback() {
            return Err(Error::CallbackFailed(format!("{} after the request finished", method)));
        }

        let result = {
            let _outstanding = scopeguard::guard(&self.state, |state| state.end_callback());
            self.peer
                .send_request_with_timeout::<P, R>(method.as_str(), params, Some(self.timeout)).await
        };

        result.map_err(|e| {
            warn!("{} callback failed: {}", method, e);
            match e {
                Error::CallbackFailed(message) => Error::CallbackFailed(message),
                other => Error::CallbackFailed(format!("{}: {}", method, other)),
            }
        })
    }
}
