//! Encoding and decoding of JSON-RPC messages.
//!
//! `encode`/`decode` work on single messages. `MessageCodec` frames them as
//! newline-delimited JSON for use with `FramedRead`/`FramedWrite`.

use bytes::BytesMut;
use serde_json::Value;
use tokio_util::codec::{ Decoder, Encoder, LinesCodec, LinesCodecError };

use crate::protocol::{ Error, JSONRPCMessage, JSONRPC_VERSION };

/// Default upper bound for a single framed message.
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 16 * 1024 * 1024;

/// Serialize a message to its JSON bytes (without a trailing newline).
pub fn encode(message: &JSONRPCMessage) -> Result<Vec<u8>, Error> {
    serde_json::to_vec(message).map_err(Error::from)
}

/// Parse a single JSON-RPC 2.0 message.
///
/// Anything that is not a JSON object with `"jsonrpc": "2.0"` and the shape of
/// a request, notification, response or error is rejected as malformed.
pub fn decode(bytes: &[u8]) -> Result<JSONRPCMessage, Error> {
    let value: Value = serde_json
        ::from_slice(bytes)
        .map_err(|e| Error::MalformedMessage(format!("invalid JSON: {}", e)))?;

    let object = value
        .as_object()
        .ok_or_else(|| Error::MalformedMessage("message is not a JSON object".to_string()))?;

    match object.get("jsonrpc").and_then(Value::as_str) {
        Some(JSONRPC_VERSION) => {}
        Some(other) => {
            return Err(Error::MalformedMessage(format!("unsupported jsonrpc version {}", other)));
        }
        None => {
            return Err(Error::MalformedMessage("missing jsonrpc version".to_string()));
        }
    }

    // A null or fractional id would otherwise fall through to the notification shape.
    if let Some(id) = object.get("id") {
        if !(id.is_string() || id.is_i64()) {
            return Err(Error::MalformedMessage(format!("invalid id {}", id)));
        }
    }

    serde_json
        ::from_value(value)
        .map_err(|_| Error::MalformedMessage("unrecognized message shape".to_string()))
}

/// Newline-delimited JSON framing.
///
/// Decoded items are themselves results: a line that fails to decode is
/// reported as `Some(Err(..))` and the stream continues with the next line,
/// while an error of the codec itself ends the stream.
#[derive(Debug, Clone)]
pub struct MessageCodec {
    lines: LinesCodec,
    max_length: usize,
}

impl MessageCodec {
    /// Create a new codec with the default maximum frame length
    pub fn new() -> Self {
        Self::with_max_length(DEFAULT_MAX_FRAME_LENGTH)
    }

    /// Create a new codec that rejects lines longer than `max_length` bytes
    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(max_length),
            max_length,
        }
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    fn decode_line(
        &self,
        line: Result<Option<String>, LinesCodecError>
    ) -> Result<Option<Option<Result<JSONRPCMessage, Error>>>, Error> {
        match line {
            Ok(Some(line)) if line.trim().is_empty() => Ok(None),
            Ok(Some(line)) => Ok(Some(Some(decode(line.as_bytes())))),
            Ok(None) => Ok(Some(None)),
            Err(LinesCodecError::MaxLineLengthExceeded) =>
                Ok(
                    Some(
                        Some(
                            Err(
                                Error::MalformedMessage(
                                    format!("message exceeds {} bytes", self.max_length)
                                )
                            )
                        )
                    )
                ),
            Err(LinesCodecError::Io(e)) => Err(Error::Io(e)),
        }
    }
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for MessageCodec {
    type Item = Result<JSONRPCMessage, Error>;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let line = self.lines.decode(src);
            // Blank lines are skipped rather than reported.
            if let Some(item) = self.decode_line(line)? {
                return Ok(item);
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let line = self.lines.decode_eof(src);
            if let Some(item) = self.decode_line(line)? {
                return Ok(item);
            }
        }
    }
}

impl Encoder<JSONRPCMessage> for MessageCodec {
    type Error = Error;

    fn encode(&mut self, item: JSONRPCMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let line = serde_json::to_string(&item)?;
        self.lines.encode(line, dst).map_err(|e| {
            match e {
                LinesCodecError::Io(e) => Error::Io(e),
                LinesCodecError::MaxLineLengthExceeded =>
                    Error::Transport("outgoing message exceeds frame length".to_string()),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{
        CallToolParams,
        CallToolResult,
        Content,
        CreateMessageParams,
        ElicitRequestParams,
        ElicitResult,
        JSONRPCError,
        JSONRPCNotification,
        JSONRPCRequest,
        JSONRPCResponse,
        LoggingLevel,
        LoggingMessageParams,
        ProgressParams,
        ProgressToken,
        RequestId,
        Tool,
        ToolAnnotations,
    };
    use serde_json::json;

    fn round_trip(message: JSONRPCMessage) {
        let bytes = encode(&message).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn test_round_trip_every_message_kind() {
        let call = CallToolParams::new(
            "multiply",
            json!({ "a": 2, "b": 3 }).as_object().cloned().unwrap()
        ).with_progress_token(7);
        round_trip(
            JSONRPCRequest::with_params(RequestId::Number(1), "tools/call", &call).unwrap().into()
        );

        round_trip(
            JSONRPCResponse::new(
                RequestId::String("req-1".to_string()),
                serde_json::to_value(CallToolResult::structured(json!({ "result": 6 }))).unwrap()
            ).into()
        );

        round_trip(
            JSONRPCError::new(
                RequestId::Number(2),
                Error::MethodNotFound("tools/x".to_string()).to_error_details()
            ).into()
        );

        let progress = ProgressParams {
            progress_token: ProgressToken::String("0".to_string()),
            progress: 0.5,
            total: Some(1.0),
            message: Some("dividing".to_string()),
        };
        round_trip(
            JSONRPCNotification::with_params("notifications/progress", &progress).unwrap().into()
        );

        let log = LoggingMessageParams {
            level: LoggingLevel::Info,
            logger: Some("my-log".to_string()),
            data: json!({ "nested": [1, "two", { "three": 3 }] }),
        };
        round_trip(JSONRPCNotification::with_params("notifications/message", &log).unwrap().into());
    }

    #[test]
    fn test_round_trip_callback_payloads() {
        let elicit = ElicitRequestParams {
            message: "what is your favorite number?".to_string(),
            requested_schema: json!({
                "type": "object",
                "properties": { "number": { "type": "integer" } }
            }),
        };
        round_trip(
            JSONRPCRequest::with_params(RequestId::Number(9), "elicitation/create", &elicit)
                .unwrap()
                .into()
        );

        let accepted = ElicitResult::accept(json!({ "number": 12345 }).as_object().cloned().unwrap());
        round_trip(
            JSONRPCResponse::new(RequestId::Number(9), serde_json::to_value(&accepted).unwrap()).into()
        );

        let sample = CreateMessageParams::user_text("Tell me a joke!", 100);
        round_trip(
            JSONRPCRequest::with_params(RequestId::Number(10), "sampling/createMessage", &sample)
                .unwrap()
                .into()
        );

        let tool = Tool {
            name: "multiply".to_string(),
            description: None,
            input_schema: json!({ "type": "object" }),
            output_schema: Some(json!({ "type": "object" })),
            annotations: Some(ToolAnnotations {
                read_only_hint: Some(true),
                ..Default::default()
            }),
        };
        let value = serde_json::to_value(&tool).unwrap();
        assert_eq!(serde_json::from_value::<Tool>(value).unwrap(), tool);
    }

    #[test]
    fn test_content_is_tagged_by_type() {
        let value = serde_json::to_value(Content::text("hi")).unwrap();
        assert_eq!(value, json!({ "type": "text", "text": "hi" }));
    }

    #[test]
    fn test_encoded_request_snapshot() {
        let call = CallToolParams::new("add", json!({ "a": 1, "b": 2 }).as_object().cloned().unwrap());
        let request = JSONRPCRequest::with_params(RequestId::Number(1), "tools/call", &call).unwrap();
        let bytes = encode(&request.into()).unwrap();

        insta::assert_snapshot!(String::from_utf8(bytes).unwrap(), @r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"add","arguments":{"a":1,"b":2}}}"#);
    }

    #[test]
    fn test_malformed_input() {
        let cases: Vec<&[u8]> = vec![
            b"not json",
            b"[1, 2, 3]",
            br#"{"id": 1, "method": "ping"}"#,
            br#"{"jsonrpc": "1.0", "id": 1, "method": "ping"}"#,
            br#"{"jsonrpc": "2.0", "id": null, "method": "ping"}"#,
            br#"{"jsonrpc": "2.0", "id": 1}"#,
            br#"{"jsonrpc": "2.0"}"#
        ];

        for case in cases {
            assert!(
                matches!(decode(case), Err(Error::MalformedMessage(_))),
                "expected malformed for {}",
                String::from_utf8_lossy(case)
            );
        }
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let message = decode(
            br#"{"jsonrpc":"2.0","id":"a","method":"ping","extra":{"x":1}}"#
        ).unwrap();
        assert_eq!(message.method(), Some("ping"));
        assert_eq!(message.id(), Some(&RequestId::String("a".to_string())));
    }

    #[test]
    fn test_framing_skips_bad_lines() {
        let mut codec = MessageCodec::new();
        let mut buf = BytesMut::from(
            &b"{\"jsonrpc\":\"2.0\",\"method\":\"notifications/initialized\"}\n\ngarbage\n{\"jsonrpc\":\"2.0\",\"id\":4,\"result\":{}}\n{\"jsonrpc\""[..]
        );

        let first = codec.decode(&mut buf).unwrap().unwrap().unwrap();
        assert!(first.is_notification());

        let second = codec.decode(&mut buf).unwrap().unwrap();
        assert!(matches!(second, Err(Error::MalformedMessage(_))));

        let third = codec.decode(&mut buf).unwrap().unwrap().unwrap();
        assert_eq!(third.id(), Some(&RequestId::Number(4)));

        // incomplete line stays buffered
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_framing_rejects_oversized_lines() {
        let mut codec = MessageCodec::with_max_length(40);
        let long = format!("{{\"jsonrpc\":\"2.0\",\"method\":\"{}\"}}\n", "x".repeat(64));
        let mut buf = BytesMut::from(long.as_bytes());
        buf.extend_from_slice(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":1}\n");

        let first = codec.decode(&mut buf).unwrap().unwrap();
        assert!(matches!(first, Err(Error::MalformedMessage(_))));

        let second = codec.decode(&mut buf).unwrap().unwrap().unwrap();
        assert!(second.is_response());
    }

    #[test]
    fn test_encoder_appends_newline() {
        let mut codec = MessageCodec::new();
        let mut dst = BytesMut::new();
        codec.encode(JSONRPCRequest::new(RequestId::Number(1), "ping", None).into(), &mut dst).unwrap();
        assert_eq!(&dst[..], b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n");
    }
}
