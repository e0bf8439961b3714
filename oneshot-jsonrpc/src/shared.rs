use crate::registry::MethodError;
use jsonrpsee_types as jsonrpc;

/// Re-use some of the heavy lifting done in jsonrpsee, pretending as if these are our own types
pub(crate) use jsonrpc::{ErrorCode, ErrorObjectOwned, Id, Request, Response, ResponsePayload};

/// Type that tells `serde_json` that we expect a valid JSON value, but we want to defer parsing it
/// until later.  This is used in the JSON RPC impl code where we don't yet know what specific Rust
/// type a method or notification takes and don't want to descend into type parameter hell.
///
/// `serde_json::value::RawValue` is a special case type with specific optimizations in `serde_json`
pub(crate) type GenericParams<'a> = &'a serde_json::value::RawValue;

/// Convenient type alias for notifications with generic raw JSON payloads.
///
/// The jsonrpsee `Request` type explicitly holds only a raw JSON payload, for some reason the
/// Notification type doesn't.  That is what we need here.
pub(crate) type Notification<'a> = jsonrpc::Notification<'a, Option<GenericParams<'a>>>;

/// The response type that has a generic JSON payload.  The actual type of the payload is
/// method-specific and is not known at the level of the JSON-RPC impl
pub(crate) type GenericResponse = Response<'static, serde_json::Value>;

/// Possible kinds of messages sent to servers from JSON-RPC clients
#[derive(Debug)]
pub(crate) enum JsonRpcClientMessage<'a> {
    /// A regular method invocation
    Request(jsonrpc::Request<'a>),

    /// A notification, which is fire-and-forget and does not elicit a response
    Notification(Notification<'a>),

    /// An invalid request, which is a JSON-RPC error, but still has an ID field so that when we
    /// report the error we can include the ID of the request that caused it.
    InvalidRequest(jsonrpc::InvalidRequest<'a>),
}

/// Probe for the presence of an `id` key, used to tell failed method calls apart from
/// notifications before either has been fully parsed.
#[derive(serde::Deserialize)]
struct IdProbe<'a> {
    #[serde(borrow)]
    id: Option<&'a serde_json::value::RawValue>,
}

impl<'a> JsonRpcClientMessage<'a> {
    pub(crate) fn from_str(request: &'a str) -> Result<Self, JsonRpcError> {
        // Inspired by the `handle_rpc_call` function in jsonrpsee-server in `src/server.rs`
        //
        // In short: try to parse as jsonrpc::Request, if not then as Notification, and if not as
        // InvalidRequest
        if let Ok(request) = serde_json::from_str::<jsonrpc::Request>(request) {
            return Ok(JsonRpcClientMessage::Request(request));
        }

        // A document that carries an `id` key is an attempted method call even though it failed
        // to parse as one; only id-less documents may be treated as notifications.
        let has_id = serde_json::from_str::<IdProbe>(request)
            .map(|probe| probe.id.is_some())
            .unwrap_or(false);

        if !has_id {
            if let Ok(notification) = serde_json::from_str::<Notification>(request) {
                return Ok(JsonRpcClientMessage::Notification(notification));
            }
        }

        match serde_json::from_str::<jsonrpc::InvalidRequest>(request) {
            Ok(invalid) => Ok(JsonRpcClientMessage::InvalidRequest(invalid)),
            Err(e) => {
                // Anything that still parses as JSON is a well-formed document of the wrong
                // shape (a batch array, a bare scalar, an object with an unrepresentable id).
                // Single-request mode rejects those as invalid requests rather than parse
                // errors.
                if serde_json::from_str::<&serde_json::value::RawValue>(request).is_ok() {
                    Err(JsonRpcError::invalid_request(Id::Null))
                } else {
                    Err(JsonRpcError::deser(e, None))
                }
            }
        }
    }
}

/// Internal error type that captures errors as JSON-RPC errors
///
/// Used only to capture error information in enough detail to generate proper JSON error
/// responses.
///
/// Uses the error codes defined in the JSON-RPC spec, except for application errors raised by
/// method handlers, which carry whatever code the handler chose.
#[derive(Debug)]
pub(crate) struct JsonRpcError {
    code: i32,
    message: String,
    id: Option<Id<'static>>,
    data: Option<serde_json::Value>,
}

impl JsonRpcError {
    fn new(
        code: i32,
        message: impl Into<String>,
        id: impl Into<Option<Id<'static>>>,
        data: impl Into<Option<serde_json::Value>>,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            id: id.into(),
            data: data.into(),
        }
    }

    /// Error deserializing the request JSON.
    pub(crate) fn deser(error: serde_json::Error, id: impl Into<Option<Id<'static>>>) -> Self {
        Self::new(
            ErrorCode::ParseError.code(),
            error.to_string(),
            id,
            None,
        )
    }

    pub(crate) fn method_not_found(id: Id<'static>) -> Self {
        Self::new(
            ErrorCode::MethodNotFound.code(),
            ErrorCode::MethodNotFound.message(),
            id,
            None,
        )
    }

    pub(crate) fn invalid_params(detail: impl Into<Option<String>>, id: Id<'static>) -> Self {
        Self::new(
            ErrorCode::InvalidParams.code(),
            ErrorCode::InvalidParams.message(),
            id,
            detail.into().map(serde_json::Value::String),
        )
    }

    pub(crate) fn invalid_request(id: Id<'static>) -> Self {
        Self::new(
            ErrorCode::InvalidRequest.code(),
            ErrorCode::InvalidRequest.message(),
            id,
            None,
        )
    }

    /// An unstructured handler failure, reported to the caller as an internal error with the
    /// source chain captured in the `data` field.
    pub(crate) fn internal_anyhow_error(id: Id<'static>, error: anyhow::Error) -> Self {
        let chain: Vec<String> = error.chain().skip(1).map(|e| e.to_string()).collect();
        let data = (!chain.is_empty()).then(|| serde_json::json!(chain));

        Self::new(ErrorCode::InternalError.code(), error.to_string(), id, data)
    }

    /// Translate a failure signaled by a method handler into the wire error shape.
    ///
    /// Structured application errors keep the code, message, and data the handler chose;
    /// everything else maps to the standard JSON-RPC codes.
    pub(crate) fn method(error: MethodError, id: Id<'static>) -> Self {
        match error {
            MethodError::InvalidParams(detail) => Self::invalid_params(detail, id),
            MethodError::Application {
                code,
                message,
                data,
            } => Self::new(code, message, id, data),
            MethodError::Other(error) => Self::internal_anyhow_error(id, error),
        }
    }
}

/// Implement the conversion from `JsonRpcError` to a JSON-RPC response.
///
/// This is a convenience to allow `JsonRpcError` to be used directly as a response elsewhere in
/// the implementation.
impl From<JsonRpcError> for GenericResponse {
    fn from(error: JsonRpcError) -> Self {
        Response::new(
            ResponsePayload::error(ErrorObjectOwned::owned(
                error.code,
                error.message,
                error.data,
            )),
            error.id.unwrap_or(Id::Null),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn parse_json_rpc_request() {
        let request = r#"{"jsonrpc": "2.0", "method": "echo", "params": {"x": 1}, "id": 1}"#;
        let request = JsonRpcClientMessage::from_str(request).unwrap();
        assert_matches!(request, JsonRpcClientMessage::Request(_));
    }

    #[test]
    fn parse_json_rpc_notification() {
        let request = r#"    { "jsonrpc": "2.0", "method": "progress" }"#;
        let request = JsonRpcClientMessage::from_str(request).unwrap();
        assert_matches!(request, JsonRpcClientMessage::Notification(_));
    }

    #[test]
    fn missing_version_is_invalid_request() {
        let request = r#"{"method": "echo", "id": 1}"#;
        let request = JsonRpcClientMessage::from_str(request).unwrap();
        assert_matches!(request, JsonRpcClientMessage::InvalidRequest(invalid) => {
            assert_eq!(invalid.id, Id::Number(1));
        });
    }

    #[test]
    fn unparseable_input_is_a_parse_error() {
        for input in ["", "   ", r#"{"jsonrpc": "2.0", "method": "echo", "id": 1"#] {
            let error = JsonRpcClientMessage::from_str(input).unwrap_err();
            assert_eq!(error.code, ErrorCode::ParseError.code());
            assert_eq!(error.id, None);
        }
    }

    #[test]
    fn batch_arrays_are_rejected() {
        // Single-request mode: a valid JSON document of the wrong shape is an invalid
        // request, not a parse error
        let request = r#"[{"jsonrpc": "2.0", "method": "echo", "id": 1}]"#;
        let error = JsonRpcClientMessage::from_str(request).unwrap_err();
        assert_eq!(error.code, ErrorCode::InvalidRequest.code());
        assert_eq!(error.id, Some(Id::Null));
    }

    #[test]
    fn malformed_id_is_not_a_notification() {
        // The id key makes this an attempted call; it must not fall through to the
        // notification path just because the id itself is garbage
        let request = r#"{"jsonrpc": "2.0", "method": "echo", "id": {"nested": true}}"#;
        let error = JsonRpcClientMessage::from_str(request).unwrap_err();
        assert_eq!(error.code, ErrorCode::InvalidRequest.code());
    }
}
