//! JSON RPC implementation that's specific to JSON RPC servers
use crate::registry::{Handler, MethodRegistry};
use crate::shared as jsonrpc;
use anyhow::Context;
use tracing::*;

/// JSON RPC server which implements the JSON RPC-specific plumbing, then invokes handlers
/// from a [`MethodRegistry`] to do the actual logic.
pub struct JsonRpcServer {
    registry: MethodRegistry,
}

impl JsonRpcServer {
    pub fn new(registry: MethodRegistry) -> Self {
        Self { registry }
    }

    /// Handle a JSON RPC request represented as a JSON string.
    ///
    /// Returns `Ok(None)` if the request was a notification, since notifications do not have
    /// responses.  RPC-level failures (unparseable input, unknown methods, handler errors)
    /// still produce `Ok`: the error is delivered to the caller as a serialized JSON-RPC
    /// error response.  `Err` is reserved for faults in the response serialization itself,
    /// which the caller should treat as fatal to the cycle.
    #[instrument(skip_all, fields(request_len = request.len()))]
    pub async fn handle_request(&self, request: &str) -> anyhow::Result<Option<String>> {
        let response: jsonrpc::GenericResponse = match self.handle_request_internal(request).await
        {
            Ok(None) => return Ok(None),
            Ok(Some(response)) => response,
            Err(e) => e.into(),
        };

        let response =
            serde_json::to_string(&response).context("serializing JSON-RPC response")?;
        Ok(Some(response))
    }

    /// Internal request handler that returns the Rust response and error types, which makes
    /// the code more ergonomic.  Serializing success and failure is handled by the caller.
    async fn handle_request_internal(
        &self,
        request: &str,
    ) -> Result<Option<jsonrpc::GenericResponse>, jsonrpc::JsonRpcError> {
        match jsonrpc::JsonRpcClientMessage::from_str(request)? {
            jsonrpc::JsonRpcClientMessage::Request(request) => {
                let id = request.id.clone().into_owned();

                // Handle the request
                let response = self.handle_method(request).await?;

                // Wrap it in the standard JSON-RPC response
                let response =
                    jsonrpc::Response::new(jsonrpc::ResponsePayload::success(response), id);

                Ok(Some(response))
            }
            jsonrpc::JsonRpcClientMessage::Notification(notification) => {
                // Notifications don't get responses, no matter what the handler does
                self.handle_notification(notification).await;

                Ok(None)
            }
            jsonrpc::JsonRpcClientMessage::InvalidRequest(invalid) => {
                // This request is mal-formed but at least it has an ID so we can reference
                // that ID in the resulting error
                let id = invalid.id.into_owned();
                Err(jsonrpc::JsonRpcError::invalid_request(id))
            }
        }
    }

    #[instrument(skip_all, fields(method = %request.method, id = %request.id))]
    async fn handle_method(
        &self,
        request: jsonrpc::Request<'_>,
    ) -> Result<serde_json::Value, jsonrpc::JsonRpcError> {
        let jsonrpc::Request {
            id, method, params, ..
        } = request;
        let id = id.into_owned();

        let Some(handler) = self.registry.resolve(method.as_ref()) else {
            debug!("No handler registered for method");
            return Err(jsonrpc::JsonRpcError::method_not_found(id));
        };

        let params = params.map(|params| params.into_owned());
        handler.call(params).await.map_err(|e| {
            error!(error = ?e, "Error handling method invocation");
            jsonrpc::JsonRpcError::method(e, id)
        })
    }

    /// Handle a JSON-RPC notification (which is like a method invocation, but no response is
    /// expected).
    ///
    /// According to the JSON RPC spec servers MUST NOT return any response to notifications,
    /// so failures here are logged and swallowed.
    #[instrument(skip_all, fields(method = %notification.method))]
    async fn handle_notification(&self, notification: jsonrpc::Notification<'_>) {
        let jsonrpc::Notification { method, params, .. } = notification;

        let Some(handler) = self.registry.resolve(method.as_ref()) else {
            error!("No handler registered for notification");
            return;
        };

        let params = params.map(|params| params.to_owned());
        if let Err(e) = handler.call(params).await {
            error!(error = ?e, "Error handling notification");
        }
    }
}
