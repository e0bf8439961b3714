//! The method registry: a mapping from method name to an invocable handler.
//!
//! The host assembles one of these at startup, registering a handler for every method the
//! worker exposes, then hands it to the request cycle.  The registry is an explicit value
//! passed around by the caller; there is no process-global registration.

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::value::RawValue;

/// Failure signaled by a method handler.
#[derive(Debug, thiserror::Error)]
pub enum MethodError {
    /// The supplied parameters were malformed or rejected by the handler.
    ///
    /// Reported to the caller with the standard Invalid Params error code.
    #[error("invalid method parameters: {0}")]
    InvalidParams(String),

    /// A structured application failure, propagated to the caller verbatim with the code,
    /// message, and data the handler chose.
    #[error("{message}")]
    Application {
        code: i32,
        message: String,
        data: Option<serde_json::Value>,
    },

    /// Any other failure, reported to the caller as a JSON-RPC internal error.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type for handler invocations.
pub type HandlerResult = Result<serde_json::Value, MethodError>;

/// The invocable side of a method entry.
///
/// Implementations receive the raw `params` value from the request, still unparsed.  Most
/// handlers should be registered through [`MethodRegistry::register`], which wraps an async
/// closure taking a deserialized parameter type instead.
#[async_trait::async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn call(&self, params: Option<Box<RawValue>>) -> HandlerResult;
}

/// Wrapper that deserializes the params and serializes the result around a typed async
/// handler function.
pub struct TypedHandler<F, P, Fut> {
    handler: F,
    _phantom: PhantomData<fn(P) -> Fut>,
}

impl<F, P, Fut> TypedHandler<F, P, Fut> {
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

#[async_trait::async_trait]
impl<F, P, Fut, R> Handler for TypedHandler<F, P, Fut>
where
    F: Fn(P) -> Fut + Send + Sync + 'static,
    P: DeserializeOwned + Send + 'static,
    Fut: Future<Output = Result<R, MethodError>> + Send + 'static,
    R: Serialize,
{
    async fn call(&self, params: Option<Box<RawValue>>) -> HandlerResult {
        // Absent params deserialize as JSON null, so handlers taking `Option<T>` or `()`
        // accept param-less requests
        let raw = params.as_deref().map(RawValue::get).unwrap_or("null");
        let parsed: P =
            serde_json::from_str(raw).map_err(|e| MethodError::InvalidParams(e.to_string()))?;

        let result = (self.handler)(parsed).await?;
        serde_json::to_value(result)
            .map_err(|e| MethodError::Other(anyhow::Error::new(e).context("serializing method result")))
    }
}

/// Registry mapping method names to handlers.
pub struct MethodRegistry {
    methods: HashMap<String, Box<dyn Handler>>,
}

impl MethodRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            methods: HashMap::new(),
        }
    }

    /// Register a typed method handler.
    ///
    /// `handler` is an async function taking the deserialized params and returning a
    /// serializable result.  If `name` was already registered, the previous handler is
    /// replaced: the last registration wins.
    ///
    /// # Panics
    ///
    /// Method names must be non-empty; registering an empty name is a programming error.
    pub fn register<F, P, Fut, R>(&mut self, name: impl Into<String>, handler: F)
    where
        F: Fn(P) -> Fut + Send + Sync + 'static,
        P: DeserializeOwned + Send + 'static,
        Fut: Future<Output = Result<R, MethodError>> + Send + 'static,
        R: Serialize,
    {
        self.register_raw(name, TypedHandler::new(handler));
    }

    /// Register a handler that wants the raw, unparsed `params` value.
    ///
    /// Same replacement semantics as [`Self::register`].
    pub fn register_raw(&mut self, name: impl Into<String>, handler: impl Handler) {
        let name = name.into();
        assert!(!name.is_empty(), "method names must be non-empty");

        self.methods.insert(name, Box::new(handler));
    }

    /// Look up the handler for a method name.  Pure lookup, no side effects.
    pub fn resolve(&self, name: &str) -> Option<&dyn Handler> {
        self.methods.get(name).map(|handler| handler.as_ref())
    }

    /// The registered method names, in no particular order.
    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

impl Default for MethodRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn params(json: &str) -> Option<Box<RawValue>> {
        Some(RawValue::from_string(json.to_string()).unwrap())
    }

    #[tokio::test]
    async fn typed_handler_round_trip() {
        #[derive(serde::Deserialize)]
        struct AddParams {
            a: i64,
            b: i64,
        }

        let mut registry = MethodRegistry::new();
        registry.register("add", |params: AddParams| async move {
            Ok::<_, MethodError>(params.a + params.b)
        });

        let handler = registry.resolve("add").expect("add is registered");
        let result = handler.call(params(r#"{"a": 2, "b": 3}"#)).await.unwrap();
        assert_eq!(result, json!(5));
    }

    #[tokio::test]
    async fn absent_params_deserialize_as_null() {
        let mut registry = MethodRegistry::new();
        registry.register("probe", |params: Option<serde_json::Value>| async move {
            Ok::<_, MethodError>(params.is_none())
        });

        let handler = registry.resolve("probe").unwrap();
        let result = handler.call(None).await.unwrap();
        assert_eq!(result, json!(true));
    }

    #[tokio::test]
    async fn malformed_params_are_invalid_params() {
        #[derive(serde::Deserialize)]
        struct AddParams {
            a: i64,
            b: i64,
        }

        let mut registry = MethodRegistry::new();
        registry.register("add", |params: AddParams| async move {
            Ok::<_, MethodError>(params.a + params.b)
        });

        let handler = registry.resolve("add").unwrap();
        let error = handler.call(params(r#""nope""#)).await.unwrap_err();
        assert_matches!(error, MethodError::InvalidParams(_));
    }

    #[tokio::test]
    async fn duplicate_registration_overwrites() {
        let mut registry = MethodRegistry::new();
        registry.register("answer", |_: Option<serde_json::Value>| async move {
            Ok::<_, MethodError>("first")
        });
        registry.register("answer", |_: Option<serde_json::Value>| async move {
            Ok::<_, MethodError>("second")
        });

        assert_eq!(registry.len(), 1);
        let handler = registry.resolve("answer").unwrap();
        let result = handler.call(None).await.unwrap();
        assert_eq!(result, json!("second"));
    }

    #[test]
    fn resolve_misses_unregistered_names() {
        let registry = MethodRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.resolve("anything").is_none());
    }

    #[test]
    #[should_panic(expected = "non-empty")]
    fn empty_method_name_panics() {
        let mut registry = MethodRegistry::new();
        registry.register("", |_: Option<serde_json::Value>| async move {
            Ok::<_, MethodError>(())
        });
    }
}
