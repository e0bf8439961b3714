//! A very minimal single-shot JSON-RPC server implementation, with just enough
//! functionality for hosts that spawn short-lived worker subprocesses.
//!
//! The contract is one request per process: the host writes a single JSON-RPC 2.0 request
//! document to the worker's stdin and closes it, the worker dispatches it to a registered
//! handler by method name, writes the response document to stdout, and exits.  Log events
//! (if any) go to stderr, which the host does not parse.
//!
//! `jsonrpsee` is a more full-featured JSON-RPC library, but it is built around persistent
//! connections and its server side does not allow for custom transports.  That said, this
//! implementation does use the JSON-RPC types from `jsonrpsee-types`.
//!
//! The whole surface a host needs is [`MethodRegistry`] plus [`run`]:
//!
//! ```no_run
//! use oneshot_jsonrpc::{MethodError, MethodRegistry};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut registry = MethodRegistry::new();
//!     registry.register("echo", |params: serde_json::Value| async move {
//!         Ok::<_, MethodError>(params)
//!     });
//!
//!     oneshot_jsonrpc::run(registry).await
//! }
//! ```

mod registry;
mod server;
mod shared;
mod transport;

pub use registry::*;
pub use server::*;
pub use transport::*;

/// Expose the given handlers as a JSON-RPC server over the standard streams, for exactly
/// one request cycle.
///
/// Reads stdin to end of stream, dispatches the accumulated document through `registry`,
/// writes the response (if any) to stdout, and returns.  An `Err` return means the cycle
/// machinery itself failed and no well-formed response was delivered; the host binary
/// should exit non-zero in that case.  RPC-level errors are delivered to the caller as
/// JSON-RPC error responses and return `Ok`.
pub async fn run(registry: MethodRegistry) -> anyhow::Result<()> {
    let server = JsonRpcServer::new(registry);
    let mut transport = StdioTransport::stdio(tokio::io::stdin(), tokio::io::stdout());

    transport.serve_once(&server).await
}
