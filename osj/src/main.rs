use clap::Parser;
use oneshot_jsonrpc::{MethodError, MethodRegistry};
use std::process::exit;
use tracing::*;
use tracing_subscriber::{filter::LevelFilter, EnvFilter, FmtSubscriber};

/// Worker harness exposing a handful of smoke-test methods over single-shot JSON RPC.
///
/// The host writes one request document to stdin and closes it; the response comes back on
/// stdout.  Log events are written to stderr.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Turn debugging information on
    #[arg(short, long, action = clap::ArgAction::Count)]
    debug: u8,
}

#[derive(serde::Deserialize)]
struct AddParams {
    a: i64,
    b: i64,
}

/// The handler list this worker exposes.
///
/// Real workers assemble their registry the same way, from whatever methods their host
/// expects to be able to invoke.
fn registry() -> MethodRegistry {
    let mut registry = MethodRegistry::new();

    registry.register("echo", |params: serde_json::Value| async move {
        Ok::<_, MethodError>(params)
    });

    registry.register("add", |params: AddParams| async move {
        params
            .a
            .checked_add(params.b)
            .ok_or_else(|| MethodError::Application {
                code: -32000,
                message: "addition overflowed".to_string(),
                data: None,
            })
    });

    registry.register("version", |_: Option<serde_json::Value>| async move {
        Ok::<_, MethodError>(env!("CARGO_PKG_VERSION"))
    });

    registry
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let default_log_directive = match cli.debug {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };

    // stdout carries the response document, so all log output goes to stderr
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(default_log_directive.into())
                .from_env_lossy(),
        )
        .json()
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set subscriber");

    // RPC-level errors were already delivered on stdout as error responses; an Err here
    // means the cycle itself broke and the host sees the non-zero exit instead
    if let Err(e) = oneshot_jsonrpc::run(registry()).await {
        error!("{:#}", e);
        exit(1);
    } else {
        debug!("request cycle completed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oneshot_jsonrpc::Handler;
    use serde_json::json;

    /// Verify that there aren't any invalid attributes in the CLI specification that can only be
    /// detected at runtime
    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert()
    }

    #[tokio::test]
    async fn add_overflow_is_a_structured_failure() {
        let registry = registry();
        let handler = registry.resolve("add").unwrap();

        let params = serde_json::value::RawValue::from_string(
            json!({"a": i64::MAX, "b": 1}).to_string(),
        )
        .unwrap();
        let error = handler.call(Some(params)).await.unwrap_err();
        assert!(matches!(error, MethodError::Application { code: -32000, .. }));
    }
}
