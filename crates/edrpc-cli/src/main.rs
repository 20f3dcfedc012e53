//! # edrpc CLI Entry Point
//!
//! Command-line interface for the edrpc editor bridge.
//!
//! ## Usage
//!
//! ```bash
//! # Start a demo host (binds the bridge endpoint, runs the owner tick loop)
//! edrpc serve -b 127.0.0.1:8765
//!
//! # Invoke a capability (outputs raw JSON)
//! edrpc call 127.0.0.1:8765 echo -a '{"x": 5}'
//!
//! # List the host's capabilities
//! edrpc capabilities 127.0.0.1:8765
//!
//! # Show the host's initialize metadata
//! edrpc info 127.0.0.1:8765
//! ```

use std::time::Duration;

use anyhow::Result;
use argh::FromArgs;
use edrpc_client::{BridgeClient, ClientConfig};
use edrpc_host::{BridgeHost, CapabilityRegistry, HostConfig};
use serde_json::Value;

/// Main CLI structure parsed from command-line arguments.
#[derive(FromArgs)]
/// edrpc - editor automation RPC bridge
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

/// Available CLI subcommands.
///
/// - **Serve**: run a demo bridge host with a built-in capability set
/// - **Call**: invoke one capability (unix-friendly JSON output)
/// - **Capabilities**: list the host's registered capability names
/// - **Info**: print the host's initialize metadata
#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Serve(ServeArgs),
    Call(CallArgs),
    Capabilities(CapabilitiesArgs),
    Info(InfoArgs),
}

/// Arguments for running a demo bridge host.
///
/// The demo host registers a small capability set (`echo`, `ping`,
/// `host/info`) standing in for a real embedder's catalog, then runs the
/// owner tick loop until interrupted.
#[derive(FromArgs)]
#[argh(subcommand, name = "serve")]
/// run a demo bridge host
struct ServeArgs {
    /// address to bind the bridge listener to
    ///
    /// Both peers must know this endpoint. Defaults to "127.0.0.1:8765".
    #[argh(option, short = 'b', default = "\"127.0.0.1:8765\".into()")]
    bind: String,

    /// owner tick interval in milliseconds
    ///
    /// How often queued capability invocations are drained. Defaults to
    /// 16ms, roughly one tick per frame at 60 Hz.
    #[argh(option, long = "tick-ms", default = "16")]
    tick_ms: u64,
}

/// Arguments for invoking one capability.
///
/// Outputs the raw JSON result to stdout (no pretty-printing), which makes
/// it suitable for piping into `jq` and friends. Errors go to stderr with a
/// non-zero exit code.
#[derive(FromArgs)]
#[argh(subcommand, name = "call")]
/// invoke a capability on a running host
struct CallArgs {
    /// address of the host to connect to
    #[argh(positional)]
    addr: String,

    /// capability name to invoke
    #[argh(positional)]
    name: String,

    /// JSON object with the capability arguments
    ///
    /// Must be a JSON object. Defaults to `{}`.
    #[argh(option, short = 'a', long = "args", default = "\"{}\".into()")]
    args: String,

    /// per-call timeout in milliseconds
    ///
    /// Defaults to 30000ms (30 seconds).
    #[argh(option, long = "timeout-ms", default = "30000")]
    timeout_ms: u64,
}

/// Arguments for listing a host's capabilities.
#[derive(FromArgs)]
#[argh(subcommand, name = "capabilities")]
/// list the capability names registered on a host
struct CapabilitiesArgs {
    /// address of the host to connect to
    #[argh(positional)]
    addr: String,
}

/// Arguments for printing a host's initialize metadata.
#[derive(FromArgs)]
#[argh(subcommand, name = "info")]
/// print the initialize metadata of a host
struct InfoArgs {
    /// address of the host to connect to
    #[argh(positional)]
    addr: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // Initialize tracing only for serve: the client-style commands keep
    // stdout clean for unix tool usage (piping to jq, etc.).
    if matches!(cli.command, Commands::Serve(_)) {
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    match cli.command {
        Commands::Serve(args) => run_serve(args).await,
        Commands::Call(args) => run_call(args).await,
        Commands::Capabilities(args) => run_capabilities(args).await,
        Commands::Info(args) => run_info(args).await,
    }
}

/// Builds the demo capability set. A real embedder would register its own
/// catalog here instead.
fn demo_registry() -> CapabilityRegistry {
    let mut registry = CapabilityRegistry::new();
    registry.register("echo", |args| Ok(Value::Object(args.clone())));
    registry.register("ping", |_args| Ok(Value::String("pong".into())));
    registry.register("host/info", |_args| {
        Ok(serde_json::json!({
            "pid": std::process::id(),
            "version": env!("CARGO_PKG_VERSION"),
        }))
    });
    registry
}

/// Executes the `serve` subcommand: starts the host, then becomes the owner
/// thread by running the tick loop until Ctrl-C.
async fn run_serve(args: ServeArgs) -> Result<()> {
    let config = HostConfig {
        bind: args.bind,
        server_name: "edrpc-host".into(),
    };
    let mut host = BridgeHost::start(config, demo_registry()).await?;
    tracing::info!("serving on {}", host.local_addr());

    let mut ticker = tokio::time::interval(Duration::from_millis(args.tick_ms.max(1)));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                host.tick();
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupt received, shutting down");
                host.shutdown();
                return Ok(());
            }
        }
    }
}

/// Executes the `call` subcommand.
async fn run_call(args: CallArgs) -> Result<()> {
    let args_value: Value = serde_json::from_str(&args.args)
        .map_err(|e| anyhow::anyhow!("Invalid JSON in args: {}", e))?;
    let Value::Object(arguments) = args_value else {
        return Err(anyhow::anyhow!("args must be a JSON object"));
    };

    let client = BridgeClient::new(ClientConfig::new(&args.addr));
    client.connect().await?;

    let result = client
        .invoke_with_timeout(&args.name, arguments, Duration::from_millis(args.timeout_ms))
        .await?;

    println!("{}", serde_json::to_string(&result)?);
    Ok(())
}

/// Executes the `capabilities` subcommand: one name per line, pipeable.
async fn run_capabilities(args: CapabilitiesArgs) -> Result<()> {
    let client = BridgeClient::new(ClientConfig::new(&args.addr));
    client.connect().await?;

    for capability in client.capabilities().await? {
        println!("{}", capability.name);
    }
    Ok(())
}

/// Executes the `info` subcommand.
async fn run_info(args: InfoArgs) -> Result<()> {
    let client = BridgeClient::new(ClientConfig::new(&args.addr));
    client.connect().await?;

    let info = client.initialize().await?;
    println!("{}", serde_json::to_string(&info)?);
    Ok(())
}
