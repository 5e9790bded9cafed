//! autorpc demo server and client.
//!
//! `serve` hosts the demo handler set and prints the bound port on stdout;
//! `call` invokes one method through a client proxy and prints the result.

mod handlers;

use anyhow::{bail, Context, Result};
use autorpc::{
    Endpoint, Envelope, RemoteHandler, RemoteObject, RpcServer, ServeOptions, TransportConfig,
};
use clap::{Parser, Subcommand};
use handlers::{demo_handlers, Counter, TextProcessor, DEFAULT_SERVICE};
use serde_json::Value;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "autorpc-rpc")]
#[command(about = "Serve or call autorpc demo handlers")]
struct Args {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the demo handlers until Ctrl-C
    Serve {
        /// Service name the contract is generated for
        #[arg(long, default_value = DEFAULT_SERVICE)]
        service: String,

        /// Host to bind to
        #[arg(long, default_value = TransportConfig::DEFAULT_HOST)]
        host: String,

        /// Port to listen on (0 = auto-assign)
        #[arg(short, long, default_value_t = TransportConfig::DEFAULT_SERVER_PORT)]
        port: u16,

        /// Maximum number of calls executing at once
        #[arg(long)]
        workers: Option<usize>,
    },

    /// Call one demo method and print its result as JSON
    Call {
        /// Method to call
        method: String,

        /// Positional arguments; values that parse as JSON are sent as JSON
        args: Vec<String>,

        /// Keyword argument as name=value (repeatable)
        #[arg(long = "kwarg", value_name = "NAME=VALUE")]
        kwargs: Vec<String>,

        /// Service name the contract is generated for
        #[arg(long, default_value = DEFAULT_SERVICE)]
        service: String,

        #[arg(long, default_value = TransportConfig::DEFAULT_HOST)]
        host: String,

        #[arg(short, long, default_value_t = TransportConfig::DEFAULT_SERVER_PORT)]
        port: u16,

        /// Run the method in-process instead of connecting
        #[arg(long)]
        local: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    match args.command {
        Command::Serve {
            service,
            host,
            port,
            workers,
        } => serve(&service, &host, port, workers).await,
        Command::Call {
            method,
            args,
            kwargs,
            service,
            host,
            port,
            local,
        } => {
            let envelope = build_envelope(&args, &kwargs)?;
            let target = (!local).then_some((service.as_str(), host.as_str(), port));
            let result = if TextProcessor::exports(&method) {
                call(RemoteObject::new(TextProcessor), target, &method, envelope).await?
            } else if Counter::exports(&method) {
                call(RemoteObject::new(Counter::default()), target, &method, envelope).await?
            } else {
                bail!("No demo handler exports '{}'", method);
            };
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
    }
}

async fn serve(service: &str, host: &str, port: u16, workers: Option<usize>) -> Result<()> {
    info!("Starting autorpc server for {}", service);

    let endpoint = Endpoint::resolve(host, port)?;
    let mut options = ServeOptions::default();
    if let Some(workers) = workers {
        options.worker_pool_size = workers;
    }

    let handlers = demo_handlers();
    let mut handle = RpcServer::start(service, &handlers, &endpoint, options)
        .await
        .with_context(|| format!("failed to start {} on {}", service, endpoint))?;

    // Print port for the parent process to read (intentional stdout)
    println!("RPC_PORT={}", handle.port());

    info!("RPC server running on {}", handle.addr());

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, exiting");

    handle.shutdown();
    handle.wait().await;
    Ok(())
}

async fn call<H: RemoteHandler>(
    mut object: RemoteObject<H>,
    target: Option<(&str, &str, u16)>,
    method: &str,
    envelope: Envelope,
) -> Result<Value> {
    if let Some((service, host, port)) = target {
        object.connect(service, host, port)?;
    }
    Ok(object.call(method, envelope).await?)
}

trait ExportsMethod {
    fn exports(method: &str) -> bool;
}

impl<H: RemoteHandler + Default> ExportsMethod for H {
    fn exports(method: &str) -> bool {
        RemoteObject::new(H::default()).capabilities().contains(method)
    }
}

fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn build_envelope(args: &[String], kwargs: &[String]) -> Result<Envelope> {
    let mut envelope = Envelope::new();
    for raw in args {
        envelope = envelope.arg(parse_value(raw));
    }
    for pair in kwargs {
        let Some((name, raw)) = pair.split_once('=') else {
            bail!("Invalid --kwarg '{}', expected NAME=VALUE", pair);
        };
        envelope = envelope.kwarg(name, parse_value(raw));
    }
    Ok(envelope)
}
