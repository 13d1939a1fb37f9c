//! Moxy proxy server entry point.

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use moxy_server::config;
use moxy_server::modules::default_registry;
use moxy_server::Server;

const DEFAULT_CONFIG_URI: &str = "mongodb://localhost:27017";
const DEFAULT_CONFIG_NS: &str = "test.config";

/// MongoDB wire-protocol proxy with a pluggable module pipeline.
#[derive(Parser, Debug)]
#[command(name = "moxyd", version, about)]
struct Args {
    /// Port to listen on.
    #[arg(long, default_value_t = config::DEFAULT_PORT)]
    port: u16,

    /// Logging verbosity, 0 (critical only) through 5 (debug).
    #[arg(long = "log-level", default_value_t = 3)]
    log_level: u8,

    /// Configuration file. If set, used instead of the document store.
    #[arg(short = 'f', long = "config-file")]
    config_file: Option<PathBuf>,

    /// Document store to query for configuration.
    #[arg(short = 'm', long = "config-uri", default_value = DEFAULT_CONFIG_URI)]
    config_uri: String,

    /// Namespace of the collection holding the configuration document.
    #[arg(short = 'c', long = "config-namespace", default_value = DEFAULT_CONFIG_NS)]
    config_namespace: String,
}

fn env_filter(log_level: u8) -> EnvFilter {
    if std::env::var_os("RUST_LOG").is_some() {
        return EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    }
    let directive = match log_level {
        0 | 1 => "error",
        2 => "warn",
        3 | 4 => "info",
        _ => "debug",
    };
    EnvFilter::new(directive)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter(args.log_level))
        .init();

    let config = match &args.config_file {
        Some(path) => config::load_file(path)?,
        None => {
            tracing::info!(
                "loading configuration from {} ({})",
                args.config_uri,
                args.config_namespace
            );
            config::store::fetch(&args.config_uri, &args.config_namespace).await?
        }
    };

    let registry = default_registry();
    let chain = config::build_chain(&registry, &config)?;
    if chain.is_empty() {
        tracing::warn!("module chain is empty; requests will go unanswered");
    }

    let server = Server::new("0.0.0.0", args.port, chain.into_pipeline());

    let shutdown = server.shutdown_signal();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        tracing::info!("received shutdown signal");
        let _ = shutdown.send(());
    });

    server.run().await?;

    tracing::info!("proxy stopped");
    Ok(())
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt()).expect("failed to register SIGINT handler");
        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to register SIGTERM handler");

        tokio::select! {
            _ = sigint.recv() => {},
            _ = sigterm.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
    }
}
