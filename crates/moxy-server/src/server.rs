//! The TCP listener.

use tokio::net::TcpListener;
use tokio::sync::broadcast;

use crate::error::Result;
use crate::modules::Pipeline;
use crate::network;

/// Accepts client connections and hands each one to its own task.
pub struct Server {
    address: String,
    pipeline: Pipeline,
    shutdown_tx: broadcast::Sender<()>,
}

impl Server {
    pub fn new(host: &str, port: u16, pipeline: Pipeline) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            address: format!("{host}:{port}"),
            pipeline,
            shutdown_tx,
        }
    }

    /// Bind the configured address and serve until shutdown.
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(&self.address).await?;
        tracing::info!("proxy listening on {}", self.address);
        self.serve(listener).await
    }

    /// Accept loop over an already-bound listener.
    ///
    /// Accept errors are logged and the loop continues; a connection
    /// error never takes the listener down.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            tracing::debug!("accepted connection from {addr}");
                            let pipeline = self.pipeline.clone();
                            tokio::spawn(async move {
                                if let Err(e) = network::handle_connection(stream, pipeline).await {
                                    tracing::error!("connection from {addr} failed: {e}");
                                }
                            });
                        }
                        Err(e) => {
                            tracing::error!("error accepting connection: {e}");
                        }
                    }
                }

                _ = shutdown_rx.recv() => {
                    tracing::info!("shutdown signal received, stopping listener");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Handle for signaling the accept loop to stop.
    pub fn shutdown_signal(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}
