use crate::config::ServerConfig;
use crate::error::{BankError, Result};
use crate::interfaces::dispatcher::Dispatcher;
use crate::interfaces::wire::frame::{read_frame, write_frame};
use crate::interfaces::wire::protocol::Response;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Accepts connections and serves one request on each.
///
/// Every connection runs on its own task, so a slow peer only holds up
/// itself.
pub struct BankServer {
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
    config: Arc<ServerConfig>,
}

impl BankServer {
    pub async fn bind(config: ServerConfig, dispatcher: Dispatcher) -> Result<Self> {
        config.validate()?;
        let listener = TcpListener::bind(config.listen_addr).await?;
        Ok(Self {
            listener,
            dispatcher: Arc::new(dispatcher),
            config: Arc::new(config),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serves until Ctrl-C.
    pub async fn run(self) -> Result<()> {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = %err, "failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Serves until `shutdown` resolves, then waits for open connections to
    /// finish.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let addr = self.local_addr()?;
        info!(%addr, "bank listening");

        let mut connections = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let dispatcher = Arc::clone(&self.dispatcher);
                        let config = Arc::clone(&self.config);
                        connections.spawn(handle_connection(stream, peer, dispatcher, config));
                    }
                    Err(err) => warn!(error = %err, "failed to accept connection"),
                },
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }

        info!(open = connections.len(), "shutting down, draining connections");
        while connections.join_next().await.is_some() {}
        Ok(())
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    dispatcher: Arc<Dispatcher>,
    config: Arc<ServerConfig>,
) {
    debug!(%peer, "connection accepted");

    let frame = match timeout(
        config.io_timeout,
        read_frame(&mut stream, config.max_frame_bytes),
    )
    .await
    {
        Ok(Ok(frame)) => Ok(frame),
        Ok(Err(err @ BankError::ProtocolError(_))) => Err(err),
        Ok(Err(err)) => {
            debug!(%peer, error = %err, "connection closed before a request arrived");
            return;
        }
        Err(_) => {
            warn!(%peer, "timed out waiting for request");
            return;
        }
    };

    let response = match frame {
        Ok(frame) => {
            let dispatch = timeout(config.request_timeout, dispatcher.dispatch(&frame));
            tokio::select! {
                biased;
                outcome = dispatch => match outcome {
                    Ok(response) => response,
                    Err(_) => {
                        warn!(%peer, "request timed out; it may have committed before the deadline");
                        Response::from(&BankError::timed_out("request"))
                    }
                },
                // Dropping the dispatch future closes its reply channel, so a
                // settlement that has not reached its commit point is abandoned.
                () = peer_closed(&mut stream) => {
                    warn!(%peer, "peer disconnected, abandoning request");
                    return;
                }
            }
        }
        Err(err) => {
            warn!(%peer, error = %err, "rejected request frame");
            Response::from(&err)
        }
    };

    if let Err(err) = respond(&mut stream, &response, &config).await {
        warn!(%peer, error = %err, "failed to deliver response");
    }
}

/// Resolves once the peer closes its end of the connection. Bytes sent after
/// the request are discarded.
async fn peer_closed(stream: &mut TcpStream) {
    let mut scratch = [0u8; 64];
    loop {
        match stream.read(&mut scratch).await {
            Ok(0) | Err(_) => return,
            Ok(_) => continue,
        }
    }
}

async fn respond(stream: &mut TcpStream, response: &Response, config: &ServerConfig) -> Result<()> {
    let body = response.encode()?;
    timeout(config.io_timeout, write_frame(stream, &body))
        .await
        .map_err(|_| BankError::timed_out("write"))??;
    timeout(config.io_timeout, stream.shutdown())
        .await
        .map_err(|_| BankError::timed_out("shutdown"))??;
    Ok(())
}
