//! TCP accept loop and per-connection handling.
//!
//! One task per inbound connection, one request per connection. The
//! notification endpoint keeps its connection open until the client
//! disconnects; everything else answers and closes. Connection-level
//! failures are logged and never take the accept loop down.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use protocol::http::{Request, Response};
use protocol::HttpError;

use crate::router::Router;

/// The daemon's HTTP listener.
pub struct Server {
    listener: TcpListener,
    router: Arc<Router>,
}

impl Server {
    /// Bind the listener. Port 0 binds an ephemeral port; the actual
    /// address is available via [`Server::local_addr`].
    pub async fn bind(addr: SocketAddr, router: Arc<Router>) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, "Listening");
        Ok(Self { listener, router })
    }

    /// The address the listener is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until the task is cancelled.
    pub async fn run(self) -> io::Result<()> {
        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    // Transient accept failures (EMFILE and friends) should
                    // not kill the daemon.
                    warn!(error = %e, "Failed to accept connection");
                    continue;
                }
            };
            let router = Arc::clone(&self.router);
            tokio::spawn(async move {
                handle_connection(router, stream, peer).await;
            });
        }
    }
}

/// Parse one request off the stream and dispatch it.
async fn handle_connection(router: Arc<Router>, stream: TcpStream, peer: SocketAddr) {
    let (read_half, mut write_half) = tokio::io::split(stream);
    let mut reader = BufReader::new(read_half);

    let request = match Request::read_from(&mut reader).await {
        Ok(Some(request)) => request,
        Ok(None) => {
            // Peer connected and went away without sending anything.
            debug!(%peer, "Connection closed before request");
            return;
        }
        Err(e) => {
            debug!(%peer, error = %e, "Rejecting unparseable request");
            send_error_reply(&mut write_half, &e).await;
            return;
        }
    };

    debug!(%peer, path = %request.path, "Request received");

    if let Err(e) = router.dispatch(request, reader, &mut write_half).await {
        match &e {
            // Client disconnects on long-lived streams land here; routine.
            HttpError::Io(io_err) => {
                debug!(%peer, error = %io_err, "Connection I/O ended");
            }
            other => {
                debug!(%peer, error = %other, "Request failed at transport layer");
                send_error_reply(&mut write_half, other).await;
            }
        }
    }

    let _ = write_half.shutdown().await;
}

/// Best-effort error response; the peer may already be gone.
async fn send_error_reply<W>(writer: &mut W, error: &HttpError)
where
    W: tokio::io::AsyncWrite + Unpin,
{
    let response = Response::error(error.status(), error.to_string());
    if let Err(e) = response.send(writer).await {
        debug!(error = %e, "Could not deliver error response");
    }
}
