//! Per-connection notification stream.
//!
//! Each open `/events` connection drains one bus subscription and forwards
//! events as server-sent-event frames, emitting a keep-alive comment when
//! idle. The subscription deregisters on drop, so any exit from [`run`] -
//! client disconnect, bus prune, write failure - cleans up the queue.

use std::io;
use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

use protocol::http::{sse_comment, sse_event};
use protocol::messages::{ChangeEvent, EVENT_CONNECTED};

use super::bus::Subscription;

/// Default idle interval between keep-alive comments.
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(30);

/// One client's long-lived event push loop.
#[derive(Debug)]
pub struct NotificationStream {
    subscription: Subscription,
    keep_alive: Duration,
}

impl NotificationStream {
    /// Wrap a bus subscription with the given idle keep-alive interval.
    pub fn new(subscription: Subscription, keep_alive: Duration) -> Self {
        Self {
            subscription,
            keep_alive,
        }
    }

    /// Drive the stream until the client disconnects or the bus drops us.
    ///
    /// The caller has already written the `text/event-stream` response head.
    pub async fn run<W: AsyncWrite + Unpin>(mut self, writer: &mut W) -> io::Result<()> {
        let id = self.subscription.id();

        // Tell the client the stream is live before any event arrives.
        let hello = ChangeEvent {
            kind: EVENT_CONNECTED.to_string(),
            path: String::new(),
        };
        writer.write_all(sse_event(&hello).as_bytes()).await?;
        writer.flush().await?;

        loop {
            match timeout(self.keep_alive, self.subscription.recv()).await {
                Ok(Some(event)) => {
                    tracing::trace!(subscriber = %id, path = %event.path, "Forwarding change event");
                    writer.write_all(sse_event(&event).as_bytes()).await?;
                    writer.flush().await?;
                }
                Ok(None) => {
                    // The bus pruned us (queue overflow); end the stream so
                    // the client reconnects with a fresh queue.
                    tracing::debug!(subscriber = %id, "Subscription closed by bus");
                    return Ok(());
                }
                Err(_) => {
                    // Idle: a comment keeps proxies and the socket alive and
                    // doubles as disconnect detection via the write result.
                    writer.write_all(sse_comment("keep-alive").as_bytes()).await?;
                    writer.flush().await?;
                }
            }
        }
    }
}
