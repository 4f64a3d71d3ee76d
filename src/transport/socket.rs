//! Push-channel connection loop.
//!
//! Keeps at most one WebSocket session open. On open it requests the current
//! status; every text frame is decoded and forwarded to the sink. When the
//! session ends, or the connection attempt fails, the loop waits
//! `reconnect_delay` (or until an early-reconnect nudge) and tries again.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::{Notify, watch};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use super::{ConnectionState, UpdateSink};
use crate::message::{OutboundMessage, decode};

/// Upper bound for sending the close frame on shutdown
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// How a session ended
#[derive(Debug)]
enum SessionEnd {
    /// Server closed the connection or the stream ended
    Closed,
    /// Read or write failure
    Failed(String),
    /// Teardown was requested
    Shutdown,
}

/// Everything the connection loop needs, moved into its task
pub(super) struct ConnectionLoop {
    pub url: String,
    pub reconnect_delay: Duration,
    pub sink: Arc<dyn UpdateSink>,
    pub state_tx: watch::Sender<ConnectionState>,
    pub reconnect_now: Arc<Notify>,
    pub shutdown: watch::Receiver<bool>,
}

impl ConnectionLoop {
    pub async fn run(mut self) {
        loop {
            if *self.shutdown.borrow() {
                break;
            }

            self.state_tx.send_replace(ConnectionState::Connecting);
            let connect = tokio::select! {
                result = connect_async(self.url.as_str()) => result,
                _ = self.shutdown.changed() => break,
            };

            match connect {
                Ok((stream, _)) => {
                    tracing::info!("Connected to migration status socket at {}", self.url);
                    self.state_tx.send_replace(ConnectionState::Open);

                    match self.run_session(stream).await {
                        SessionEnd::Shutdown => break,
                        SessionEnd::Closed => {
                            tracing::info!("Migration status socket disconnected");
                            self.state_tx.send_replace(ConnectionState::Closed);
                        }
                        SessionEnd::Failed(e) => {
                            tracing::error!("Migration status socket error: {}", e);
                            self.state_tx.send_replace(ConnectionState::Error);
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to connect to {}: {}", self.url, e);
                    self.state_tx.send_replace(ConnectionState::Error);
                }
            }

            tracing::debug!("Reconnecting in {:?}", self.reconnect_delay);
            let reconnect_now = Arc::clone(&self.reconnect_now);
            tokio::select! {
                _ = tokio::time::sleep(self.reconnect_delay) => {}
                _ = reconnect_now.notified() => {
                    tracing::debug!("Reconnecting early");
                }
                _ = self.shutdown.changed() => break,
            }
        }

        self.state_tx.send_replace(ConnectionState::Closed);
        tracing::debug!("Connection loop stopped");
    }

    async fn run_session<S>(&mut self, stream: S) -> SessionEnd
    where
        S: futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
            + futures::Sink<Message, Error = tokio_tungstenite::tungstenite::Error>
            + Unpin,
    {
        let (mut write, mut read) = stream.split();

        match OutboundMessage::request_status().to_json() {
            Ok(json) => {
                if let Err(e) = write.send(Message::Text(json)).await {
                    return SessionEnd::Failed(e.to_string());
                }
            }
            Err(e) => tracing::warn!("Failed to encode status request: {}", e),
        }

        loop {
            tokio::select! {
                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => deliver(&text, self.sink.as_ref()),
                    Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                        Ok(text) => deliver(&text, self.sink.as_ref()),
                        Err(_) => tracing::warn!("Dropping non-UTF-8 binary frame"),
                    },
                    Some(Ok(Message::Close(_))) | None => return SessionEnd::Closed,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return SessionEnd::Failed(e.to_string()),
                },
                _ = self.shutdown.changed() => {
                    if tokio::time::timeout(CLOSE_TIMEOUT, write.send(Message::Close(None)))
                        .await
                        .is_err()
                    {
                        tracing::debug!("Timed out sending close frame");
                    }
                    return SessionEnd::Shutdown;
                }
            }
        }
    }
}

/// Decode one frame and hand it to the sink. Malformed frames are dropped.
pub(super) fn deliver(text: &str, sink: &dyn UpdateSink) {
    match decode(text) {
        Ok(Some(message)) => sink.handle_message(message),
        Ok(None) => {}
        Err(e) => tracing::warn!("Dropping malformed update: {}", e),
    }
}
