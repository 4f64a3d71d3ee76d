//! Transport adapter: push channel with reconnect, plus HTTP polling fallback.
//!
//! This module handles:
//! - Owning one WebSocket connection at a time, reconnecting after a fixed delay
//! - Polling `GET {api}/status` every `update_interval` while the socket is not open
//! - Loading the component list once on start
//! - Reconnecting immediately when the page becomes visible again
//!
//! Decoded updates are handed to an `UpdateSink`; transport and decode
//! failures are logged and never reach the sink.

mod poll;
mod socket;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{Notify, watch};
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

pub use poll::{ComponentListing, FetchError, StatusClient, components_snapshot};

use crate::message::InboundMessage;
use crate::task::ScheduledTask;
use socket::ConnectionLoop;

/// Default push-channel endpoint
pub const DEFAULT_WEBSOCKET_URL: &str = "ws://localhost:8081";

/// Default REST API base
pub const DEFAULT_API_URL: &str = "http://localhost:8080/api";

/// Default polling interval
pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_millis(30_000);

/// Delay before each reconnect attempt
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(5_000);

/// Grace period for the connection loop to close cleanly on shutdown
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Receives validated updates from the transport
pub trait UpdateSink: Send + Sync + 'static {
    fn handle_message(&self, message: InboundMessage);
}

/// Connection settings
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerOptions {
    pub websocket_url: String,
    pub api_url: String,
    pub update_interval: Duration,
    pub reconnect_delay: Duration,
    pub load_components_on_start: bool,
}

impl Default for TrackerOptions {
    fn default() -> Self {
        Self {
            websocket_url: DEFAULT_WEBSOCKET_URL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            update_interval: DEFAULT_UPDATE_INTERVAL,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            load_components_on_start: true,
        }
    }
}

impl TrackerOptions {
    /// Site root: the API base with its `/api` suffix removed
    pub fn site_url(&self) -> &str {
        let base = self.api_url.trim_end_matches('/');
        base.strip_suffix("/api").unwrap_or(base)
    }

    pub fn dashboard_url(&self) -> String {
        format!("{}/", self.site_url())
    }

    pub fn issue_url(&self, id: &Uuid) -> String {
        format!("{}/issues/{}", self.site_url(), id)
    }

    pub fn component_url(&self, name: &str) -> String {
        format!("{}/component/{}", self.site_url(), name)
    }
}

/// State of the push channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
    Error,
}

impl ConnectionState {
    /// Short label for status displays
    pub fn label(&self) -> &'static str {
        match self {
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Open => "Live",
            ConnectionState::Closed => "Offline",
            ConnectionState::Error => "Error",
        }
    }
}

/// Host page visibility
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
}

/// Owns the connection loop, the polling loop and the initial component load.
///
/// Dropping the adapter tears it down.
pub struct TransportAdapter {
    state_rx: watch::Receiver<ConnectionState>,
    shutdown_tx: watch::Sender<bool>,
    reconnect_now: Arc<Notify>,
    visibility: Mutex<Visibility>,
    connection: ScheduledTask,
    poller: ScheduledTask,
    loader: ScheduledTask,
}

impl TransportAdapter {
    /// Start the background tasks on the current tokio runtime.
    pub fn start(options: TrackerOptions, sink: Arc<dyn UpdateSink>) -> Result<Self, FetchError> {
        let client = StatusClient::new(&options.api_url)?;

        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let reconnect_now = Arc::new(Notify::new());

        tracing::info!(
            "Starting transport (socket {}, api {}, poll every {:?})",
            options.websocket_url,
            options.api_url,
            options.update_interval
        );

        // Runs on its own so a slow or hung response cannot hold back polling
        let loader = if options.load_components_on_start {
            ScheduledTask::spawn(
                "component load",
                load_components(client.clone(), Arc::clone(&sink)),
            )
        } else {
            ScheduledTask::idle("component load")
        };

        let poller = ScheduledTask::spawn(
            "status poll",
            poll_loop(
                client,
                options.update_interval,
                state_rx.clone(),
                Arc::clone(&sink),
            ),
        );

        let connection = ScheduledTask::spawn(
            "connection",
            ConnectionLoop {
                url: options.websocket_url.clone(),
                reconnect_delay: options.reconnect_delay,
                sink,
                state_tx,
                reconnect_now: Arc::clone(&reconnect_now),
                shutdown: shutdown_rx,
            }
            .run(),
        );

        Ok(Self {
            state_rx,
            shutdown_tx,
            reconnect_now,
            visibility: Mutex::new(Visibility::Visible),
            connection,
            poller,
            loader,
        })
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Receiver that observes every connection state change
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Record a visibility change. Hidden to visible while not connected
    /// triggers an immediate reconnect instead of waiting for the timer.
    pub fn set_visibility(&self, visibility: Visibility) {
        let previous = std::mem::replace(&mut *self.visibility.lock(), visibility);
        if previous == Visibility::Hidden
            && visibility == Visibility::Visible
            && self.state() != ConnectionState::Open
        {
            tracing::debug!("Page visible again, reconnecting now");
            self.reconnect_now.notify_waiters();
        }
    }

    /// Stop polling and loading, and signal the connection loop to close. Idempotent.
    ///
    /// The connection loop sends a close frame and exits on its own; use
    /// `shutdown` to wait for it.
    pub fn teardown(&mut self) {
        self.shutdown_tx.send_replace(true);
        self.poller.cancel();
        self.loader.cancel();
    }

    /// Teardown, then wait for the connection loop to finish.
    pub async fn shutdown(mut self) {
        self.teardown();
        self.connection.join(SHUTDOWN_GRACE).await;
        tracing::info!("Transport stopped");
    }
}

impl Drop for TransportAdapter {
    fn drop(&mut self) {
        self.teardown();
    }
}

async fn load_components(client: StatusClient, sink: Arc<dyn UpdateSink>) {
    match client.fetch_components().await {
        Ok(listing) => sink.handle_message(InboundMessage::InitialStatus {
            components: components_snapshot(listing),
        }),
        Err(e) => tracing::warn!("Failed to load component list: {}", e),
    }
}

async fn poll_loop(
    client: StatusClient,
    interval: Duration,
    state_rx: watch::Receiver<ConnectionState>,
    sink: Arc<dyn UpdateSink>,
) {
    // `interval` panics on a zero period
    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; polling starts one interval in
    ticker.tick().await;

    loop {
        ticker.tick().await;

        if *state_rx.borrow() == ConnectionState::Open {
            continue;
        }

        match client.fetch_status().await {
            Ok(progress) => sink.handle_message(InboundMessage::ProgressUpdate { progress }),
            Err(e) => tracing::warn!("Failed to fetch status update: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;
    use tokio_tungstenite::tungstenite::Message;

    use futures::{SinkExt, StreamExt};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Forwards every message into a channel
    struct ChannelSink(mpsc::UnboundedSender<InboundMessage>);

    impl UpdateSink for ChannelSink {
        fn handle_message(&self, message: InboundMessage) {
            let _ = self.0.send(message);
        }
    }

    fn channel_sink() -> (Arc<dyn UpdateSink>, mpsc::UnboundedReceiver<InboundMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(ChannelSink(tx)), rx)
    }

    /// An address nothing listens on
    async fn dead_address() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        addr.to_string()
    }

    /// Minimal HTTP server answering every request with `body`
    async fn serve_json(body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                tokio::spawn(async move {
                    let mut buf = [0u8; 2048];
                    let _ = socket.read(&mut buf).await;
                    let response = format!(
                        "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        format!("http://{}/api", addr)
    }

    /// HTTP server that counts `/status` requests. `/components` answers
    /// with an empty list, or never answers when `hang_components` is set.
    async fn serve_counting(
        status_body: &'static str,
        hang_components: bool,
    ) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let counter = Arc::clone(&counter);
                tokio::spawn(async move {
                    let mut buf = [0u8; 2048];
                    let n = socket.read(&mut buf).await.unwrap_or(0);
                    let request = String::from_utf8_lossy(&buf[..n]).to_string();
                    let request_line = request.lines().next().unwrap_or_default();

                    let body = if request_line.contains("/components") {
                        if hang_components {
                            std::future::pending::<()>().await;
                        }
                        r#"{"components":[]}"#
                    } else {
                        counter.fetch_add(1, Ordering::SeqCst);
                        status_body
                    };
                    let response = format!(
                        "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        (format!("http://{}/api", addr), hits)
    }

    /// WebSocket server that keeps every session open and counts accepts
    async fn serve_socket() -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let ws = format!("ws://{}", listener.local_addr().unwrap());
        let accepts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&accepts);
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(async move {
                    let Ok(mut socket) = tokio_tungstenite::accept_async(stream).await else {
                        return;
                    };
                    while let Some(Ok(_)) = socket.next().await {}
                });
            }
        });
        (ws, accepts)
    }

    async fn wait_for_hits(hits: &AtomicUsize, wanted: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while hits.load(Ordering::SeqCst) < wanted {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("timed out waiting for status requests");
    }

    fn options(websocket_url: String, api_url: String) -> TrackerOptions {
        TrackerOptions {
            websocket_url,
            api_url,
            update_interval: Duration::from_millis(50),
            reconnect_delay: Duration::from_millis(50),
            load_components_on_start: false,
        }
    }

    async fn wait_for_state(adapter: &TransportAdapter, wanted: ConnectionState) {
        let mut rx = adapter.watch_state();
        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| *s == wanted))
            .await
            .expect("timed out waiting for connection state")
            .unwrap();
    }

    #[test]
    fn test_detail_urls() {
        let options = TrackerOptions::default();
        assert_eq!(options.site_url(), "http://localhost:8080");
        assert_eq!(options.dashboard_url(), "http://localhost:8080/");
        assert_eq!(
            options.component_url("leads"),
            "http://localhost:8080/component/leads"
        );
        let id = Uuid::nil();
        assert_eq!(
            options.issue_url(&id),
            format!("http://localhost:8080/issues/{}", id)
        );
    }

    #[test]
    fn test_default_options() {
        let options = TrackerOptions::default();
        assert_eq!(options.update_interval, Duration::from_millis(30_000));
        assert_eq!(options.reconnect_delay, Duration::from_millis(5_000));
        assert_eq!(options.websocket_url, "ws://localhost:8081");
    }

    #[tokio::test]
    async fn test_polls_while_socket_is_down() {
        let ws = format!("ws://{}", dead_address().await);
        let api = serve_json(r#"{"overall_progress":37.5,"total_components":8}"#).await;
        let (sink, mut rx) = channel_sink();

        let adapter = TransportAdapter::start(options(ws, api), sink).unwrap();
        let message = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("no poll result")
            .unwrap();

        let InboundMessage::ProgressUpdate { progress } = message else {
            panic!("expected progress update, got {:?}", message);
        };
        assert_eq!(progress.overall_progress, 37.5);
        assert_ne!(adapter.state(), ConnectionState::Open);
        adapter.shutdown().await;
    }

    #[tokio::test]
    async fn test_loads_components_on_start() {
        let ws = format!("ws://{}", dead_address().await);
        let api = serve_json(r#"{"components":[{"name":"leads","status":"testing","priority":"high"}]}"#).await;
        let (sink, mut rx) = channel_sink();

        let mut opts = options(ws, api);
        opts.load_components_on_start = true;
        opts.update_interval = Duration::from_secs(60);
        let adapter = TransportAdapter::start(opts, sink).unwrap();

        let message = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("no component load")
            .unwrap();
        let InboundMessage::InitialStatus { components } = message else {
            panic!("expected initial status, got {:?}", message);
        };
        assert!(components.contains_key("leads"));
        adapter.shutdown().await;
    }

    #[tokio::test]
    async fn test_socket_session_requests_status_and_forwards_frames() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let ws = format!("ws://{}", listener.local_addr().unwrap());
        let (request_tx, mut request_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut socket = tokio_tungstenite::accept_async(stream).await.unwrap();
            if let Some(Ok(Message::Text(text))) = socket.next().await {
                let _ = request_tx.send(text);
            }
            socket
                .send(Message::Text("not json".to_string()))
                .await
                .unwrap();
            socket
                .send(Message::Text(r#"{"type":"unknown_kind"}"#.to_string()))
                .await
                .unwrap();
            socket
                .send(Message::Text(
                    r#"{"type":"component_update","component":"leads","status":{"progress":30}}"#
                        .to_string(),
                ))
                .await
                .unwrap();
            // Hold the connection open until the client leaves
            while let Some(Ok(_)) = socket.next().await {}
        });

        let api = format!("http://{}/api", dead_address().await);
        let (sink, mut rx) = channel_sink();
        let adapter = TransportAdapter::start(options(ws, api), sink).unwrap();

        let request = tokio::time::timeout(Duration::from_secs(5), request_rx.recv())
            .await
            .expect("no status request")
            .unwrap();
        let request: serde_json::Value = serde_json::from_str(&request).unwrap();
        assert_eq!(request["type"], "request_status");

        let message = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("no forwarded frame")
            .unwrap();
        assert!(matches!(
            message,
            InboundMessage::ComponentUpdate { ref component, .. } if component == "leads"
        ));
        assert_eq!(adapter.state(), ConnectionState::Open);

        adapter.shutdown().await;
    }

    #[tokio::test]
    async fn test_reconnects_after_server_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let ws = format!("ws://{}", listener.local_addr().unwrap());
        let (accept_tx, mut accept_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            for round in 0..2 {
                let (stream, _) = listener.accept().await.unwrap();
                let mut socket = tokio_tungstenite::accept_async(stream).await.unwrap();
                let _ = accept_tx.send(round);
                if round == 0 {
                    let _ = socket.close(None).await;
                } else {
                    while let Some(Ok(_)) = socket.next().await {}
                }
            }
        });

        let api = format!("http://{}/api", dead_address().await);
        let (sink, _rx) = channel_sink();
        let adapter = TransportAdapter::start(options(ws, api), sink).unwrap();

        for expected in 0..2 {
            let round = tokio::time::timeout(Duration::from_secs(5), accept_rx.recv())
                .await
                .expect("no connection")
                .unwrap();
            assert_eq!(round, expected);
        }
        wait_for_state(&adapter, ConnectionState::Open).await;
        adapter.shutdown().await;
    }

    #[tokio::test]
    async fn test_visibility_triggers_early_reconnect() {
        let addr = dead_address().await;
        let ws = format!("ws://{}", addr);
        let api = format!("http://{}/api", dead_address().await);
        let (sink, _rx) = channel_sink();

        let mut opts = options(ws, api);
        opts.reconnect_delay = Duration::from_secs(600);
        let adapter = TransportAdapter::start(opts, sink).unwrap();
        wait_for_state(&adapter, ConnectionState::Error).await;

        let listener = TcpListener::bind(&addr).await.unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut socket = tokio_tungstenite::accept_async(stream).await.unwrap();
            while let Some(Ok(_)) = socket.next().await {}
        });

        // Visible -> visible is not a transition
        adapter.set_visibility(Visibility::Visible);
        adapter.set_visibility(Visibility::Hidden);
        adapter.set_visibility(Visibility::Visible);

        wait_for_state(&adapter, ConnectionState::Open).await;
        adapter.shutdown().await;
    }

    #[tokio::test]
    async fn test_teardown_stops_loops() {
        let ws = format!("ws://{}", dead_address().await);
        let api = format!("http://{}/api", dead_address().await);
        let (sink, _rx) = channel_sink();

        let mut adapter = TransportAdapter::start(options(ws, api), sink).unwrap();
        adapter.teardown();
        adapter.teardown();
        assert!(!adapter.poller.is_running());

        wait_for_state(&adapter, ConnectionState::Closed).await;
        assert!(adapter.connection.join(Duration::from_secs(5)).await);
    }

    #[tokio::test]
    async fn test_drop_stops_polling() {
        let ws = format!("ws://{}", dead_address().await);
        let (api, hits) = serve_counting(r#"{"overall_progress":10}"#, false).await;
        let (sink, _rx) = channel_sink();

        let mut opts = options(ws, api);
        opts.update_interval = Duration::from_millis(30);
        let adapter = TransportAdapter::start(opts, sink).unwrap();
        wait_for_hits(&hits, 2).await;

        drop(adapter);
        let at_drop = hits.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(300)).await;

        // At most one request may already have been in flight
        assert!(hits.load(Ordering::SeqCst) <= at_drop + 1);
    }

    #[tokio::test]
    async fn test_hung_component_load_does_not_block_polling() {
        let ws = format!("ws://{}", dead_address().await);
        let (api, hits) = serve_counting(r#"{"overall_progress":55}"#, true).await;
        let (sink, mut rx) = channel_sink();

        let mut opts = options(ws, api);
        opts.update_interval = Duration::from_millis(30);
        opts.load_components_on_start = true;
        let adapter = TransportAdapter::start(opts, sink).unwrap();

        let message = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("polling never started")
            .unwrap();
        assert!(matches!(message, InboundMessage::ProgressUpdate { .. }));
        assert!(hits.load(Ordering::SeqCst) >= 1);
        assert!(adapter.loader.is_running());

        adapter.shutdown().await;
    }

    #[tokio::test]
    async fn test_no_polling_while_open() {
        let (ws, _accepts) = serve_socket().await;
        let (api, hits) = serve_counting(r#"{"overall_progress":10}"#, false).await;
        let (sink, _rx) = channel_sink();

        let mut opts = options(ws, api);
        opts.update_interval = Duration::from_millis(30);
        let adapter = TransportAdapter::start(opts, sink).unwrap();
        wait_for_state(&adapter, ConnectionState::Open).await;

        let before = hits.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(hits.load(Ordering::SeqCst), before);
        assert_eq!(adapter.state(), ConnectionState::Open);

        adapter.shutdown().await;
    }

    #[tokio::test]
    async fn test_visibility_while_open_keeps_session() {
        let (ws, accepts) = serve_socket().await;
        let api = format!("http://{}/api", dead_address().await);
        let (sink, _rx) = channel_sink();

        let adapter = TransportAdapter::start(options(ws, api), sink).unwrap();
        wait_for_state(&adapter, ConnectionState::Open).await;

        adapter.set_visibility(Visibility::Hidden);
        adapter.set_visibility(Visibility::Visible);
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(accepts.load(Ordering::SeqCst), 1);
        assert_eq!(adapter.state(), ConnectionState::Open);

        adapter.shutdown().await;
    }
}
