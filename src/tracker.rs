//! The migration tracker: store, subscriptions and transport behind one handle.
//!
//! A `MigrationTracker` is constructed explicitly and shared as
//! `Arc<MigrationTracker>` with whatever presentation code needs it.
//! Every update runs the same path: decode, mutate the store under its lock,
//! release the lock, then publish the resulting events. Callbacks can
//! therefore read the tracker or change subscriptions while being notified.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::watch;
use uuid::Uuid;

use crate::events::{Callback, Dispatcher, EventCategory};
use crate::message::{InboundMessage, decode};
use crate::model::{ComponentStatus, IssueAlert, ProgressSnapshot};
use crate::store::StateStore;
use crate::transport::{
    ConnectionState, FetchError, TrackerOptions, TransportAdapter, UpdateSink, Visibility,
};

/// Live view of the migration
#[derive(Default)]
pub struct MigrationTracker {
    store: Mutex<StateStore>,
    dispatcher: Dispatcher,
    transport: Mutex<Option<TransportAdapter>>,
}

/// Sink handed to the transport; does not keep the tracker alive
struct TrackerSink(Weak<MigrationTracker>);

impl UpdateSink for TrackerSink {
    fn handle_message(&self, message: InboundMessage) {
        if let Some(tracker) = self.0.upgrade() {
            tracker.handle_message(message);
        }
    }
}

impl MigrationTracker {
    /// A tracker with an empty store and no transport
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Create a tracker and connect it with the given options.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(options: TrackerOptions) -> Result<Arc<Self>, FetchError> {
        let tracker = Self::new();
        tracker.start(options)?;
        Ok(tracker)
    }

    /// Start the transport. Any previously started transport is torn down first.
    pub fn start(self: &Arc<Self>, options: TrackerOptions) -> Result<(), FetchError> {
        let mut transport = self.transport.lock();
        if let Some(mut previous) = transport.take() {
            previous.teardown();
        }

        let sink = Arc::new(TrackerSink(Arc::downgrade(self)));
        *transport = Some(TransportAdapter::start(options, sink)?);
        Ok(())
    }

    /// Apply a validated message and notify subscribers
    pub fn handle_message(&self, message: InboundMessage) {
        let kind = message.kind();
        let events = self.store.lock().apply(message);
        tracing::trace!("Applied {} ({} events)", kind, events.len());
        self.dispatcher.publish_all(&events);
    }

    /// Decode a raw frame and apply it.
    ///
    /// Returns false when the frame was dropped (malformed or unknown type).
    pub fn handle_frame(&self, text: &str) -> bool {
        match decode(text) {
            Ok(Some(message)) => {
                self.handle_message(message);
                true
            }
            Ok(None) => false,
            Err(e) => {
                tracing::warn!("Dropping malformed update: {}", e);
                false
            }
        }
    }

    pub fn subscribe(&self, category: EventCategory, callback: Callback) {
        self.dispatcher.subscribe(category, callback);
    }

    pub fn unsubscribe(&self, category: EventCategory, callback: &Callback) -> bool {
        self.dispatcher.unsubscribe(category, callback)
    }

    pub fn get_component_status(&self, name: &str) -> Option<ComponentStatus> {
        self.store.lock().component_status(name)
    }

    pub fn get_all_component_statuses(&self) -> BTreeMap<String, ComponentStatus> {
        self.store.lock().all_component_statuses()
    }

    pub fn get_progress_history(&self) -> Vec<ProgressSnapshot> {
        self.store.lock().progress_history()
    }

    pub fn get_issue_alerts(&self) -> Vec<IssueAlert> {
        self.store.lock().issue_alerts()
    }

    pub fn latest_progress(&self) -> Option<ProgressSnapshot> {
        self.store.lock().latest_progress()
    }

    pub fn unacknowledged_issue_count(&self) -> usize {
        self.store.lock().unacknowledged_count()
    }

    /// Mark an alert acknowledged; unknown ids are ignored
    pub fn acknowledge_issue(&self, id: Uuid) -> bool {
        let found = self.store.lock().acknowledge_issue(id);
        if !found {
            tracing::debug!("Acknowledge for unknown issue {}", id);
        }
        found
    }

    /// Current push-channel state (`Closed` when no transport runs)
    pub fn connection_state(&self) -> ConnectionState {
        self.transport
            .lock()
            .as_ref()
            .map_or(ConnectionState::Closed, TransportAdapter::state)
    }

    /// Observe connection state changes, if a transport is running
    pub fn watch_connection(&self) -> Option<watch::Receiver<ConnectionState>> {
        self.transport.lock().as_ref().map(TransportAdapter::watch_state)
    }

    /// Forward a host visibility change to the transport
    pub fn set_visibility(&self, visibility: Visibility) {
        if let Some(transport) = self.transport.lock().as_ref() {
            transport.set_visibility(visibility);
        }
    }

    /// Close the connection, cancel both timers and drop all subscriptions.
    ///
    /// The store keeps its contents; it can still be read after teardown.
    pub fn teardown(&self) {
        if let Some(mut transport) = self.transport.lock().take() {
            transport.teardown();
        }
        self.dispatcher.clear();
        tracing::info!("Migration tracker torn down");
    }

    /// Like `teardown`, but waits for the connection to close.
    pub async fn shutdown(&self) {
        let transport = self.transport.lock().take();
        self.dispatcher.clear();
        if let Some(transport) = transport {
            transport.shutdown().await;
        }
        tracing::info!("Migration tracker shut down");
    }
}
