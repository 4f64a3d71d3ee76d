//! Tracker events and the subscription registry that fans them out.
//!
//! Four independent categories exist. Callbacks run synchronously, in
//! registration order, on the thread that publishes. A panicking callback is
//! logged and skipped; the remaining callbacks of the same publish still run.

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::model::{
    ComponentStatus, IssueAlert, MigrationStatus, Milestone, PartialStatus, ProgressData,
};

/// Subscription category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    StatusChange,
    ProgressUpdate,
    IssueDetected,
    MilestoneReached,
}

impl EventCategory {
    pub const ALL: [EventCategory; 4] = [
        EventCategory::StatusChange,
        EventCategory::ProgressUpdate,
        EventCategory::IssueDetected,
        EventCategory::MilestoneReached,
    ];

    fn index(self) -> usize {
        match self {
            EventCategory::StatusChange => 0,
            EventCategory::ProgressUpdate => 1,
            EventCategory::IssueDetected => 2,
            EventCategory::MilestoneReached => 3,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            EventCategory::StatusChange => "status_change",
            EventCategory::ProgressUpdate => "progress_update",
            EventCategory::IssueDetected => "issue_detected",
            EventCategory::MilestoneReached => "milestone_reached",
        }
    }
}

/// A change of the `status` field between two records of the same component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusTransition {
    pub from: Option<MigrationStatus>,
    pub to: Option<MigrationStatus>,
    /// On the allow-list of notification-worthy transitions
    pub significant: bool,
}

/// Payload of the status-change category
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StatusChange {
    /// A full snapshot was merged
    Batch {
        components: BTreeMap<String, PartialStatus>,
    },
    /// One component was updated
    Single {
        component: String,
        status: ComponentStatus,
        previous: Option<ComponentStatus>,
        /// Set when a previous record existed and its status differs
        transition: Option<StatusTransition>,
    },
}

/// Payload of the milestone category
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MilestoneEvent {
    /// Derived: a component's progress crossed a threshold
    Progress {
        component: String,
        progress: u32,
        timestamp: DateTime<Utc>,
    },
    /// Announced by the backend, forwarded verbatim
    Announced(Milestone),
}

/// Everything the tracker publishes to subscribers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum TrackerEvent {
    StatusChange(StatusChange),
    ProgressUpdate(ProgressData),
    IssueDetected(IssueAlert),
    MilestoneReached(MilestoneEvent),
}

impl TrackerEvent {
    pub fn category(&self) -> EventCategory {
        match self {
            TrackerEvent::StatusChange(_) => EventCategory::StatusChange,
            TrackerEvent::ProgressUpdate(_) => EventCategory::ProgressUpdate,
            TrackerEvent::IssueDetected(_) => EventCategory::IssueDetected,
            TrackerEvent::MilestoneReached(_) => EventCategory::MilestoneReached,
        }
    }
}

/// Subscriber callback. Identity is the `Arc` allocation.
pub type Callback = Arc<dyn Fn(&TrackerEvent) + Send + Sync>;

/// Wrap a closure as a `Callback`
pub fn callback<F>(f: F) -> Callback
where
    F: Fn(&TrackerEvent) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Per-category subscription lists
#[derive(Default)]
pub struct Dispatcher {
    lists: Mutex<[Vec<Callback>; 4]>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a callback. Registering the same handle twice makes it fire twice.
    pub fn subscribe(&self, category: EventCategory, callback: Callback) {
        self.lists.lock()[category.index()].push(callback);
    }

    /// Remove the first registration of `callback`. Returns false if it was not registered.
    pub fn unsubscribe(&self, category: EventCategory, callback: &Callback) -> bool {
        let mut lists = self.lists.lock();
        let list = &mut lists[category.index()];
        match list.iter().position(|c| Arc::ptr_eq(c, callback)) {
            Some(index) => {
                list.remove(index);
                true
            }
            None => false,
        }
    }

    /// Number of registrations in a category
    pub fn subscriber_count(&self, category: EventCategory) -> usize {
        self.lists.lock()[category.index()].len()
    }

    /// Drop every registration in every category
    pub fn clear(&self) {
        for list in self.lists.lock().iter_mut() {
            list.clear();
        }
    }

    /// Deliver an event to the callbacks registered for its category.
    ///
    /// The list is snapshotted first, so callbacks may subscribe or
    /// unsubscribe without deadlocking. Returns the number of callbacks that
    /// panicked.
    pub fn publish(&self, event: &TrackerEvent) -> usize {
        let category = event.category();
        let callbacks = self.lists.lock()[category.index()].clone();

        let mut failures = 0;
        for callback in callbacks {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| callback(event))) {
                failures += 1;
                tracing::error!(
                    "Error in {} callback: {}",
                    category.name(),
                    panic_message(payload.as_ref())
                );
            }
        }
        failures
    }

    /// Publish a sequence of events in order
    pub fn publish_all(&self, events: &[TrackerEvent]) {
        for event in events {
            self.publish(event);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
