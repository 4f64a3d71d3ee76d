//! In-memory view model of the migration.
//!
//! The store owns three collections:
//!
//! - component records keyed by name (created on first sight, never removed)
//! - the progress history, oldest first, capped at `PROGRESS_HISTORY_LIMIT`
//! - the issue history, newest first, capped at `ISSUE_HISTORY_LIMIT`
//!
//! Every mutating operation returns the events it produced instead of
//! publishing them, so the caller can release its lock before fanning out.
//! Read accessors always hand out copies.

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::detect::{is_progress_milestone, is_significant_status_change};
use crate::events::{MilestoneEvent, StatusChange, StatusTransition, TrackerEvent};
use crate::message::{BatchItem, InboundMessage};
use crate::model::{
    ComponentStatus, Issue, IssueAlert, MigrationStatus, Milestone, PartialStatus, ProgressData,
    ProgressSnapshot,
};

/// Maximum number of progress snapshots kept
pub const PROGRESS_HISTORY_LIMIT: usize = 100;

/// Maximum number of issue alerts kept
pub const ISSUE_HISTORY_LIMIT: usize = 50;

/// Component statuses, progress history and issue alerts
#[derive(Debug, Default)]
pub struct StateStore {
    components: BTreeMap<String, ComponentStatus>,
    progress_history: VecDeque<ProgressSnapshot>,
    issue_alerts: VecDeque<IssueAlert>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route a validated message to the matching operation.
    ///
    /// Batch entries are applied in array order, each through the same path
    /// as its singular counterpart.
    pub fn apply(&mut self, message: InboundMessage) -> Vec<TrackerEvent> {
        match message {
            InboundMessage::InitialStatus { components } => {
                vec![self.apply_full_snapshot(components)]
            }
            InboundMessage::ComponentUpdate { component, status } => {
                self.apply_component_update(&component, &status)
            }
            InboundMessage::ProgressUpdate { progress } => {
                vec![self.apply_progress_snapshot(progress)]
            }
            InboundMessage::IssueAlert { component, issue } => {
                vec![self.apply_issue_alert(&component, issue)]
            }
            InboundMessage::MilestoneReached { milestone } => vec![self.apply_milestone(milestone)],
            InboundMessage::BatchUpdate { updates } => {
                let mut events = Vec::new();
                for update in updates {
                    match update {
                        BatchItem::ComponentStatus { component, status } => {
                            events.extend(self.apply_component_update(&component, &status));
                        }
                        BatchItem::Progress { data } => {
                            events.push(self.apply_progress_snapshot(data));
                        }
                        BatchItem::Unknown => {
                            tracing::debug!("Skipping batch entry with unknown type");
                        }
                    }
                }
                events
            }
        }
    }

    /// Merge every named partial over its existing record.
    pub fn apply_full_snapshot(
        &mut self,
        components: BTreeMap<String, PartialStatus>,
    ) -> TrackerEvent {
        let now = Utc::now();
        for (name, partial) in &components {
            let merged = ComponentStatus::merged(self.components.get(name), partial, now);
            self.components.insert(name.clone(), merged);
        }

        tracing::debug!("Applied snapshot for {} components", components.len());
        TrackerEvent::StatusChange(StatusChange::Batch { components })
    }

    /// Merge a delta into one component and derive transition/milestone events.
    ///
    /// A component seen for the first time never yields a transition or a
    /// milestone. When progress crosses several thresholds at once, a single
    /// milestone event is produced. The milestone event, when present,
    /// precedes the status-change event.
    pub fn apply_component_update(
        &mut self,
        name: &str,
        partial: &PartialStatus,
    ) -> Vec<TrackerEvent> {
        let now = Utc::now();
        let previous = self.components.get(name).cloned();
        let status = ComponentStatus::merged(previous.as_ref(), partial, now);
        self.components.insert(name.to_string(), status.clone());

        let mut events = Vec::new();
        let mut transition = None;

        if let Some(prev) = &previous {
            if prev.status != status.status {
                let significant = match (prev.status, status.status) {
                    (Some(from), Some(to)) => is_significant_status_change(from, to),
                    _ => false,
                };
                tracing::info!(
                    "Component {} status changed: {} -> {}",
                    name,
                    display_status(prev.status),
                    display_status(status.status)
                );
                transition = Some(StatusTransition {
                    from: prev.status,
                    to: status.status,
                    significant,
                });
            }

            if let (Some(old), Some(new)) = (prev.progress, status.progress) {
                if is_progress_milestone(old, new) {
                    events.push(TrackerEvent::MilestoneReached(MilestoneEvent::Progress {
                        component: name.to_string(),
                        progress: new,
                        timestamp: now,
                    }));
                }
            }
        }

        events.push(TrackerEvent::StatusChange(StatusChange::Single {
            component: name.to_string(),
            status,
            previous,
            transition,
        }));
        events
    }

    /// Append a progress snapshot, evicting the oldest past the limit.
    pub fn apply_progress_snapshot(&mut self, data: ProgressData) -> TrackerEvent {
        self.progress_history.push_back(ProgressSnapshot {
            data: data.clone(),
            timestamp: Utc::now(),
        });
        while self.progress_history.len() > PROGRESS_HISTORY_LIMIT {
            self.progress_history.pop_front();
        }
        TrackerEvent::ProgressUpdate(data)
    }

    /// Prepend a fresh, unacknowledged alert, evicting the oldest past the limit.
    pub fn apply_issue_alert(&mut self, component: &str, issue: Issue) -> TrackerEvent {
        let alert = IssueAlert {
            id: Uuid::new_v4(),
            component: component.to_string(),
            issue,
            timestamp: Utc::now(),
            acknowledged: false,
        };
        self.issue_alerts.push_front(alert.clone());
        self.issue_alerts.truncate(ISSUE_HISTORY_LIMIT);

        tracing::warn!(
            "Issue reported for {} ({}): {}",
            alert.component,
            alert.issue.severity,
            alert.issue.description
        );
        TrackerEvent::IssueDetected(alert)
    }

    /// Announced milestones are not stored, only forwarded.
    pub fn apply_milestone(&self, milestone: Milestone) -> TrackerEvent {
        TrackerEvent::MilestoneReached(MilestoneEvent::Announced(milestone))
    }

    /// Mark an alert as acknowledged. Unknown ids leave the store untouched.
    pub fn acknowledge_issue(&mut self, id: Uuid) -> bool {
        match self.issue_alerts.iter_mut().find(|a| a.id == id) {
            Some(alert) => {
                alert.acknowledged = true;
                true
            }
            None => false,
        }
    }

    pub fn component_status(&self, name: &str) -> Option<ComponentStatus> {
        self.components.get(name).cloned()
    }

    pub fn all_component_statuses(&self) -> BTreeMap<String, ComponentStatus> {
        self.components.clone()
    }

    /// Oldest first
    pub fn progress_history(&self) -> Vec<ProgressSnapshot> {
        self.progress_history.iter().cloned().collect()
    }

    /// Newest first
    pub fn issue_alerts(&self) -> Vec<IssueAlert> {
        self.issue_alerts.iter().cloned().collect()
    }

    /// Most recent progress snapshot, if any
    pub fn latest_progress(&self) -> Option<ProgressSnapshot> {
        self.progress_history.back().cloned()
    }

    /// Timestamp of the most recent component update
    pub fn last_component_update(&self) -> Option<DateTime<Utc>> {
        self.components.values().map(|c| c.last_updated).max()
    }

    /// Alerts not yet acknowledged
    pub fn unacknowledged_count(&self) -> usize {
        self.issue_alerts.iter().filter(|a| !a.acknowledged).count()
    }
}

fn display_status(status: Option<MigrationStatus>) -> String {
    status.map_or_else(|| "unset".to_string(), |s| s.to_string())
}
