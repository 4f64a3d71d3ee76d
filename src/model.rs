//! Data model for the migration view.
//!
//! This module provides:
//!
//! - `MigrationStatus`, `Priority` and `Severity`: the closed vocabularies used on the wire
//! - `PartialStatus`: a status delta as pushed by the tracker backend (every field optional)
//! - `ComponentStatus`: the merged, stored record for one component
//! - `ProgressData` / `ProgressSnapshot`: overall progress as reported and as recorded
//! - `IssueAlert` and `Milestone`: alert history entries and opaque milestone descriptors
//!
//! Wire names are snake_case; the camelCase spellings used by browser clients
//! are accepted as aliases.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Migration state of a single component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStatus {
    Pending,
    InProgress,
    Testing,
    Completed,
    Failed,
}

impl MigrationStatus {
    /// Wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationStatus::Pending => "pending",
            MigrationStatus::InProgress => "in_progress",
            MigrationStatus::Testing => "testing",
            MigrationStatus::Completed => "completed",
            MigrationStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scheduling priority of a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        })
    }
}

/// Severity of a reported issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        })
    }
}

/// A problem reported against a component
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub description: String,
    pub severity: Severity,
}

/// Status delta for one component. Absent fields leave the stored value alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<MigrationStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, alias = "estimatedEffort", skip_serializing_if = "Option::is_none")]
    pub estimated_effort: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issues: Option<Vec<Issue>>,
}

/// Stored record for one component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentStatus {
    pub status: Option<MigrationStatus>,
    pub progress: Option<u32>,
    pub priority: Option<Priority>,
    #[serde(alias = "lastUpdated")]
    pub last_updated: DateTime<Utc>,
    #[serde(default, alias = "estimatedEffort", skip_serializing_if = "Option::is_none")]
    pub estimated_effort: Option<String>,
    #[serde(default)]
    pub issues: Vec<Issue>,
}

impl ComponentStatus {
    /// Shallow-merge `partial` over `previous`, stamping `now`.
    ///
    /// Each field present in the partial wins; every other field is carried
    /// over from the previous record, or left unset when there is none.
    pub fn merged(
        previous: Option<&ComponentStatus>,
        partial: &PartialStatus,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            status: partial.status.or(previous.and_then(|p| p.status)),
            progress: partial.progress.or(previous.and_then(|p| p.progress)),
            priority: partial.priority.or(previous.and_then(|p| p.priority)),
            last_updated: now,
            estimated_effort: partial
                .estimated_effort
                .clone()
                .or_else(|| previous.and_then(|p| p.estimated_effort.clone())),
            issues: partial
                .issues
                .clone()
                .or_else(|| previous.map(|p| p.issues.clone()))
                .unwrap_or_default(),
        }
    }

    /// Progress for display purposes (unset reads as 0)
    pub fn progress_or_zero(&self) -> u32 {
        self.progress.unwrap_or(0)
    }
}

/// Overall progress as reported by the backend (`GET /status` or `progress_update`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressData {
    #[serde(alias = "overallProgress")]
    pub overall_progress: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_components: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_components: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_progress_components: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_components: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
    /// Fields this client does not know about, forwarded untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ProgressData {
    /// Progress data carrying only the overall percentage
    pub fn overall(overall_progress: f64) -> Self {
        Self {
            overall_progress,
            total_components: None,
            completed_components: None,
            in_progress_components: None,
            pending_components: None,
            last_updated: None,
            extra: Map::new(),
        }
    }
}

/// One entry of the progress history
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    #[serde(flatten)]
    pub data: ProgressData,
    pub timestamp: DateTime<Utc>,
}

/// One entry of the issue history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueAlert {
    pub id: Uuid,
    pub component: String,
    pub issue: Issue,
    pub timestamp: DateTime<Utc>,
    pub acknowledged: bool,
}

/// Milestone descriptor announced by the backend, forwarded as-is
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Milestone {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
