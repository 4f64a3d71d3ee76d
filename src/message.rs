//! Wire messages and the normalizer that classifies them.
//!
//! Inbound frames are JSON objects discriminated by a `type` field. The
//! normalizer reads the tag first and only then validates the payload for
//! that tag, so an unknown tag is ignored rather than reported as a decode
//! failure.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::model::{Issue, Milestone, PartialStatus, ProgressData};

/// Errors that can occur while decoding an inbound payload
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Message has no type tag")]
    MissingType,

    #[error("Invalid {kind} payload: {source}")]
    Payload {
        kind: &'static str,
        source: serde_json::Error,
    },
}

/// A validated inbound update
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Full snapshot, merged into every named component
    InitialStatus {
        components: BTreeMap<String, PartialStatus>,
    },
    /// Delta for a single component
    ComponentUpdate {
        component: String,
        status: PartialStatus,
    },
    /// Overall progress report
    ProgressUpdate { progress: ProgressData },
    /// Issue raised against a component
    IssueAlert { component: String, issue: Issue },
    /// Milestone announced by the backend
    MilestoneReached { milestone: Milestone },
    /// Sub-updates applied in array order
    BatchUpdate { updates: Vec<BatchItem> },
}

impl InboundMessage {
    /// The wire tag this message was decoded from
    pub fn kind(&self) -> &'static str {
        match self {
            InboundMessage::InitialStatus { .. } => "initial_status",
            InboundMessage::ComponentUpdate { .. } => "component_update",
            InboundMessage::ProgressUpdate { .. } => "progress_update",
            InboundMessage::IssueAlert { .. } => "issue_alert",
            InboundMessage::MilestoneReached { .. } => "milestone_reached",
            InboundMessage::BatchUpdate { .. } => "batch_update",
        }
    }
}

/// One entry of a `batch_update`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BatchItem {
    ComponentStatus {
        component: String,
        #[serde(alias = "data")]
        status: PartialStatus,
    },
    Progress {
        data: ProgressData,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Deserialize)]
struct InitialStatusBody {
    components: BTreeMap<String, PartialStatus>,
}

#[derive(Deserialize)]
struct ComponentUpdateBody {
    component: String,
    // The tracker server broadcasts the delta under `data`
    #[serde(alias = "data")]
    status: PartialStatus,
}

#[derive(Deserialize)]
struct ProgressUpdateBody {
    progress: ProgressData,
}

#[derive(Deserialize)]
struct IssueAlertBody {
    component: String,
    issue: Issue,
}

#[derive(Deserialize)]
struct MilestoneBody {
    milestone: Milestone,
}

#[derive(Deserialize)]
struct BatchBody {
    updates: Vec<BatchItem>,
}

fn body<T: DeserializeOwned>(value: Value, kind: &'static str) -> Result<T, DecodeError> {
    serde_json::from_value(value).map_err(|source| DecodeError::Payload { kind, source })
}

/// Decode a raw text frame.
///
/// Returns `Ok(None)` for well-formed messages with an unknown type tag.
pub fn decode(text: &str) -> Result<Option<InboundMessage>, DecodeError> {
    let value: Value = serde_json::from_str(text)?;
    normalize(value)
}

/// Classify an already-parsed JSON value by its `type` tag.
pub fn normalize(value: Value) -> Result<Option<InboundMessage>, DecodeError> {
    let tag = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(DecodeError::MissingType)?
        .to_owned();

    let message = match tag.as_str() {
        "initial_status" => {
            let b: InitialStatusBody = body(value, "initial_status")?;
            InboundMessage::InitialStatus {
                components: b.components,
            }
        }
        "component_update" => {
            let b: ComponentUpdateBody = body(value, "component_update")?;
            InboundMessage::ComponentUpdate {
                component: b.component,
                status: b.status,
            }
        }
        "progress_update" => {
            let b: ProgressUpdateBody = body(value, "progress_update")?;
            InboundMessage::ProgressUpdate {
                progress: b.progress,
            }
        }
        "issue_alert" => {
            let b: IssueAlertBody = body(value, "issue_alert")?;
            InboundMessage::IssueAlert {
                component: b.component,
                issue: b.issue,
            }
        }
        "milestone_reached" => {
            let b: MilestoneBody = body(value, "milestone_reached")?;
            InboundMessage::MilestoneReached {
                milestone: b.milestone,
            }
        }
        "batch_update" => {
            let b: BatchBody = body(value, "batch_update")?;
            InboundMessage::BatchUpdate { updates: b.updates }
        }
        other => {
            tracing::debug!("Ignoring message with unknown type: {}", other);
            return Ok(None);
        }
    };

    Ok(Some(message))
}

/// Messages sent to the backend over the push channel
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    RequestStatus { timestamp: DateTime<Utc> },
}

impl OutboundMessage {
    /// Status request stamped with the current time
    pub fn request_status() -> Self {
        OutboundMessage::RequestStatus {
            timestamp: Utc::now(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
