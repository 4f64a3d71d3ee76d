//! Notices: what a presentation layer should announce for an event.
//!
//! Only some events deserve a toast. Status changes qualify when the
//! transition is on the significant list; progress updates and snapshot
//! merges never do.

use std::time::Duration;

use serde::Serialize;

use crate::events::{MilestoneEvent, StatusChange, TrackerEvent};
use crate::model::{MigrationStatus, Severity};

/// Visual weight of a notice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl NoticeLevel {
    pub fn for_status(status: MigrationStatus) -> Self {
        match status {
            MigrationStatus::Completed => NoticeLevel::Success,
            MigrationStatus::InProgress | MigrationStatus::Testing => NoticeLevel::Info,
            MigrationStatus::Pending => NoticeLevel::Warning,
            MigrationStatus::Failed => NoticeLevel::Error,
        }
    }

    pub fn for_severity(severity: Severity) -> Self {
        match severity {
            Severity::Low => NoticeLevel::Info,
            Severity::Medium => NoticeLevel::Warning,
            Severity::High => NoticeLevel::Error,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            NoticeLevel::Info => "INFO",
            NoticeLevel::Success => " OK ",
            NoticeLevel::Warning => "WARN",
            NoticeLevel::Error => "FAIL",
        }
    }
}

/// A transient notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub title: String,
    pub message: String,
    pub level: NoticeLevel,
    /// How long to show it; `None` stays until dismissed
    #[serde(rename = "duration_ms", serialize_with = "serialize_duration_ms")]
    pub duration: Option<Duration>,
}

fn serialize_duration_ms<S: serde::Serializer>(
    duration: &Option<Duration>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match duration {
        Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
        None => serializer.serialize_none(),
    }
}

/// The notice for `event`, if it warrants one
pub fn notice_for(event: &TrackerEvent) -> Option<Notice> {
    match event {
        TrackerEvent::StatusChange(StatusChange::Single {
            component,
            transition: Some(transition),
            ..
        }) if transition.significant => {
            let to = transition.to?;
            Some(Notice {
                title: "Component Status Updated".to_string(),
                message: format!("{} is now {}", display_name(component), to),
                level: NoticeLevel::for_status(to),
                duration: Some(Duration::from_millis(5000)),
            })
        }
        TrackerEvent::MilestoneReached(MilestoneEvent::Progress {
            component, progress, ..
        }) => Some(Notice {
            title: "Milestone Reached".to_string(),
            message: format!("{} reached {}% completion", display_name(component), progress),
            level: NoticeLevel::Success,
            duration: Some(Duration::from_millis(3000)),
        }),
        TrackerEvent::MilestoneReached(MilestoneEvent::Announced(milestone)) => Some(Notice {
            title: "Migration Milestone".to_string(),
            message: milestone
                .message
                .clone()
                .unwrap_or_else(|| "Milestone reached".to_string()),
            level: NoticeLevel::Info,
            duration: Some(Duration::from_millis(5000)),
        }),
        TrackerEvent::IssueDetected(alert) => Some(Notice {
            title: "Migration Issue Detected".to_string(),
            message: format!(
                "{}: {}",
                display_name(&alert.component),
                alert.issue.description
            ),
            level: NoticeLevel::for_severity(alert.issue.severity),
            duration: match alert.issue.severity {
                Severity::High => None,
                _ => Some(Duration::from_millis(8000)),
            },
        }),
        _ => None,
    }
}

/// Human-readable component name: `lead_management` becomes `Lead Management`
pub fn display_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut at_boundary = true;
    for c in name.chars() {
        let c = if c == '_' { ' ' } else { c };
        if at_boundary && c.is_alphanumeric() {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        at_boundary = !c.is_alphanumeric();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::StatusTransition;
    use crate::model::{ComponentStatus, Issue, IssueAlert, Milestone, PartialStatus, ProgressData};
    use chrono::Utc;
    use uuid::Uuid;

    fn single(from: MigrationStatus, to: MigrationStatus, significant: bool) -> TrackerEvent {
        TrackerEvent::StatusChange(StatusChange::Single {
            component: "lead_management".to_string(),
            status: ComponentStatus::merged(
                None,
                &PartialStatus {
                    status: Some(to),
                    ..Default::default()
                },
                Utc::now(),
            ),
            previous: None,
            transition: Some(StatusTransition {
                from: Some(from),
                to: Some(to),
                significant,
            }),
        })
    }

    fn alert(severity: Severity) -> TrackerEvent {
        TrackerEvent::IssueDetected(IssueAlert {
            id: Uuid::new_v4(),
            component: "auth".to_string(),
            issue: Issue {
                description: "session loss".to_string(),
                severity,
            },
            timestamp: Utc::now(),
            acknowledged: false,
        })
    }

    #[test]
    fn test_display_name() {
        assert_eq!(display_name("lead_management"), "Lead Management");
        assert_eq!(display_name("api_endpoints"), "Api Endpoints");
        assert_eq!(display_name("leads"), "Leads");
        assert_eq!(display_name("users_table_v2"), "Users Table V2");
        assert_eq!(display_name(""), "");
    }

    #[test]
    fn test_significant_transition_notice() {
        let notice = notice_for(&single(MigrationStatus::Testing, MigrationStatus::Completed, true))
            .unwrap();
        assert_eq!(notice.title, "Component Status Updated");
        assert_eq!(notice.message, "Lead Management is now completed");
        assert_eq!(notice.level, NoticeLevel::Success);
        assert_eq!(notice.duration, Some(Duration::from_millis(5000)));
    }

    #[test]
    fn test_insignificant_transition_is_silent() {
        assert!(notice_for(&single(MigrationStatus::Pending, MigrationStatus::Completed, false)).is_none());
        assert!(notice_for(&TrackerEvent::ProgressUpdate(ProgressData::overall(50.0))).is_none());
    }

    #[test]
    fn test_issue_notice_levels() {
        let high = notice_for(&alert(Severity::High)).unwrap();
        assert_eq!(high.level, NoticeLevel::Error);
        assert_eq!(high.duration, None);
        assert_eq!(high.message, "Auth: session loss");

        let low = notice_for(&alert(Severity::Low)).unwrap();
        assert_eq!(low.level, NoticeLevel::Info);
        assert_eq!(low.duration, Some(Duration::from_millis(8000)));
    }

    #[test]
    fn test_milestone_notices() {
        let progress = notice_for(&TrackerEvent::MilestoneReached(MilestoneEvent::Progress {
            component: "deals".to_string(),
            progress: 75,
            timestamp: Utc::now(),
        }))
        .unwrap();
        assert_eq!(progress.message, "Deals reached 75% completion");
        assert_eq!(progress.duration, Some(Duration::from_millis(3000)));

        let announced = notice_for(&TrackerEvent::MilestoneReached(MilestoneEvent::Announced(
            Milestone {
                message: Some("Backend cut-over complete".to_string()),
                extra: Default::default(),
            },
        )))
        .unwrap();
        assert_eq!(announced.message, "Backend cut-over complete");
        assert_eq!(announced.level, NoticeLevel::Info);
    }

    #[test]
    fn test_status_levels() {
        assert_eq!(NoticeLevel::for_status(MigrationStatus::Pending), NoticeLevel::Warning);
        assert_eq!(NoticeLevel::for_status(MigrationStatus::Failed), NoticeLevel::Error);
        assert_eq!(NoticeLevel::for_status(MigrationStatus::Testing), NoticeLevel::Info);
    }

    #[test]
    fn test_notice_serializes_duration_in_ms() {
        let json = serde_json::to_value(notice_for(&alert(Severity::Medium)).unwrap()).unwrap();
        assert_eq!(json["duration_ms"], 8000);
        assert_eq!(json["level"], "warning");
    }
}
