//! Follow a migration live

use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use crate::cli::output::{OutputFormat, print_formatted};
use migration_status::config::Config;
use migration_status::events::{MilestoneEvent, StatusChange};
use migration_status::model::MigrationStatus;
use migration_status::notify::display_name;
use migration_status::{ConnectionState, EventCategory, MigrationTracker, TrackerEvent, callback, notice_for};

#[derive(Args, Debug, Clone)]
pub struct EndpointArgs {
    /// Override the push channel URL
    #[arg(long)]
    pub websocket_url: Option<String>,

    /// Override the REST API base URL
    #[arg(long)]
    pub api_url: Option<String>,
}

impl EndpointArgs {
    pub fn apply(&self, config: &mut Config) {
        if let Some(url) = &self.websocket_url {
            config.tracker.websocket_url = url.clone();
        }
        if let Some(url) = &self.api_url {
            config.tracker.api_url = url.clone();
        }
    }
}

#[derive(Args, Debug)]
pub struct WatchArgs {
    #[command(flatten)]
    pub endpoints: EndpointArgs,

    /// Print every event, not just notices
    #[arg(long)]
    pub events: bool,

    /// Skip the initial component list fetch
    #[arg(long)]
    pub no_initial_load: bool,
}

#[derive(Serialize)]
struct WatchSummary {
    components: usize,
    completed: usize,
    failed: usize,
    overall_progress: Option<f64>,
    issues: usize,
    unacknowledged_issues: usize,
    dashboard: String,
}

pub async fn run(args: WatchArgs, format: OutputFormat, quiet: bool) -> Result<()> {
    let mut config = Config::load()?;
    args.endpoints.apply(&mut config);
    if args.no_initial_load {
        config.tracker.load_components_on_start = false;
    }
    let show_events = args.events || config.display.events;
    let show_notices = config.display.notices && !quiet;

    let options = config.tracker.options();
    let dashboard = options.dashboard_url();
    tracing::info!(
        "Watching {} (polling {} while offline)",
        options.websocket_url,
        options.api_url
    );

    let tracker = MigrationTracker::connect(options)?;

    let printer = callback(move |event| print_event(event, format, show_events, show_notices));
    for category in EventCategory::ALL {
        tracker.subscribe(category, Arc::clone(&printer));
    }

    let state_watcher = tracker.watch_connection().map(|mut rx| {
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let state = *rx.borrow_and_update();
                match state {
                    ConnectionState::Open => tracing::info!("Connection: {}", state.label()),
                    ConnectionState::Error => tracing::warn!("Connection: {}", state.label()),
                    _ => tracing::debug!("Connection: {}", state.label()),
                }
            }
        })
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("Interrupted, shutting down");

    tracker.shutdown().await;
    if let Some(watcher) = state_watcher {
        watcher.abort();
    }

    let statuses = tracker.get_all_component_statuses();
    let summary = WatchSummary {
        components: statuses.len(),
        completed: statuses
            .values()
            .filter(|c| c.status == Some(MigrationStatus::Completed))
            .count(),
        failed: statuses
            .values()
            .filter(|c| c.status == Some(MigrationStatus::Failed))
            .count(),
        overall_progress: tracker.latest_progress().map(|p| p.data.overall_progress),
        issues: tracker.get_issue_alerts().len(),
        unacknowledged_issues: tracker.unacknowledged_issue_count(),
        dashboard,
    };

    print_formatted(&summary, format, |s| {
        let progress = s
            .overall_progress
            .map(|p| format!("{:.1}%", p))
            .unwrap_or_else(|| "unknown".to_string());
        format!(
            "{} components ({} completed, {} failed), overall {}\n{} issues ({} unacknowledged)\n{}",
            s.components, s.completed, s.failed, progress, s.issues, s.unacknowledged_issues, s.dashboard
        )
    });

    Ok(())
}

fn print_event(event: &TrackerEvent, format: OutputFormat, show_events: bool, show_notices: bool) {
    match format {
        OutputFormat::Json => {
            if show_events {
                if let Ok(json) = serde_json::to_string(event) {
                    println!("{}", json);
                }
            }
            if show_notices {
                if let Some(notice) = notice_for(event) {
                    if let Ok(json) = serde_json::to_string(&serde_json::json!({ "notice": notice })) {
                        println!("{}", json);
                    }
                }
            }
        }
        OutputFormat::Text => {
            if show_events {
                println!("{}", describe(event));
            }
            if show_notices {
                if let Some(notice) = notice_for(event) {
                    println!("[{}] {}: {}", notice.level.tag(), notice.title, notice.message);
                }
            }
        }
    }
}

/// One-line description of an event
fn describe(event: &TrackerEvent) -> String {
    match event {
        TrackerEvent::StatusChange(StatusChange::Batch { components }) => {
            format!("snapshot: {} components", components.len())
        }
        TrackerEvent::StatusChange(StatusChange::Single {
            component, status, ..
        }) => format!(
            "{}: {} ({}%)",
            display_name(component),
            status
                .status
                .map(|s| s.as_str())
                .unwrap_or("unknown"),
            status.progress_or_zero()
        ),
        TrackerEvent::ProgressUpdate(data) => {
            format!("overall progress: {:.1}%", data.overall_progress)
        }
        TrackerEvent::IssueDetected(alert) => format!(
            "issue on {} [{}]: {}",
            display_name(&alert.component),
            alert.issue.severity,
            alert.issue.description
        ),
        TrackerEvent::MilestoneReached(MilestoneEvent::Progress {
            component, progress, ..
        }) => format!("milestone: {} at {}%", display_name(component), progress),
        TrackerEvent::MilestoneReached(MilestoneEvent::Announced(milestone)) => format!(
            "milestone: {}",
            milestone.message.as_deref().unwrap_or("(no message)")
        ),
    }
}
