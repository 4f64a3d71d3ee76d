//! One-shot queries against the tracker REST API

use anyhow::Result;
use serde::Serialize;

use crate::cli::commands::watch::EndpointArgs;
use crate::cli::output::{OutputFormat, print_formatted};
use migration_status::config::Config;
use migration_status::model::ProgressData;
use migration_status::notify::display_name;
use migration_status::transport::{ComponentListing, StatusClient};

fn client(endpoints: &EndpointArgs) -> Result<StatusClient> {
    let mut config = Config::load()?;
    endpoints.apply(&mut config);
    Ok(StatusClient::new(&config.tracker.api_url)?)
}

/// Print overall progress (`GET /status`)
pub async fn status(endpoints: EndpointArgs, format: OutputFormat) -> Result<()> {
    let client = client(&endpoints)?;
    let progress = client.fetch_status().await?;

    print_formatted(&progress, format, format_progress);
    Ok(())
}

fn format_progress(progress: &ProgressData) -> String {
    let mut lines = vec![format!("Overall progress: {:.1}%", progress.overall_progress)];
    let counts = [
        ("Total", progress.total_components),
        ("Completed", progress.completed_components),
        ("In progress", progress.in_progress_components),
        ("Pending", progress.pending_components),
    ];
    for (label, count) in counts {
        if let Some(count) = count {
            lines.push(format!("  {:<12} {}", label, count));
        }
    }
    if let Some(updated) = &progress.last_updated {
        lines.push(format!("Last updated: {}", updated));
    }
    lines.join("\n")
}

#[derive(Serialize)]
struct ComponentsResult {
    components: Vec<ComponentListing>,
}

/// Print the tracked components (`GET /components`)
pub async fn components(endpoints: EndpointArgs, format: OutputFormat) -> Result<()> {
    let client = client(&endpoints)?;
    let result = ComponentsResult {
        components: client.fetch_components().await?,
    };

    print_formatted(&result, format, |r| format_components(&r.components));
    Ok(())
}

fn format_components(components: &[ComponentListing]) -> String {
    if components.is_empty() {
        return "No components tracked".to_string();
    }

    components
        .iter()
        .map(|c| {
            let status = c
                .status
                .status
                .map(|s| s.as_str())
                .unwrap_or("unknown");
            let progress = c
                .status
                .progress
                .map(|p| format!("{:>3}%", p))
                .unwrap_or_else(|| "   -".to_string());
            let issues = match c.status.issues.as_ref().map(Vec::len) {
                Some(n) if n > 0 => format!("  ({} issues)", n),
                _ => String::new(),
            };
            format!("{:<28} {:<12} {}{}", display_name(&c.name), status, progress, issues)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
