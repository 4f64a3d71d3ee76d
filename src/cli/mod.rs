//! Command-line interface for the migration tracker

mod commands;
mod output;

use clap::{Parser, Subcommand};

pub use output::{OutputFormat, print_error};

/// Migration status tracker
#[derive(Parser, Debug)]
#[command(name = "migration-status")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format
    #[command(flatten)]
    pub output: OutputOptions,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output formatting options
#[derive(Parser, Debug, Clone)]
pub struct OutputOptions {
    /// Output in JSON format (for machine parsing)
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Increase output verbosity
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl OutputOptions {
    pub fn format(&self) -> OutputFormat {
        if self.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }

    /// Default log filter when `RUST_LOG` is unset
    pub fn log_filter(&self) -> &'static str {
        if self.verbose {
            "migration_status=trace,debug"
        } else if self.quiet {
            "warn"
        } else {
            "migration_status=debug,info"
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Connect and follow the migration live until interrupted
    Watch(commands::watch::WatchArgs),

    /// Show overall migration progress
    Status {
        #[command(flatten)]
        endpoints: commands::watch::EndpointArgs,
    },

    /// List tracked components
    Components {
        #[command(flatten)]
        endpoints: commands::watch::EndpointArgs,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: commands::config::ConfigCommands,
    },
}

/// Run the CLI with parsed arguments
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let format = cli.output.format();
    let quiet = cli.output.quiet;

    match cli.command {
        Commands::Watch(args) => commands::watch::run(args, format, quiet).await,
        Commands::Status { endpoints } => commands::status::status(endpoints, format).await,
        Commands::Components { endpoints } => commands::status::components(endpoints, format).await,
        Commands::Config { command } => commands::config::run(command, format, quiet).await,
    }
}
