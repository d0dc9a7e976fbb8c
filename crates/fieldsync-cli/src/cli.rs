use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use fieldsync_core::ConflictPolicy;

#[derive(Parser)]
#[command(name = "fieldsync")]
#[command(about = "Replicate a field device's local store with the central store")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to the local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Optional path to the JSON config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Central store URL (libsql://, https://, file: or a path)
    #[arg(long, global = true, value_name = "URL")]
    pub central_url: Option<String>,

    /// How conflicting edits are settled: local-wins or newest-wins
    #[arg(long, global = true, value_name = "POLICY", value_parser = parse_conflict_policy)]
    pub conflict_policy: Option<ConflictPolicy>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Pull central changes, then push local changes
    Sync {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Pull central changes only
    Pull {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Push local changes only
    Push {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show per-table sync bookkeeping and central reachability
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show this device's identity
    Device {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Recovery operations on local sync state
    Admin {
        #[command(subcommand)]
        command: AdminCommands,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum AdminCommands {
    /// Mark every local row as synced without pushing it
    MarkSynced {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Mark every live row unsynced and forget all pull cursors
    Reset {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

fn parse_conflict_policy(value: &str) -> Result<ConflictPolicy, String> {
    value.parse().map_err(|error: fieldsync_core::Error| error.to_string())
}
