//! CLI argument definitions for kvstage.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Version string with the commit and build time baked in by build.rs.
pub const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("KVSTAGE_GIT_COMMIT"),
    " ",
    env!("KVSTAGE_BUILD_TIMESTAMP"),
    ")"
);

/// kvstage - git-like staging for remote parameter and secret stores.
///
/// Stage changes locally with `kvstage param stage set`, review them with
/// `diff`, then apply them with `push`.
#[derive(Parser, Debug)]
#[command(name = "kvstage")]
#[command(author, version = VERSION, about = "Stage, diff and push changes to remote parameter and secret stores", long_about = None)]
pub struct Cli {
    /// Output in human-readable format instead of JSON
    #[arg(short = 'H', long = "human", global = true)]
    pub human_readable: bool,

    /// Maximum remote calls in flight during push (1-64)
    #[arg(long, global = true)]
    pub concurrency: Option<usize>,

    /// Directory backing the local remote.
    /// Can also be set via KVSTAGE_REMOTE_DIR environment variable.
    #[arg(long = "remote-dir", global = true)]
    pub remote_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Parameter store commands (numeric versions, `name#3`, `name~1`)
    Param {
        #[command(subcommand)]
        command: ServiceCommands,
    },

    /// Secret store commands (version IDs and labels, `name#<id>`, `name:previous`)
    Secret {
        #[command(subcommand)]
        command: ServiceCommands,
    },

    /// Show staged changes across every service
    Status {
        /// Include staged values
        #[arg(short, long)]
        verbose: bool,
    },

    /// Unstage changes across every service
    Reset {
        /// Unstage everything
        #[arg(long, required = true)]
        all: bool,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

/// Commands available for each service
#[derive(Subcommand, Debug)]
pub enum ServiceCommands {
    /// Print a version of an item from the remote
    Show {
        /// Name with optional version specifier (e.g. `/app/db#3`, `db:previous~1`)
        spec: String,

        /// Rest of the specifier when given as a separate argument (e.g. `~1`)
        suffix: Option<String>,

        /// Print only the value
        #[arg(long)]
        raw: bool,

        /// Pretty-print the value as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the version history of an item, newest first
    Log {
        /// Item name
        name: String,

        /// Maximum number of versions to show
        #[arg(short = 'n', long = "max-count")]
        max_count: Option<usize>,
    },

    /// Stage a change
    Stage {
        #[command(subcommand)]
        command: StageCommands,
    },

    /// Show staged changes
    Status {
        /// Only this item
        name: Option<String>,

        /// Include staged values
        #[arg(short, long)]
        verbose: bool,
    },

    /// Compare staged changes with the remote
    ///
    /// Entries whose staged value already matches the remote are unstaged.
    Diff {
        /// Only this item
        name: Option<String>,

        /// Pretty-print both sides as JSON before comparing
        #[arg(long)]
        json: bool,
    },

    /// Apply staged changes to the remote
    Push {
        /// Only this item
        name: Option<String>,

        /// Cancel outstanding remote calls after this many seconds
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Unstage changes, or stage a past version to restore it
    ///
    /// A bare name unstages it. A name with a version specifier fetches that
    /// version and stages it as the new value.
    Reset {
        /// Name, optionally with a version specifier
        #[arg(conflicts_with = "all", required_unless_present = "all")]
        spec: Option<String>,

        /// Rest of the specifier when given as a separate argument
        suffix: Option<String>,

        /// Unstage every entry of this service
        #[arg(long)]
        all: bool,
    },
}

/// Staging subcommands
#[derive(Subcommand, Debug)]
pub enum StageCommands {
    /// Stage a new value
    Set {
        /// Item name
        name: String,

        /// New value
        value: String,
    },

    /// Stage a deletion
    Delete {
        /// Item name
        name: String,

        /// Delete immediately without a recovery window (secrets only)
        #[arg(long, conflicts_with = "recovery_window")]
        force: bool,

        /// Days before the deletion becomes permanent, 7-30 (secrets only)
        #[arg(long = "recovery-window", value_name = "DAYS")]
        recovery_window: Option<u32>,
    },
}

/// Configuration subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show resolved configuration values and where they came from
    Show,
}
