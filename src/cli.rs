use clap::Parser;

/// prsweep — automated review sweeps over open pull requests
#[derive(Parser, Debug, Clone)]
#[command(name = "prsweep", version, about)]
pub struct Cli {
    /// Run a single review pass then exit
    #[arg(long)]
    pub once: bool,

    /// Run passes continuously on an interval
    #[arg(long, conflicts_with = "once")]
    pub continuous: bool,

    /// Maximum number of passes before stopping (continuous mode)
    #[arg(long, conflicts_with = "once")]
    pub max_passes: Option<u64>,

    /// Scan and report without committing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Repository to review, as owner/name
    #[arg(long)]
    pub repo: Option<String>,

    /// Regular expression flagging review markers in added lines
    #[arg(long)]
    pub marker: Option<String>,

    /// Seconds between passes (continuous mode)
    #[arg(long = "interval-seconds", alias = "interval")]
    pub interval: Option<u64>,

    /// Maximum concurrent (PR, file) review units
    #[arg(long)]
    pub workers: Option<usize>,

    /// Post each PR's summary section as a comment
    #[arg(long)]
    pub annotate: bool,

    /// Path to config file (default: prsweep.toml if present)
    #[arg(long)]
    pub config: Option<String>,
}
