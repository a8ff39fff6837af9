//! Argument parsing
//!
//! All output is structured JSON on stdout; logs go to stderr. Rendering is
//! deliberately out of scope — downstream tooling consumes the payloads.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};

use crate::ledger::finding::FindingStatus;
use crate::queue::plan::SkipKind;

/// Code quality ledger and scoring engine
#[derive(Parser, Debug)]
#[command(name = "codeledger")]
#[command(about = "Reconciles detector findings across scans, scores health dimensions, and ranks a deterministic work queue")]
#[command(version)]
pub struct Args {
    /// Project root holding the .codeledger state directory (defaults to the
    /// current directory)
    #[arg(short = 'p', long = "project", value_name = "PATH")]
    pub project: Option<PathBuf>,

    /// Verbose output (debug level logging)
    #[arg(short, long)]
    pub verbose: bool,

    /// Quiet output (error level logging only)
    #[arg(short, long)]
    pub quiet: bool,

    /// Log format: text or json
    #[arg(long, value_name = "FORMAT", default_value = "text")]
    pub log_format: String,

    /// Log file path for file output
    #[arg(long, value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Log level for file output (independent of console level)
    #[arg(long, value_name = "LEVEL")]
    pub log_file_level: Option<String>,

    /// Configuration file path (overrides discovery)
    #[arg(long, value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Manual resolution statuses accepted by `resolve --as`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ResolveAs {
    Fixed,
    Wontfix,
    FalsePositive,
}

impl From<ResolveAs> for FindingStatus {
    fn from(value: ResolveAs) -> Self {
        match value {
            ResolveAs::Fixed => FindingStatus::Fixed,
            ResolveAs::Wontfix => FindingStatus::Wontfix,
            ResolveAs::FalsePositive => FindingStatus::FalsePositive,
        }
    }
}

/// Skip kinds accepted by `plan skip --kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SkipKindArg {
    Temporary,
    Permanent,
    FalsePositive,
}

impl From<SkipKindArg> for SkipKind {
    fn from(value: SkipKindArg) -> Self {
        match value {
            SkipKindArg::Temporary => SkipKind::Temporary,
            SkipKindArg::Permanent => SkipKind::Permanent,
            SkipKindArg::FalsePositive => SkipKind::FalsePositive,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Merge a detector batch (JSON file) into the ledger
    Scan {
        /// Detector output payload: {"findings": [...], "potentials": {...}}
        findings: PathBuf,

        /// Scan source label (e.g. a language name)
        #[arg(long, value_name = "NAME")]
        source: Option<String>,

        /// Relative path prefix this scan was limited to
        #[arg(long, value_name = "PATH")]
        path: Option<String>,

        /// Directory fragments excluded from the scan
        #[arg(long = "exclude", value_name = "DIR")]
        exclude: Vec<String>,

        /// Auto-resolve unconditionally, across scope and flake protection
        #[arg(long)]
        force_resolve: bool,

        /// Report the diff without persisting anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Import a subjective review payload (findings + assessments)
    Import {
        /// Review payload: {"findings": [...], "assessments": {...}}
        payload: PathBuf,

        /// Report the result without persisting anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Report scores, stats, and confidence for the current state
    Status,

    /// Show the next item(s) from the ranked work queue
    Next {
        /// Only this tier (1-4); falls back to the nearest non-empty tier
        #[arg(short, long)]
        tier: Option<u8>,

        /// Number of items to show
        #[arg(short = 'n', long, default_value_t = 1)]
        count: usize,

        /// Show every matching item
        #[arg(long)]
        all: bool,

        /// Scope pattern (detector, file, directory, id prefix, or glob)
        #[arg(long, value_name = "PATTERN")]
        scope: Option<String>,

        /// Only chronic reopeners
        #[arg(long)]
        chronic: bool,

        /// Exclude subjective dimension items
        #[arg(long)]
        no_subjective: bool,

        /// Fail with an empty result instead of falling back to another tier
        #[arg(long)]
        no_tier_fallback: bool,

        /// Attach ranking explanations to each item
        #[arg(long)]
        explain: bool,

        /// Include plan-skipped items at the end of the queue
        #[arg(long)]
        include_skipped: bool,

        /// Restrict to one cluster's members
        #[arg(long, value_name = "NAME")]
        cluster: Option<String>,
    },

    /// Resolve open findings matching a pattern
    Resolve {
        /// Exact id, glob, id prefix, detector name, or file/directory
        pattern: String,

        /// Resolution status
        #[arg(long = "as", value_enum)]
        status: ResolveAs,

        /// Note recording what was done
        #[arg(long)]
        note: Option<String>,
    },

    /// Reopen a resolved finding
    Reopen {
        /// Finding id
        id: String,

        /// Note recording why
        #[arg(long)]
        note: Option<String>,
    },

    /// Add or remove an ignore pattern
    Ignore {
        /// File path, id prefix, or glob
        pattern: String,

        /// Remove the pattern instead of adding it
        #[arg(long)]
        remove: bool,
    },

    /// Living-plan operations
    Plan {
        #[command(subcommand)]
        command: PlanCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum PlanCommand {
    /// Skip a queue item
    Skip {
        /// Finding id
        id: String,

        #[arg(long, value_enum, default_value = "temporary")]
        kind: SkipKindArg,

        #[arg(long)]
        reason: Option<String>,

        /// Re-surface after this many scans (temporary skips only)
        #[arg(long, value_name = "SCANS")]
        review_after: Option<u32>,
    },

    /// Remove a skip so the item re-enters the queue
    Unskip {
        /// Finding id
        id: String,
    },

    /// Print the current plan
    Show,
}

pub fn parse_args() -> Args {
    Args::parse()
}

/// Cross-flag validation clap cannot express.
pub fn validate_args(args: &Args) -> Result<()> {
    if args.verbose && args.quiet {
        return Err(anyhow::anyhow!("--verbose and --quiet are mutually exclusive"));
    }
    if args.log_file_level.is_some() && args.log_file.is_none() {
        return Err(anyhow::anyhow!("--log-file-level requires --log-file"));
    }
    if let Command::Next { tier: Some(tier), .. } = &args.command {
        if !(1..=4).contains(tier) {
            return Err(anyhow::anyhow!("--tier must be between 1 and 4"));
        }
    }
    Ok(())
}
