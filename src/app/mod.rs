//! Application orchestration
//!
//! Wires configuration, the ledger, scoring, and the queue behind the CLI
//! commands. Every command prints one structured JSON payload on stdout; the
//! engine's own diff/report shapes are reported directly rather than
//! re-derived here.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use log::{info, LevelFilter};
use serde_json::json;

use crate::cli::{Args, Command, PlanCommand};
use crate::config::ConfigManager;
use crate::import;
use crate::ledger::finding::FindingStatus;
use crate::ledger::merge::ScanScope;
use crate::ledger::stats::suppression_metrics;
use crate::ledger::Ledger;
use crate::logging::{LogConfig, LogDestination, LogFormat};
use crate::queue::plan::{Plan, ReconcileResult};
use crate::queue::{build_work_queue, QueueBuildOptions, QueuePolicy};
use crate::scoring::integrity::IntegrityPolicy;
use crate::scoring::policy::ScoringPolicy;
use crate::scoring::{refresh_scores, subjective};

/// Scan-history window used for suppression-rate reporting.
const SUPPRESSION_WINDOW: usize = 5;

/// Derive the logging configuration from CLI flags.
pub fn logging_config(args: &Args) -> Result<LogConfig> {
    let console_level = if args.quiet {
        LevelFilter::Error
    } else if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let format: LogFormat = args
        .log_format
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;
    let (destination, file_level) = match &args.log_file {
        Some(path) => {
            let file_level = match &args.log_file_level {
                Some(level) => crate::logging::parse_log_level(level)?,
                None => LevelFilter::Debug,
            };
            (LogDestination::Both(path.clone()), Some(file_level))
        }
        None => (LogDestination::Console, None),
    };
    Ok(LogConfig {
        console_level,
        file_level,
        format,
        destination,
    })
}

/// Load configuration: explicit file if given, discovery otherwise.
pub fn load_configuration(args: &Args) -> Result<ConfigManager> {
    match &args.config_file {
        Some(path) => ConfigManager::load_from_file(path.clone()),
        None => ConfigManager::load(),
    }
}

struct AppContext {
    root: PathBuf,
    scoring: ScoringPolicy,
    integrity: IntegrityPolicy,
    queue: QueuePolicy,
}

impl AppContext {
    fn build(args: &Args, config: &ConfigManager) -> Result<Self> {
        let root = match &args.project {
            Some(path) => path.clone(),
            None => std::env::current_dir().context("Failed to get current directory")?,
        };
        Ok(Self {
            root,
            scoring: config.scoring_policy()?,
            integrity: config.integrity_policy()?,
            queue: config.queue_policy()?,
        })
    }

    fn state_path(&self) -> PathBuf {
        Ledger::state_path(&self.root)
    }

    fn plan_path(&self) -> PathBuf {
        Plan::plan_path(&self.root)
    }
}

fn scores_payload(ledger: &Ledger) -> serde_json::Value {
    json!({
        "overall_score": ledger.overall_score,
        "strict_score": ledger.strict_score,
        "objective_score": ledger.objective_score,
        "verified_strict_score": ledger.verified_strict_score,
    })
}

fn print_payload(payload: &serde_json::Value) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(payload).context("Failed to serialize output payload")?
    );
    Ok(())
}

/// Run the parsed command to completion.
pub fn run(args: Args, config: &ConfigManager) -> Result<()> {
    let context = AppContext::build(&args, config)?;
    let now = Utc::now();
    let mut ledger = Ledger::load(&context.state_path(), now)
        .with_context(|| format!("Failed to load state from {}", context.state_path().display()))?;

    let payload = match args.command {
        Command::Scan {
            findings,
            source,
            path,
            exclude,
            force_resolve,
            dry_run,
        } => {
            let raw = import::load_json(&findings)
                .with_context(|| format!("Failed to load scan batch {}", findings.display()))?;
            let batch = import::parse_scan_batch(&raw)?;
            let scope = ScanScope {
                source,
                path,
                exclude,
                force_resolve,
            };

            let diff = ledger.apply_scan(
                &scope,
                batch.candidates,
                batch.skipped,
                batch.potentials,
                batch.coverage,
                now,
            );
            refresh_scores(&mut ledger, &context.scoring, &context.integrity);

            let mut reconcile: Option<ReconcileResult> = None;
            if let Some(mut plan) = Plan::load(&context.plan_path())? {
                let result = crate::queue::plan::reconcile_after_scan(&mut plan, &ledger, now);
                if !dry_run && result.changes() > 0 {
                    plan.save(&context.plan_path(), now)?;
                }
                reconcile = Some(result);
            }

            if dry_run {
                info!("Dry run: state not persisted");
            } else {
                ledger.save(&context.state_path())?;
            }

            json!({
                "diff": diff,
                "scores": scores_payload(&ledger),
                "subjective_integrity": ledger.subjective_integrity,
                "score_confidence": ledger.score_confidence,
                "stats": ledger.stats,
                "plan_reconcile": reconcile,
                "dry_run": dry_run,
            })
        }

        Command::Import { payload, dry_run } => {
            let raw = import::load_json(&payload)
                .with_context(|| format!("Failed to load review payload {}", payload.display()))?;
            let review = import::parse_review_import(&raw)?;
            let report = import::apply_review_import(&mut ledger, review, now);
            refresh_scores(&mut ledger, &context.scoring, &context.integrity);

            if dry_run {
                info!("Dry run: state not persisted");
            } else {
                ledger.save(&context.state_path())?;
            }

            json!({
                "import": report,
                "scores": scores_payload(&ledger),
                "subjective_integrity": ledger.subjective_integrity,
                "dry_run": dry_run,
            })
        }

        Command::Status => {
            json!({
                "scores": scores_payload(&ledger),
                "stats": ledger.stats,
                "dimension_scores": ledger.dimension_scores,
                "subjective_integrity": ledger.subjective_integrity,
                "score_confidence": ledger.score_confidence,
                "suppression": suppression_metrics(&ledger.scan_history, SUPPRESSION_WINDOW),
                "last_scan": ledger.last_scan,
                "scan_count": ledger.scan_count,
            })
        }

        Command::Next {
            tier,
            count,
            all,
            scope,
            chronic,
            no_subjective,
            no_tier_fallback,
            explain,
            include_skipped,
            cluster,
        } => {
            let plan = Plan::load(&context.plan_path())?;
            let options = QueueBuildOptions {
                tier,
                count: if all { None } else { Some(count) },
                status: Some(FindingStatus::Open),
                scope,
                include_subjective: !no_subjective,
                chronic,
                no_tier_fallback,
                explain,
                include_skipped,
                cluster,
                collapse_clusters: true,
            };
            let result = build_work_queue(
                &ledger,
                &context.scoring,
                &context.queue,
                plan.as_ref(),
                &options,
            );
            serde_json::to_value(&result).context("Failed to serialize work queue")?
        }

        Command::Resolve { pattern, status, note } => {
            let status: FindingStatus = status.into();
            let resolved = crate::ledger::resolve::resolve_findings(
                &mut ledger.findings,
                &pattern,
                status,
                note.as_deref(),
                now,
            )?;

            // Fixed review findings invalidate their dimension's assessment:
            // the score must come from a fresh review, not a stale one.
            let mut invalidated = Vec::new();
            if status == FindingStatus::Fixed {
                let resolved_findings: Vec<&crate::ledger::finding::Finding> = resolved
                    .iter()
                    .filter_map(|id| ledger.findings.get(id))
                    .collect();
                invalidated = subjective::invalidate_assessments_for_fixed_reviews(
                    &mut ledger.subjective_assessments,
                    &resolved_findings,
                    &context.scoring,
                    now,
                );
            }

            ledger.stats = crate::ledger::stats::compute_stats(&ledger.findings);
            refresh_scores(&mut ledger, &context.scoring, &context.integrity);
            ledger.save(&context.state_path())?;

            json!({
                "resolved": resolved,
                "status": status,
                "invalidated_assessments": invalidated,
                "scores": scores_payload(&ledger),
            })
        }

        Command::Reopen { id, note } => {
            crate::ledger::resolve::reopen_finding(&mut ledger.findings, &id, note.as_deref())?;
            ledger.stats = crate::ledger::stats::compute_stats(&ledger.findings);
            refresh_scores(&mut ledger, &context.scoring, &context.integrity);
            ledger.save(&context.state_path())?;
            json!({ "reopened": id, "scores": scores_payload(&ledger) })
        }

        Command::Ignore { pattern, remove } => {
            let payload = if remove {
                let released = ledger.remove_ignore(&pattern);
                json!({ "removed": pattern, "released": released })
            } else {
                let suppressed = ledger.add_ignore(&pattern, now);
                json!({ "added": pattern, "suppressed": suppressed })
            };
            refresh_scores(&mut ledger, &context.scoring, &context.integrity);
            ledger.save(&context.state_path())?;
            payload
        }

        Command::Plan { command } => {
            let mut plan = Plan::load(&context.plan_path())?.unwrap_or_else(|| Plan::new(now));
            match command {
                PlanCommand::Skip { id, kind, reason, review_after } => {
                    plan.skip(&id, kind.into(), reason, review_after, ledger.scan_count, now);
                    plan.save(&context.plan_path(), now)?;
                    json!({ "skipped": id })
                }
                PlanCommand::Unskip { id } => {
                    let removed = plan.unskip(&id);
                    if removed {
                        plan.save(&context.plan_path(), now)?;
                    }
                    json!({ "unskipped": id, "found": removed })
                }
                PlanCommand::Show => serde_json::to_value(&plan).context("Failed to serialize plan")?,
            }
        }
    };

    print_payload(&payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn args(argv: &[&str]) -> Args {
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_logging_config_levels() {
        let config = logging_config(&args(&["codeledger", "status"])).unwrap();
        assert_eq!(config.console_level, LevelFilter::Info);

        let config = logging_config(&args(&["codeledger", "-q", "status"])).unwrap();
        assert_eq!(config.console_level, LevelFilter::Error);

        let config = logging_config(&args(&["codeledger", "-v", "status"])).unwrap();
        assert_eq!(config.console_level, LevelFilter::Debug);
    }

    #[test]
    fn test_logging_config_file_destination() {
        let config = logging_config(&args(&[
            "codeledger", "--log-file", "/tmp/cl.log", "--log-file-level", "trace", "status",
        ]))
        .unwrap();
        assert_eq!(config.file_level, Some(LevelFilter::Trace));
        assert!(matches!(config.destination, LogDestination::Both(_)));
    }

    #[test]
    fn test_logging_config_rejects_bad_format() {
        assert!(logging_config(&args(&["codeledger", "--log-format", "xml", "status"])).is_err());
    }
}
