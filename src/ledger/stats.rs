//! Status counters, per-tier breakdowns, and suppression-rate metrics
//!
//! Suppressed findings are invisible here: they contribute to no counter,
//! whatever their status.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ledger::finding::{Finding, FindingStatus};
use crate::ledger::ScanRecord;

/// Per-status counters, either global or for one tier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounters {
    pub open: usize,
    pub fixed: usize,
    pub auto_resolved: usize,
    pub wontfix: usize,
    pub false_positive: usize,
}

impl StatusCounters {
    fn bump(&mut self, status: FindingStatus) {
        match status {
            FindingStatus::Open => self.open += 1,
            FindingStatus::Fixed => self.fixed += 1,
            FindingStatus::AutoResolved => self.auto_resolved += 1,
            FindingStatus::Wontfix => self.wontfix += 1,
            FindingStatus::FalsePositive => self.false_positive += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.open + self.fixed + self.auto_resolved + self.wontfix + self.false_positive
    }
}

/// Ledger-wide statistics block persisted with the state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerStats {
    pub total: usize,
    #[serde(flatten)]
    pub counters: StatusCounters,
    /// Keyed by tier as a string ("1".."4") for stable JSON output
    pub by_tier: BTreeMap<String, StatusCounters>,
}

/// Tally all non-suppressed findings.
pub fn compute_stats(findings: &BTreeMap<String, Finding>) -> LedgerStats {
    let mut counters = StatusCounters::default();
    let mut by_tier: BTreeMap<String, StatusCounters> = BTreeMap::new();

    for finding in findings.values() {
        if finding.suppressed {
            continue;
        }
        counters.bump(finding.status);
        by_tier.entry(finding.tier.to_string()).or_default().bump(finding.status);
    }

    LedgerStats {
        total: counters.total(),
        counters,
        by_tier,
    }
}

/// Suppression rates over the recent scan history window.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SuppressionMetrics {
    pub last_ignored: usize,
    pub last_raw_findings: usize,
    pub last_suppressed_pct: f64,
    pub last_ignore_patterns: usize,
    pub recent_scans: usize,
    pub recent_ignored: usize,
    pub recent_raw_findings: usize,
    pub recent_suppressed_pct: f64,
}

fn pct(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        (part as f64 / whole as f64 * 1000.0).round() / 10.0
    }
}

/// Summarize how much of the raw detector output ignore rules are hiding.
///
/// A climbing suppression rate is the usual sign of score gaming via ignore
/// patterns, so the report surfaces it alongside the scores.
pub fn suppression_metrics(history: &[ScanRecord], window: usize) -> SuppressionMetrics {
    if history.is_empty() {
        return SuppressionMetrics::default();
    }
    let recent: Vec<&ScanRecord> = history.iter().rev().take(window.max(1)).collect();
    let last = recent[0];

    let recent_ignored: usize = recent.iter().map(|r| r.ignored).sum();
    let recent_raw: usize = recent.iter().map(|r| r.raw_findings).sum();

    SuppressionMetrics {
        last_ignored: last.ignored,
        last_raw_findings: last.raw_findings,
        last_suppressed_pct: pct(last.ignored, last.raw_findings),
        last_ignore_patterns: last.ignore_patterns,
        recent_scans: recent.len(),
        recent_ignored,
        recent_raw_findings: recent_raw,
        recent_suppressed_pct: pct(recent_ignored, recent_raw),
    }
}
