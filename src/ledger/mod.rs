//! Finding ledger
//!
//! Owns the persisted map of finding-id -> Finding plus everything derived
//! from it: scores, stats, assessments, and scan history. State lives in
//! `.codeledger/state.json`; it is loaded once per invocation, mutated in
//! memory, and persisted atomically (write to a temp file, then rename).
//!
//! No cross-process locking is attempted: concurrent invocations against the
//! same state file are an unhandled hazard.

pub mod error;
pub mod finding;
pub mod merge;
pub mod resolve;
pub mod scores;
pub mod stats;
pub mod suppress;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use self::error::{LedgerError, LedgerResult};
use self::finding::{Finding, RawCandidate};
use self::merge::{MergeDiff, ScanScope, SkippedCandidate};
use self::scores::{
    DetectorCoverage, DimensionScore, IntegrityReport, ScoreConfidence, SubjectiveAssessment,
};
use self::stats::LedgerStats;

/// On-disk schema version.
pub const STATE_VERSION: u32 = 1;

/// Directory holding ledger state, relative to the project root.
pub const STATE_DIR: &str = ".codeledger";

/// State file name inside [`STATE_DIR`].
pub const STATE_FILE: &str = "state.json";

/// Scan history entries retained (oldest dropped first).
const HISTORY_LIMIT: usize = 50;

/// User configuration embedded in the state file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default)]
    pub ignore: Vec<String>,
}

/// Append-only summary of one completed scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRecord {
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub new: usize,
    pub reopened: usize,
    pub auto_resolved: usize,
    /// Candidates the detectors produced before ignore filtering
    pub raw_findings: usize,
    /// Candidates dropped by ignore rules
    pub ignored: usize,
    /// Active ignore patterns at scan time
    pub ignore_patterns: usize,
    pub total_open: usize,
}

fn default_score() -> f64 {
    100.0
}

/// The whole persisted engine state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ledger {
    pub version: u32,
    pub created: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_scan: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scan_count: u32,
    #[serde(default)]
    pub config: LedgerConfig,
    #[serde(default)]
    pub findings: BTreeMap<String, Finding>,
    /// Checks attempted per detector, keyed by scan source
    #[serde(default)]
    pub potentials: BTreeMap<String, BTreeMap<String, u64>>,
    #[serde(default)]
    pub subjective_assessments: BTreeMap<String, SubjectiveAssessment>,
    /// Latest per-detector coverage records
    #[serde(default)]
    pub scan_coverage: BTreeMap<String, DetectorCoverage>,
    #[serde(default)]
    pub dimension_scores: BTreeMap<String, DimensionScore>,
    #[serde(default = "default_score")]
    pub overall_score: f64,
    #[serde(default = "default_score")]
    pub strict_score: f64,
    #[serde(default = "default_score")]
    pub objective_score: f64,
    #[serde(default = "default_score")]
    pub verified_strict_score: f64,
    #[serde(default)]
    pub subjective_integrity: IntegrityReport,
    #[serde(default)]
    pub score_confidence: ScoreConfidence,
    #[serde(default)]
    pub stats: LedgerStats,
    #[serde(default)]
    pub scan_history: Vec<ScanRecord>,
}

impl Ledger {
    /// Fresh empty state.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            version: STATE_VERSION,
            created: now,
            last_scan: None,
            scan_count: 0,
            config: LedgerConfig::default(),
            findings: BTreeMap::new(),
            potentials: BTreeMap::new(),
            subjective_assessments: BTreeMap::new(),
            scan_coverage: BTreeMap::new(),
            dimension_scores: BTreeMap::new(),
            overall_score: default_score(),
            strict_score: default_score(),
            objective_score: default_score(),
            verified_strict_score: default_score(),
            subjective_integrity: IntegrityReport::default(),
            score_confidence: ScoreConfidence::default(),
            stats: LedgerStats::default(),
            scan_history: Vec::new(),
        }
    }

    /// Canonical state file path under a project root.
    pub fn state_path(root: &Path) -> PathBuf {
        root.join(STATE_DIR).join(STATE_FILE)
    }

    /// Load state from disk, or return fresh state when none exists.
    pub fn load(path: &Path, now: DateTime<Utc>) -> LedgerResult<Self> {
        if !path.exists() {
            debug!("No state file at {}; starting fresh", path.display());
            return Ok(Self::new(now));
        }
        let content = fs::read_to_string(path).map_err(|source| LedgerError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let ledger = serde_json::from_str(&content).map_err(|source| LedgerError::ParseFailed {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Loaded state from {}", path.display());
        Ok(ledger)
    }

    /// Persist atomically: serialize, write a sibling temp file, rename over
    /// the target. The temp file is removed on any failure before the error
    /// propagates.
    pub fn save(&self, path: &Path) -> LedgerResult<()> {
        let write_failed = |source: std::io::Error| LedgerError::WriteFailed {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_failed)?;
        }

        let payload = serde_json::to_string_pretty(self).map_err(|e| LedgerError::WriteFailed {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        })?;

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, payload.as_bytes()).map_err(write_failed)?;
        if let Err(source) = fs::rename(&tmp, path) {
            let _ = fs::remove_file(&tmp);
            return Err(write_failed(source));
        }
        info!("Persisted state to {}", path.display());
        Ok(())
    }

    /// Merge one scan into the ledger: findings, potentials, coverage, and a
    /// scan-history record. Scores are *not* refreshed here; the caller runs
    /// the scoring pass afterwards.
    pub fn apply_scan(
        &mut self,
        scope: &ScanScope,
        candidates: Vec<RawCandidate>,
        skipped: Vec<SkippedCandidate>,
        potentials: Option<BTreeMap<String, u64>>,
        coverage: Option<BTreeMap<String, DetectorCoverage>>,
        now: DateTime<Utc>,
    ) -> MergeDiff {
        let raw_findings = candidates.len() + skipped.len();

        if let Some(batch_potentials) = potentials {
            let key = scope.source.clone().unwrap_or_else(|| "default".to_string());
            self.potentials.insert(key, batch_potentials);
        }
        if let Some(batch_coverage) = coverage {
            self.scan_coverage = batch_coverage;
        }

        let diff = merge::merge_findings(
            &mut self.findings,
            &self.config.ignore,
            scope,
            candidates,
            skipped,
            now,
        );

        self.last_scan = Some(now);
        self.scan_count += 1;
        self.stats = stats::compute_stats(&self.findings);

        self.scan_history.push(ScanRecord {
            timestamp: now,
            source: scope.source.clone(),
            new: diff.new,
            reopened: diff.reopened,
            auto_resolved: diff.auto_resolved,
            raw_findings,
            ignored: diff.suppressed,
            ignore_patterns: self.config.ignore.len(),
            total_open: self.stats.counters.open,
        });
        if self.scan_history.len() > HISTORY_LIMIT {
            let excess = self.scan_history.len() - HISTORY_LIMIT;
            self.scan_history.drain(..excess);
        }

        diff
    }

    /// Add an ignore pattern and suppress every matching finding.
    ///
    /// Returns the number of findings newly suppressed.
    pub fn add_ignore(&mut self, pattern: &str, now: DateTime<Utc>) -> usize {
        if !self.config.ignore.iter().any(|p| p == pattern) {
            self.config.ignore.push(pattern.to_string());
        }
        let suppressed = suppress::suppress_matching(&mut self.findings, pattern, now);
        self.stats = stats::compute_stats(&self.findings);
        suppressed.len()
    }

    /// Remove an ignore pattern and lift suppression no longer covered.
    ///
    /// Returns the ids released back into visibility.
    pub fn remove_ignore(&mut self, pattern: &str) -> Vec<String> {
        self.config.ignore.retain(|p| p != pattern);
        let released = suppress::unsuppress_unmatched(&mut self.findings, &self.config.ignore);
        self.stats = stats::compute_stats(&self.findings);
        released
    }

    /// Sum potentials across sources per detector.
    pub fn merged_potentials(&self) -> BTreeMap<String, u64> {
        let mut merged: BTreeMap<String, u64> = BTreeMap::new();
        for source_potentials in self.potentials.values() {
            for (detector, count) in source_potentials {
                *merged.entry(detector.clone()).or_insert(0) += count;
            }
        }
        merged
    }

}
