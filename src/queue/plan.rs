//! Living plan
//!
//! A persisted user ordering over the work queue: explicit queue order,
//! skipped items, clusters, and superseded entries. The plan is a read-only
//! input to queue construction; reconciliation after a scan is the only
//! place the engine mutates it.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ledger::finding::FindingStatus;
use crate::ledger::{Ledger, STATE_DIR};

/// On-disk plan schema version.
pub const PLAN_VERSION: u32 = 1;

/// Plan file name inside the state directory.
pub const PLAN_FILE: &str = "plan.json";

/// Superseded entries older than this are pruned.
pub const SUPERSEDED_TTL_DAYS: i64 = 90;

/// Synthetic queue-item id prefix for subjective dimensions; these ids are
/// managed by the queue, not reconciled against findings.
pub const SUBJECTIVE_ID_PREFIX: &str = "subjective::";

/// Remap candidates recorded per superseded entry.
const MAX_REMAP_CANDIDATES: usize = 5;

/// Result type for plan operations
pub type PlanResult<T> = Result<T, PlanError>;

/// Errors raised by plan persistence and validation
#[derive(Error, Debug)]
pub enum PlanError {
    #[error("Failed to read plan file {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse plan file {path}: {source}")]
    ParseFailed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write plan file {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Plan invariant violated: {reason}")]
    Invalid { reason: String },
}

/// Why an item was taken out of the live queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipKind {
    /// Deferred; may carry a `review_after` scan count
    Temporary,
    /// Deliberate wontfix
    Permanent,
    /// Not a real issue
    FalsePositive,
}

/// One skipped queue item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkipEntry {
    pub kind: SkipKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Re-surface after this many scans (temporary skips only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_after: Option<u32>,
    /// `scan_count` at skip time
    #[serde(default)]
    pub skipped_at_scan: u32,
}

/// User annotations attached to a queue item.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<String>,
}

/// How a cluster of findings is expected to be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterAction {
    AutoFix,
    Reorganize,
    Refactor,
    ManualFix,
}

impl ClusterAction {
    /// Queue priority; auto-fixable work first.
    pub fn rank(self) -> u8 {
        match self {
            ClusterAction::AutoFix => 0,
            ClusterAction::Reorganize => 1,
            ClusterAction::Refactor => 2,
            ClusterAction::ManualFix => 3,
        }
    }
}

/// A bundle of related findings under one actionable unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub finding_ids: Vec<String>,
    /// Auto-generated clusters collapse in the queue; manual ones do not
    #[serde(default)]
    pub auto: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_type: Option<ClusterAction>,
    #[serde(default)]
    pub user_modified: bool,
}

/// A plan reference that no longer maps cleanly to a current finding.
///
/// Surfaced for manual reconciliation, never auto-resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupersededEntry {
    pub original_detector: String,
    pub original_file: String,
    pub original_summary: String,
    pub superseded_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remapped_to: Option<String>,
    /// Open findings that might be the same issue under a new id
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub candidates: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// The persisted living plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub version: u32,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    #[serde(default)]
    pub queue_order: Vec<String>,
    #[serde(default)]
    pub skipped: BTreeMap<String, SkipEntry>,
    #[serde(default)]
    pub overrides: BTreeMap<String, ItemOverride>,
    #[serde(default)]
    pub clusters: BTreeMap<String, Cluster>,
    #[serde(default)]
    pub superseded: BTreeMap<String, SupersededEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_cluster: Option<String>,
}

impl Plan {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            version: PLAN_VERSION,
            created: now,
            updated: now,
            queue_order: Vec::new(),
            skipped: BTreeMap::new(),
            overrides: BTreeMap::new(),
            clusters: BTreeMap::new(),
            superseded: BTreeMap::new(),
            active_cluster: None,
        }
    }

    pub fn plan_path(root: &Path) -> PathBuf {
        root.join(STATE_DIR).join(PLAN_FILE)
    }

    /// Load the plan, or `None` when no plan file exists yet.
    pub fn load(path: &Path) -> PlanResult<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path).map_err(|source| PlanError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let plan: Plan = serde_json::from_str(&content).map_err(|source| PlanError::ParseFailed {
            path: path.to_path_buf(),
            source,
        })?;
        plan.validate()?;
        Ok(Some(plan))
    }

    /// Persist atomically, same temp-and-rename discipline as the ledger.
    pub fn save(&self, path: &Path, now: DateTime<Utc>) -> PlanResult<()> {
        let mut plan = self.clone();
        plan.updated = now;
        plan.validate()?;

        let write_failed = |source: std::io::Error| PlanError::WriteFailed {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_failed)?;
        }
        let payload = serde_json::to_string_pretty(&plan).map_err(|e| PlanError::WriteFailed {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        })?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, payload.as_bytes()).map_err(write_failed)?;
        if let Err(source) = fs::rename(&tmp, path) {
            let _ = fs::remove_file(&tmp);
            return Err(write_failed(source));
        }
        Ok(())
    }

    /// Check plan invariants.
    pub fn validate(&self) -> PlanResult<()> {
        let overlap: Vec<&String> = self
            .queue_order
            .iter()
            .filter(|id| self.skipped.contains_key(*id))
            .collect();
        if !overlap.is_empty() {
            return Err(PlanError::Invalid {
                reason: format!("ids cannot be both ordered and skipped: {:?}", overlap),
            });
        }
        Ok(())
    }

    /// Skip one item. Removes it from `queue_order` if present.
    pub fn skip(
        &mut self,
        finding_id: &str,
        kind: SkipKind,
        reason: Option<String>,
        review_after: Option<u32>,
        scan_count: u32,
        now: DateTime<Utc>,
    ) {
        self.queue_order.retain(|id| id != finding_id);
        self.skipped.insert(
            finding_id.to_string(),
            SkipEntry {
                kind,
                reason,
                note: None,
                created_at: now,
                review_after,
                skipped_at_scan: scan_count,
            },
        );
    }

    /// Remove a skip so the item re-enters the live queue.
    pub fn unskip(&mut self, finding_id: &str) -> bool {
        self.skipped.remove(finding_id).is_some()
    }
}

/// Summary of one post-scan reconciliation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileResult {
    pub superseded: Vec<String>,
    pub resurfaced: Vec<String>,
    pub pruned: Vec<String>,
}

impl ReconcileResult {
    pub fn changes(&self) -> usize {
        self.superseded.len() + self.resurfaced.len() + self.pruned.len()
    }
}

fn finding_is_live(ledger: &Ledger, finding_id: &str) -> bool {
    ledger
        .findings
        .get(finding_id)
        .map(|f| f.status == FindingStatus::Open && !f.suppressed)
        .unwrap_or(false)
}

/// Open findings that could be remaps for a disappeared finding.
fn remap_candidates(ledger: &Ledger, detector: &str, file: &str, original_id: &str) -> Vec<String> {
    ledger
        .findings
        .iter()
        .filter(|(id, f)| {
            id.as_str() != original_id
                && f.status == FindingStatus::Open
                && !f.suppressed
                && f.detector == detector
                && f.file == file
        })
        .map(|(id, _)| id.clone())
        .take(MAX_REMAP_CANDIDATES)
        .collect()
}

fn supersede(plan: &mut Plan, ledger: &Ledger, finding_id: &str, now: DateTime<Utc>) {
    let (detector, file, summary) = ledger
        .findings
        .get(finding_id)
        .map(|f| (f.detector.clone(), f.file.clone(), f.summary.clone()))
        .unwrap_or_default();

    let mut entry = SupersededEntry {
        candidates: if detector.is_empty() {
            Vec::new()
        } else {
            remap_candidates(ledger, &detector, &file, finding_id)
        },
        original_detector: detector,
        original_file: file,
        original_summary: summary,
        superseded_at: now,
        remapped_to: None,
        note: None,
    };
    if let Some(override_entry) = plan.overrides.get(finding_id) {
        entry.note = override_entry.note.clone();
    }
    plan.superseded.insert(finding_id.to_string(), entry);

    plan.queue_order.retain(|id| id != finding_id);
    plan.skipped.remove(finding_id);
    for cluster in plan.clusters.values_mut() {
        cluster.finding_ids.retain(|id| id != finding_id);
    }
}

/// Reconcile the plan against current ledger state after a scan.
///
/// Plan references that are no longer live move to `superseded` with remap
/// candidates; stale temporary skips resurface; old superseded entries are
/// pruned.
pub fn reconcile_after_scan(plan: &mut Plan, ledger: &Ledger, now: DateTime<Utc>) -> ReconcileResult {
    let mut result = ReconcileResult::default();

    let mut referenced: Vec<String> = Vec::new();
    referenced.extend(plan.queue_order.iter().cloned());
    referenced.extend(plan.skipped.keys().cloned());
    referenced.extend(plan.overrides.keys().cloned());
    for cluster in plan.clusters.values() {
        referenced.extend(cluster.finding_ids.iter().cloned());
    }
    referenced.sort();
    referenced.dedup();
    referenced.retain(|id| {
        !plan.superseded.contains_key(id) && !id.starts_with(SUBJECTIVE_ID_PREFIX)
    });

    for finding_id in referenced {
        if !finding_is_live(ledger, &finding_id) {
            supersede(plan, ledger, &finding_id, now);
            debug!("Superseded plan reference {}", finding_id);
            result.superseded.push(finding_id);
        }
    }

    // Temporary skips with an elapsed review window re-enter the queue.
    let resurface: Vec<String> = plan
        .skipped
        .iter()
        .filter(|(_, entry)| {
            entry.kind == SkipKind::Temporary
                && entry
                    .review_after
                    .is_some_and(|after| ledger.scan_count >= entry.skipped_at_scan + after)
        })
        .map(|(id, _)| id.clone())
        .collect();
    for id in resurface {
        plan.skipped.remove(&id);
        result.resurfaced.push(id);
    }

    let cutoff = now - Duration::days(SUPERSEDED_TTL_DAYS);
    let prune: Vec<String> = plan
        .superseded
        .iter()
        .filter(|(_, entry)| entry.superseded_at < cutoff)
        .map(|(id, _)| id.clone())
        .collect();
    for id in prune {
        plan.superseded.remove(&id);
        plan.overrides.remove(&id);
        result.pruned.push(id);
    }

    if result.changes() > 0 {
        info!(
            "Plan reconciled: {} superseded, {} resurfaced, {} pruned",
            result.superseded.len(),
            result.resurfaced.len(),
            result.pruned.len()
        );
    }
    result
}
