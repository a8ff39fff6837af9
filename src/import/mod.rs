//! Import payload parsing and application
//!
//! Two payloads cross this boundary: detector scan batches and subjective
//! review imports. Validation is two-level: a payload that is not even the
//! right shape fails the whole import (it cannot be trusted), while an
//! individual malformed entry is rejected on its own with a recorded reason
//! and the rest of the batch proceeds.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::ledger::finding::{Confidence, Detail, FindingStatus, RawCandidate, Zone};
use crate::ledger::merge::{MergeDiff, SkippedCandidate};
use crate::ledger::scores::{
    clamp_score, AssessmentSource, DetectorCoverage, SubjectiveAssessment,
};
use crate::ledger::Ledger;
use crate::scoring::policy::normalize_dimension_key;

/// Result type for import operations
pub type ImportResult<T> = Result<T, ImportError>;

/// Hard failures: the payload shape itself cannot be trusted
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Failed to read import file {path}: {source}")]
    ReadFailed {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Import payload is not valid JSON: {source}")]
    InvalidJson {
        #[source]
        source: serde_json::Error,
    },

    #[error("Import payload schema violation: {reason}")]
    Schema { reason: String },
}

/// A parsed detector scan batch.
#[derive(Debug, Default)]
pub struct ScanBatch {
    pub candidates: Vec<RawCandidate>,
    pub skipped: Vec<SkippedCandidate>,
    pub potentials: Option<BTreeMap<String, u64>>,
    pub coverage: Option<BTreeMap<String, DetectorCoverage>>,
}

fn string_field(entry: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    entry.get(key).and_then(Value::as_str).map(str::to_string)
}

fn reject(entry: &serde_json::Map<String, Value>, reason: &str) -> SkippedCandidate {
    SkippedCandidate {
        detector: string_field(entry, "detector"),
        file: string_field(entry, "file"),
        reason: reason.to_string(),
    }
}

/// Validate one raw candidate entry.
///
/// Missing required fields reject the entry; numeric anomalies (tier out of
/// range, unknown confidence label) are clamped or defaulted instead.
fn parse_candidate(value: &Value) -> Result<RawCandidate, SkippedCandidate> {
    let entry = value.as_object().ok_or_else(|| SkippedCandidate {
        detector: None,
        file: None,
        reason: "candidate is not an object".to_string(),
    })?;

    let detector = string_field(entry, "detector")
        .filter(|s| !s.is_empty())
        .ok_or_else(|| reject(entry, "missing required field: detector"))?;
    let file = string_field(entry, "file")
        .filter(|s| !s.is_empty())
        .ok_or_else(|| reject(entry, "missing required field: file"))?;
    let summary = string_field(entry, "summary")
        .filter(|s| !s.is_empty())
        .ok_or_else(|| reject(entry, "missing required field: summary"))?;
    let tier = entry
        .get("tier")
        .and_then(Value::as_i64)
        .ok_or_else(|| reject(entry, "missing required field: tier"))?
        .clamp(1, 4) as u8;

    let name = string_field(entry, "name").unwrap_or_default();
    let confidence = string_field(entry, "confidence")
        .map(|label| Confidence::from_label(&label))
        .unwrap_or(Confidence::Low);
    let zone = string_field(entry, "zone")
        .map(|label| Zone::from_label(&label))
        .unwrap_or_default();

    let detail: Detail = match entry.get("detail") {
        None | Some(Value::Null) => Detail::default(),
        Some(raw) => serde_json::from_value(raw.clone())
            .map_err(|_| reject(entry, "detail is not an object"))?,
    };

    Ok(RawCandidate {
        detector,
        file,
        name,
        tier,
        confidence,
        summary,
        detail,
        zone,
    })
}

fn parse_potentials(value: &Value) -> ImportResult<BTreeMap<String, u64>> {
    let table = value
        .as_object()
        .ok_or_else(|| ImportError::Schema {
            reason: "potentials is not an object".to_string(),
        })?;
    let mut potentials = BTreeMap::new();
    for (detector, count) in table {
        // Negative or non-numeric counts floor at zero
        let count = count.as_i64().unwrap_or(0).max(0) as u64;
        potentials.insert(detector.clone(), count);
    }
    Ok(potentials)
}

fn parse_coverage(value: &Value) -> ImportResult<BTreeMap<String, DetectorCoverage>> {
    let table = value
        .as_object()
        .ok_or_else(|| ImportError::Schema {
            reason: "coverage is not an object".to_string(),
        })?;
    let mut coverage = BTreeMap::new();
    for (detector, record) in table {
        match serde_json::from_value::<DetectorCoverage>(record.clone()) {
            Ok(parsed) => {
                coverage.insert(detector.clone(), parsed);
            }
            Err(e) => warn!("Ignoring malformed coverage record for {}: {}", detector, e),
        }
    }
    Ok(coverage)
}

/// Parse a detector batch payload.
///
/// The payload must be an object with a `findings` array; anything else is a
/// schema violation that fails the whole import.
pub fn parse_scan_batch(value: &Value) -> ImportResult<ScanBatch> {
    let payload = value.as_object().ok_or_else(|| ImportError::Schema {
        reason: "payload is not an object".to_string(),
    })?;
    let findings = payload
        .get("findings")
        .ok_or_else(|| ImportError::Schema {
            reason: "missing findings list".to_string(),
        })?
        .as_array()
        .ok_or_else(|| ImportError::Schema {
            reason: "findings is not a list".to_string(),
        })?;

    let mut batch = ScanBatch::default();
    for entry in findings {
        match parse_candidate(entry) {
            Ok(candidate) => batch.candidates.push(candidate),
            Err(skipped) => {
                debug!("Rejected candidate: {}", skipped.reason);
                batch.skipped.push(skipped);
            }
        }
    }

    if let Some(potentials) = payload.get("potentials") {
        batch.potentials = Some(parse_potentials(potentials)?);
    }
    if let Some(coverage) = payload.get("coverage") {
        batch.coverage = Some(parse_coverage(coverage)?);
    }

    info!(
        "Parsed scan batch: {} candidates, {} rejected",
        batch.candidates.len(),
        batch.skipped.len()
    );
    Ok(batch)
}

/// An assessment entry rejected or ignored during import, with the reason.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct IgnoredAssessment {
    pub dimension: String,
    pub reason: String,
}

/// A parsed subjective review import.
#[derive(Debug, Default)]
pub struct ReviewImport {
    pub findings: Vec<RawCandidate>,
    pub skipped: Vec<SkippedCandidate>,
    pub assessments: BTreeMap<String, SubjectiveAssessment>,
    pub rejected_assessments: Vec<IgnoredAssessment>,
    pub reviewed_files: Vec<String>,
}

fn parse_assessment(raw: &Value) -> Result<SubjectiveAssessment, String> {
    match raw {
        Value::Number(number) => {
            let score = number.as_f64().ok_or("score is not a finite number")?;
            Ok(SubjectiveAssessment {
                score: clamp_score(score),
                ..SubjectiveAssessment::default()
            })
        }
        Value::Object(entry) => {
            let score = entry
                .get("score")
                .and_then(Value::as_f64)
                .ok_or("missing numeric score")?;
            let source = match entry.get("source").and_then(Value::as_str) {
                Some("holistic") => AssessmentSource::Holistic,
                _ => AssessmentSource::PerFile,
            };
            let components = entry
                .get("components")
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default();
            let component_scores = entry
                .get("component_scores")
                .and_then(Value::as_object)
                .map(|table| {
                    table
                        .iter()
                        .filter_map(|(name, value)| {
                            value.as_f64().map(|score| (name.clone(), clamp_score(score)))
                        })
                        .collect()
                })
                .unwrap_or_default();
            Ok(SubjectiveAssessment {
                score: clamp_score(score),
                source,
                components,
                component_scores,
                ..SubjectiveAssessment::default()
            })
        }
        _ => Err("assessment is neither a number nor an object".to_string()),
    }
}

/// Parse a review import payload (`findings` + `assessments` +
/// `reviewed_files`).
pub fn parse_review_import(value: &Value) -> ImportResult<ReviewImport> {
    let payload = value.as_object().ok_or_else(|| ImportError::Schema {
        reason: "payload is not an object".to_string(),
    })?;

    if !payload.contains_key("findings") && !payload.contains_key("assessments") {
        return Err(ImportError::Schema {
            reason: "payload has neither findings nor assessments".to_string(),
        });
    }

    let mut import = ReviewImport::default();

    if let Some(raw_findings) = payload.get("findings") {
        let findings = raw_findings.as_array().ok_or_else(|| ImportError::Schema {
            reason: "findings is not a list".to_string(),
        })?;
        for entry in findings {
            match parse_candidate(entry) {
                Ok(candidate) => import.findings.push(candidate),
                Err(skipped) => import.skipped.push(skipped),
            }
        }
    }

    if let Some(raw_assessments) = payload.get("assessments") {
        let assessments = raw_assessments.as_object().ok_or_else(|| ImportError::Schema {
            reason: "assessments is not an object".to_string(),
        })?;
        for (raw_key, raw_value) in assessments {
            let key = normalize_dimension_key(raw_key);
            if key.is_empty() {
                import.rejected_assessments.push(IgnoredAssessment {
                    dimension: raw_key.clone(),
                    reason: "empty dimension key".to_string(),
                });
                continue;
            }
            match parse_assessment(raw_value) {
                Ok(assessment) => {
                    import.assessments.insert(key, assessment);
                }
                Err(reason) => import.rejected_assessments.push(IgnoredAssessment {
                    dimension: raw_key.clone(),
                    reason,
                }),
            }
        }
    }

    if let Some(raw_files) = payload.get("reviewed_files") {
        let files = raw_files.as_array().ok_or_else(|| ImportError::Schema {
            reason: "reviewed_files is not a list".to_string(),
        })?;
        import.reviewed_files = files
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect();
    }

    Ok(import)
}

/// Structured result of applying a review import.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewImportReport {
    pub findings: MergeDiff,
    pub assessments_imported: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub assessments_ignored: Vec<IgnoredAssessment>,
    /// Stale review findings auto-resolved via `reviewed_files`
    pub stale_resolved: usize,
}

/// Upsert review findings without the scan-style auto-resolve sweep.
///
/// A review import is inherently partial: only findings for re-reviewed
/// files go stale, so absence elsewhere means nothing.
fn upsert_review_findings(
    ledger: &mut Ledger,
    candidates: Vec<RawCandidate>,
    skipped: Vec<SkippedCandidate>,
    now: DateTime<Utc>,
) -> (MergeDiff, Vec<String>) {
    let mut diff = MergeDiff {
        skipped: skipped.len(),
        skipped_details: skipped,
        ..MergeDiff::default()
    };
    let mut imported_ids = Vec::new();

    for candidate in candidates {
        let id = candidate.id();
        imported_ids.push(id.clone());
        match ledger.findings.get_mut(&id) {
            Some(existing) => {
                existing.last_seen = now;
                existing.tier = candidate.tier;
                existing.confidence = candidate.confidence;
                existing.summary = candidate.summary;
                existing.detail = candidate.detail;
                if existing.status == FindingStatus::AutoResolved {
                    existing.status = FindingStatus::Open;
                    existing.reopen_count += 1;
                    existing.resolved_at = None;
                    diff.reopened += 1;
                }
            }
            None => {
                ledger.findings.insert(id, candidate.into_finding(now, None));
                diff.new += 1;
            }
        }
    }
    diff.total_current = imported_ids.len();
    (diff, imported_ids)
}

/// Auto-resolve open review findings scoped to re-reviewed files that the
/// fresh import no longer reports.
fn resolve_stale_review_findings(
    ledger: &mut Ledger,
    reviewed_files: &[String],
    imported_ids: &[String],
    now: DateTime<Utc>,
) -> usize {
    let mut resolved = 0;
    for (id, finding) in ledger.findings.iter_mut() {
        if finding.suppressed || finding.status != FindingStatus::Open {
            continue;
        }
        if finding.detector != "review" {
            continue;
        }
        if !reviewed_files.iter().any(|file| file == &finding.file) {
            continue;
        }
        if imported_ids.contains(id) {
            continue;
        }
        finding.status = FindingStatus::AutoResolved;
        finding.resolved_at = Some(now);
        finding.note = Some("Not re-reported by fresh review of this file".to_string());
        resolved += 1;
    }
    resolved
}

/// Apply a parsed review import to the ledger.
///
/// Holistic assessments take precedence: a later per-file import never
/// downgrades an existing holistic assessment for the same dimension.
pub fn apply_review_import(
    ledger: &mut Ledger,
    import: ReviewImport,
    now: DateTime<Utc>,
) -> ReviewImportReport {
    let ReviewImport {
        findings,
        skipped,
        assessments,
        mut rejected_assessments,
        reviewed_files,
    } = import;

    let (diff, imported_ids) = upsert_review_findings(ledger, findings, skipped, now);
    let stale_resolved = resolve_stale_review_findings(ledger, &reviewed_files, &imported_ids, now);

    let mut imported = 0;
    for (dimension, mut assessment) in assessments {
        if let Some(existing) = ledger.subjective_assessments.get(&dimension) {
            let downgrade = existing.source == AssessmentSource::Holistic
                && !existing.placeholder
                && assessment.source == AssessmentSource::PerFile;
            if downgrade {
                rejected_assessments.push(IgnoredAssessment {
                    dimension,
                    reason: "holistic assessment takes precedence over per-file import".to_string(),
                });
                continue;
            }
        }
        assessment.assessed_at = Some(now);
        ledger.subjective_assessments.insert(dimension, assessment);
        imported += 1;
    }

    ledger.stats = crate::ledger::stats::compute_stats(&ledger.findings);

    info!(
        "Review import: {} new, {} reopened findings; {} assessments; {} stale resolved",
        diff.new, diff.reopened, imported, stale_resolved
    );
    ReviewImportReport {
        findings: diff,
        assessments_imported: imported,
        assessments_ignored: rejected_assessments,
        stale_resolved,
    }
}

/// Read and parse a JSON payload from disk.
pub fn load_json(path: &std::path::Path) -> ImportResult<Value> {
    let content = std::fs::read_to_string(path).map_err(|source| ImportError::ReadFailed {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| ImportError::InvalidJson { source })
}
