//! Scan reconciliation
//!
//! Merges one scan's candidate findings against ledger history. Reconciliation
//! keys on the stable finding id, so candidate ordering is irrelevant and
//! merging the same batch twice is a no-op. A single malformed candidate never
//! aborts the merge; it is rejected individually with a recorded reason.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::ledger::finding::{Finding, FindingStatus, RawCandidate};
use crate::ledger::suppress::{is_ignored, pattern_matches};

/// A detector with at least this many previously open findings that suddenly
/// reports zero is treated as a transient failure, not a mass fix.
pub const SUSPECT_DETECTOR_MIN: usize = 5;

/// Open findings that have bounced back at least this often are chronic.
const CHRONIC_REOPEN_MIN: u32 = 2;

/// What part of the codebase this scan covered.
///
/// Findings outside the scope are never auto-resolved just because the scan
/// did not visit them.
#[derive(Debug, Clone, Default)]
pub struct ScanScope {
    /// Scan source label (e.g. language); restricts auto-resolution
    pub source: Option<String>,
    /// Relative path prefix the scan was limited to
    pub path: Option<String>,
    /// Directory fragments excluded from the scan
    pub exclude: Vec<String>,
    /// Auto-resolve unconditionally, across scope and flake protection
    pub force_resolve: bool,
}

impl ScanScope {
    /// Whether a finding's file falls inside the scanned path.
    fn contains_file(&self, file: &str) -> bool {
        match &self.path {
            None => true,
            Some(path) => {
                let prefix = path.trim_end_matches('/');
                file == prefix || file.starts_with(&format!("{}/", prefix))
            }
        }
    }

    fn excludes_file(&self, file: &str) -> bool {
        self.exclude.iter().any(|fragment| file.contains(fragment.as_str()))
    }
}

/// A candidate rejected during batch validation, with the reason.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SkippedCandidate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    pub reason: String,
}

/// Structured summary of one merge, reported to the caller verbatim.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MergeDiff {
    pub new: usize,
    pub reopened: usize,
    pub auto_resolved: usize,
    /// Candidates dropped by active ignore rules this batch
    pub suppressed: usize,
    /// Malformed candidates rejected individually
    pub skipped: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped_details: Vec<SkippedCandidate>,
    pub total_current: usize,
    /// Detectors whose findings were protected from auto-resolution
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suspect_detectors: Vec<String>,
    pub chronic_reopeners: usize,
    pub skipped_out_of_scope: usize,
    pub skipped_other_source: usize,
}

impl MergeDiff {
    /// True when the merge changed nothing (repeat of an identical batch).
    pub fn is_noop(&self) -> bool {
        self.new == 0 && self.reopened == 0 && self.auto_resolved == 0
    }
}

/// Identify detectors that previously had open findings but returned zero.
fn find_suspect_detectors(
    findings: &BTreeMap<String, Finding>,
    current_by_detector: &HashMap<String, usize>,
    force_resolve: bool,
) -> Vec<String> {
    if force_resolve {
        return Vec::new();
    }
    let mut prev_by_detector: HashMap<&str, usize> = HashMap::new();
    for finding in findings.values() {
        if finding.status == FindingStatus::Open && !finding.suppressed {
            *prev_by_detector.entry(finding.detector.as_str()).or_insert(0) += 1;
        }
    }
    let mut suspect: Vec<String> = prev_by_detector
        .into_iter()
        .filter(|(detector, prev)| {
            *prev >= SUSPECT_DETECTOR_MIN && current_by_detector.get(*detector).copied().unwrap_or(0) == 0
        })
        .map(|(detector, _)| detector.to_string())
        .collect();
    suspect.sort();
    suspect
}

/// First active ignore pattern matching a candidate, if any.
fn matching_pattern<'a>(patterns: &'a [String], id: &str, file: &str) -> Option<&'a str> {
    patterns
        .iter()
        .find(|pattern| pattern_matches(pattern, id, file))
        .map(String::as_str)
}

/// Merge a validated candidate batch into the findings map.
///
/// `skipped` carries candidates already rejected during batch validation so
/// the diff reports the full picture of what the scan produced.
pub fn merge_findings(
    findings: &mut BTreeMap<String, Finding>,
    ignore_patterns: &[String],
    scope: &ScanScope,
    candidates: Vec<RawCandidate>,
    skipped: Vec<SkippedCandidate>,
    now: DateTime<Utc>,
) -> MergeDiff {
    let mut diff = MergeDiff {
        skipped: skipped.len(),
        skipped_details: skipped,
        ..MergeDiff::default()
    };

    let mut current_ids: HashSet<String> = HashSet::new();
    let mut current_by_detector: HashMap<String, usize> = HashMap::new();

    for candidate in candidates {
        let id = candidate.id();

        if let Some(pattern) = matching_pattern(ignore_patterns, &id, &candidate.file) {
            diff.suppressed += 1;
            // A previously tracked finding under a fresh ignore rule becomes
            // invisible but keeps its historical status.
            if let Some(existing) = findings.get_mut(&id) {
                if !existing.suppressed {
                    existing.suppressed = true;
                    existing.suppressed_at = Some(now);
                    existing.suppression_pattern = Some(pattern.to_string());
                }
            }
            continue;
        }

        current_ids.insert(id.clone());
        *current_by_detector.entry(candidate.detector.clone()).or_insert(0) += 1;

        match findings.get_mut(&id) {
            Some(existing) => {
                existing.last_seen = now;
                // Detector metadata may legitimately shift between scans.
                existing.tier = candidate.tier;
                existing.confidence = candidate.confidence;
                existing.summary = candidate.summary;
                existing.detail = candidate.detail;
                existing.zone = candidate.zone;
                if existing.source.is_none() {
                    existing.source = scope.source.clone();
                }

                match existing.status {
                    FindingStatus::AutoResolved => {
                        existing.status = FindingStatus::Open;
                        existing.reopen_count += 1;
                        existing.resolved_at = None;
                        existing.note = Some(format!(
                            "Reopened (x{}): reappeared in scan",
                            existing.reopen_count
                        ));
                        diff.reopened += 1;
                    }
                    // Human decisions survive re-detection; re-reporting a
                    // dismissed issue is not an error and not "new".
                    FindingStatus::Fixed
                    | FindingStatus::Wontfix
                    | FindingStatus::FalsePositive
                    | FindingStatus::Open => {}
                }
            }
            None => {
                findings.insert(id, candidate.into_finding(now, scope.source.as_deref()));
                diff.new += 1;
            }
        }
    }

    diff.total_current = current_ids.len();
    diff.suspect_detectors = find_suspect_detectors(findings, &current_by_detector, scope.force_resolve);
    if !diff.suspect_detectors.is_empty() {
        warn!(
            "Detector(s) {:?} returned zero findings but previously had >= {}; \
             protecting their findings from auto-resolution",
            diff.suspect_detectors, SUSPECT_DETECTOR_MIN
        );
    }

    let suspects = diff.suspect_detectors.clone();
    auto_resolve_disappeared(findings, &current_ids, &suspects, scope, now, &mut diff);

    diff.chronic_reopeners = findings
        .values()
        .filter(|f| !f.suppressed && f.status == FindingStatus::Open && f.reopen_count >= CHRONIC_REOPEN_MIN)
        .count();

    info!(
        "Merge complete: {} new, {} reopened, {} auto-resolved, {} suppressed, {} skipped",
        diff.new, diff.reopened, diff.auto_resolved, diff.suppressed, diff.skipped
    );
    diff
}

/// Transition scope-matched findings absent from the scan to AutoResolved.
///
/// Wontfix findings that disappear are upgraded too, so the strict score
/// reflects the actual fix.
fn auto_resolve_disappeared(
    findings: &mut BTreeMap<String, Finding>,
    current_ids: &HashSet<String>,
    suspect_detectors: &[String],
    scope: &ScanScope,
    now: DateTime<Utc>,
    diff: &mut MergeDiff,
) {
    for (id, finding) in findings.iter_mut() {
        if current_ids.contains(id) || finding.suppressed {
            continue;
        }
        if !matches!(finding.status, FindingStatus::Open | FindingStatus::Wontfix) {
            continue;
        }
        if !scope.force_resolve {
            if let (Some(scan_source), Some(finding_source)) = (&scope.source, &finding.source) {
                if scan_source != finding_source {
                    diff.skipped_other_source += 1;
                    continue;
                }
            }
            if !scope.contains_file(&finding.file) {
                diff.skipped_out_of_scope += 1;
                continue;
            }
            // Excluded directories disappeared because of the filter, not a fix.
            if scope.excludes_file(&finding.file) {
                continue;
            }
            if suspect_detectors.iter().any(|d| d == &finding.detector) {
                continue;
            }
        }

        let was_wontfix = finding.status == FindingStatus::Wontfix;
        finding.status = FindingStatus::AutoResolved;
        finding.resolved_at = Some(now);
        finding.note = Some(if was_wontfix {
            "Fixed despite wontfix: disappeared from scan".to_string()
        } else {
            "Disappeared from scan: likely fixed".to_string()
        });
        diff.auto_resolved += 1;
        debug!("Auto-resolved {}", id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::finding::{Confidence, Detail, Zone};

    fn candidate(detector: &str, file: &str, name: &str) -> RawCandidate {
        RawCandidate {
            detector: detector.to_string(),
            file: file.to_string(),
            name: name.to_string(),
            tier: 2,
            confidence: Confidence::High,
            summary: format!("{} in {}", detector, file),
            detail: Detail::default(),
            zone: Zone::Production,
        }
    }

    fn merge(
        findings: &mut BTreeMap<String, Finding>,
        candidates: Vec<RawCandidate>,
        scope: &ScanScope,
        now: DateTime<Utc>,
    ) -> MergeDiff {
        merge_findings(findings, &[], scope, candidates, Vec::new(), now)
    }

    #[test]
    fn test_new_findings_inserted_open() {
        let mut findings = BTreeMap::new();
        let now = Utc::now();
        let diff = merge(
            &mut findings,
            vec![candidate("unused", "src/a.rs", "foo")],
            &ScanScope::default(),
            now,
        );

        assert_eq!(diff.new, 1);
        let finding = &findings["unused::src/a.rs::foo"];
        assert_eq!(finding.status, FindingStatus::Open);
        assert_eq!(finding.first_seen, now);
        assert_eq!(finding.last_seen, now);
    }

    #[test]
    fn test_merge_idempotent() {
        let mut findings = BTreeMap::new();
        let scope = ScanScope::default();
        let batch = || vec![candidate("unused", "src/a.rs", "foo"), candidate("large", "src/b.rs", "")];

        let first = merge(&mut findings, batch(), &scope, Utc::now());
        assert_eq!(first.new, 2);

        let snapshot: Vec<(String, FindingStatus)> = findings
            .iter()
            .map(|(id, f)| (id.clone(), f.status))
            .collect();

        let second = merge(&mut findings, batch(), &scope, Utc::now());
        assert!(second.is_noop(), "second merge of identical batch must be a no-op: {:?}", second);

        let after: Vec<(String, FindingStatus)> = findings
            .iter()
            .map(|(id, f)| (id.clone(), f.status))
            .collect();
        assert_eq!(snapshot, after);
    }

    #[test]
    fn test_auto_resolve_on_disappearance() {
        let mut findings = BTreeMap::new();
        let scope = ScanScope::default();
        merge(&mut findings, vec![candidate("unused", "src/a.rs", "foo")], &scope, Utc::now());

        let now = Utc::now();
        let diff = merge(&mut findings, vec![], &scope, now);
        assert_eq!(diff.auto_resolved, 1);

        let finding = &findings["unused::src/a.rs::foo"];
        assert_eq!(finding.status, FindingStatus::AutoResolved);
        assert_eq!(finding.resolved_at, Some(now));
    }

    #[test]
    fn test_reopen_auto_resolved_on_reappearance() {
        let mut findings = BTreeMap::new();
        let scope = ScanScope::default();
        merge(&mut findings, vec![candidate("unused", "src/a.rs", "foo")], &scope, Utc::now());
        merge(&mut findings, vec![], &scope, Utc::now());
        assert_eq!(findings["unused::src/a.rs::foo"].status, FindingStatus::AutoResolved);

        let diff = merge(&mut findings, vec![candidate("unused", "src/a.rs", "foo")], &scope, Utc::now());
        assert_eq!(diff.reopened, 1);
        assert_eq!(diff.new, 0);

        let finding = &findings["unused::src/a.rs::foo"];
        assert_eq!(finding.status, FindingStatus::Open);
        assert_eq!(finding.reopen_count, 1);
        assert!(finding.resolved_at.is_none());
    }

    #[test]
    fn test_manual_resolutions_survive_redetection() {
        let mut findings = BTreeMap::new();
        let scope = ScanScope::default();
        merge(&mut findings, vec![candidate("unused", "src/a.rs", "foo")], &scope, Utc::now());

        for status in [FindingStatus::Fixed, FindingStatus::Wontfix, FindingStatus::FalsePositive] {
            findings.get_mut("unused::src/a.rs::foo").unwrap().status = status;
            let diff = merge(&mut findings, vec![candidate("unused", "src/a.rs", "foo")], &scope, Utc::now());
            assert_eq!(diff.new, 0, "re-detection of a dismissed issue is not new");
            assert_eq!(diff.reopened, 0);
            assert_eq!(findings["unused::src/a.rs::foo"].status, status);
        }
    }

    #[test]
    fn test_wontfix_disappearance_upgraded() {
        let mut findings = BTreeMap::new();
        let scope = ScanScope::default();
        merge(&mut findings, vec![candidate("unused", "src/a.rs", "foo")], &scope, Utc::now());
        findings.get_mut("unused::src/a.rs::foo").unwrap().status = FindingStatus::Wontfix;

        let diff = merge(&mut findings, vec![], &scope, Utc::now());
        assert_eq!(diff.auto_resolved, 1);
        let finding = &findings["unused::src/a.rs::foo"];
        assert_eq!(finding.status, FindingStatus::AutoResolved);
        assert!(finding.note.as_deref().unwrap().contains("wontfix"));
    }

    #[test]
    fn test_suppressed_findings_not_auto_resolved() {
        let mut findings = BTreeMap::new();
        let scope = ScanScope::default();
        merge(&mut findings, vec![candidate("unused", "src/a.rs", "foo")], &scope, Utc::now());
        let f = findings.get_mut("unused::src/a.rs::foo").unwrap();
        f.suppressed = true;

        let diff = merge(&mut findings, vec![], &scope, Utc::now());
        assert_eq!(diff.auto_resolved, 0);
        assert_eq!(findings["unused::src/a.rs::foo"].status, FindingStatus::Open);
    }

    #[test]
    fn test_ignored_candidate_not_inserted() {
        let mut findings = BTreeMap::new();
        let patterns = vec!["src/vendor/*".to_string()];
        let diff = merge_findings(
            &mut findings,
            &patterns,
            &ScanScope::default(),
            vec![candidate("unused", "src/vendor/dep.rs", "x")],
            Vec::new(),
            Utc::now(),
        );
        assert_eq!(diff.suppressed, 1);
        assert_eq!(diff.new, 0);
        assert!(findings.is_empty());
    }

    #[test]
    fn test_ignored_existing_finding_keeps_status() {
        let mut findings = BTreeMap::new();
        let scope = ScanScope::default();
        merge(&mut findings, vec![candidate("unused", "src/a.rs", "foo")], &scope, Utc::now());
        findings.get_mut("unused::src/a.rs::foo").unwrap().status = FindingStatus::Fixed;

        let patterns = vec!["src/a.rs".to_string()];
        merge_findings(
            &mut findings,
            &patterns,
            &scope,
            vec![candidate("unused", "src/a.rs", "foo")],
            Vec::new(),
            Utc::now(),
        );

        let finding = &findings["unused::src/a.rs::foo"];
        assert!(finding.suppressed);
        assert_eq!(finding.status, FindingStatus::Fixed);
    }

    #[test]
    fn test_path_scope_limits_auto_resolution() {
        let mut findings = BTreeMap::new();
        let scope = ScanScope::default();
        merge(
            &mut findings,
            vec![candidate("unused", "src/a.rs", "foo"), candidate("unused", "lib/b.rs", "bar")],
            &scope,
            Utc::now(),
        );

        let scoped = ScanScope {
            path: Some("src".to_string()),
            ..ScanScope::default()
        };
        let diff = merge(&mut findings, vec![], &scoped, Utc::now());

        assert_eq!(diff.auto_resolved, 1);
        assert_eq!(diff.skipped_out_of_scope, 1);
        assert_eq!(findings["unused::src/a.rs::foo"].status, FindingStatus::AutoResolved);
        assert_eq!(findings["unused::lib/b.rs::bar"].status, FindingStatus::Open);
    }

    #[test]
    fn test_force_resolve_crosses_scope() {
        let mut findings = BTreeMap::new();
        merge(
            &mut findings,
            vec![candidate("unused", "lib/b.rs", "bar")],
            &ScanScope::default(),
            Utc::now(),
        );

        let scoped = ScanScope {
            path: Some("src".to_string()),
            force_resolve: true,
            ..ScanScope::default()
        };
        let diff = merge(&mut findings, vec![], &scoped, Utc::now());
        assert_eq!(diff.auto_resolved, 1);
    }

    #[test]
    fn test_suspect_detector_protection() {
        let mut findings = BTreeMap::new();
        let scope = ScanScope::default();
        let batch: Vec<RawCandidate> = (0..SUSPECT_DETECTOR_MIN)
            .map(|i| candidate("unused", &format!("src/f{}.rs", i), "x"))
            .collect();
        merge(&mut findings, batch, &scope, Utc::now());

        let diff = merge(&mut findings, vec![], &scope, Utc::now());
        assert_eq!(diff.suspect_detectors, vec!["unused".to_string()]);
        assert_eq!(diff.auto_resolved, 0, "suspect detector findings are protected");

        let forced = ScanScope { force_resolve: true, ..ScanScope::default() };
        let diff = merge(&mut findings, vec![], &forced, Utc::now());
        assert_eq!(diff.auto_resolved, SUSPECT_DETECTOR_MIN);
    }

    #[test]
    fn test_source_scope_limits_auto_resolution() {
        let mut findings = BTreeMap::new();
        let rust_scope = ScanScope { source: Some("rust".to_string()), ..ScanScope::default() };
        merge(&mut findings, vec![candidate("unused", "src/a.rs", "foo")], &rust_scope, Utc::now());

        let python_scope = ScanScope { source: Some("python".to_string()), ..ScanScope::default() };
        let diff = merge(&mut findings, vec![], &python_scope, Utc::now());
        assert_eq!(diff.auto_resolved, 0);
        assert_eq!(diff.skipped_other_source, 1);
    }

    #[test]
    fn test_metadata_refresh_on_reobservation() {
        let mut findings = BTreeMap::new();
        let scope = ScanScope::default();
        merge(&mut findings, vec![candidate("unused", "src/a.rs", "foo")], &scope, Utc::now());

        let mut updated = candidate("unused", "src/a.rs", "foo");
        updated.tier = 1;
        updated.confidence = Confidence::Low;
        updated.summary = "sharper summary".to_string();
        merge(&mut findings, vec![updated], &scope, Utc::now());

        let finding = &findings["unused::src/a.rs::foo"];
        assert_eq!(finding.tier, 1);
        assert_eq!(finding.confidence, Confidence::Low);
        assert_eq!(finding.summary, "sharper summary");
    }

    #[test]
    fn test_skipped_details_carried_into_diff() {
        let mut findings = BTreeMap::new();
        let skipped = vec![SkippedCandidate {
            detector: Some("unused".to_string()),
            file: None,
            reason: "missing required field: file".to_string(),
        }];
        let diff = merge_findings(
            &mut findings,
            &[],
            &ScanScope::default(),
            vec![candidate("unused", "src/a.rs", "foo")],
            skipped,
            Utc::now(),
        );
        assert_eq!(diff.skipped, 1);
        assert_eq!(diff.new, 1);
        assert_eq!(diff.skipped_details[0].reason, "missing required field: file");
    }
}
