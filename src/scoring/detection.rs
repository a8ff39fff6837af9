//! Per-detector scoring calculations
//!
//! Turns ledger findings plus a potentials denominator into pass rates per
//! strictness mode. File-based detectors cap each file's weighted
//! contribution so one noisy file cannot sink a dimension; codebase-wide
//! (holistic) findings bypass the cap and are amplified instead.

use std::collections::BTreeMap;

use crate::ledger::finding::Finding;
use crate::scoring::policy::{file_count_cap, DetectorPolicy, ScoreMode, ScoringPolicy, SCORE_MODES};

/// Pass-rate stats for one detector in one mode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModeStats {
    pub pass_rate: f64,
    pub issues: u64,
    pub weighted_failures: f64,
}

impl ModeStats {
    fn clean() -> Self {
        Self {
            pass_rate: 1.0,
            issues: 0,
            weighted_failures: 0.0,
        }
    }
}

/// Stats for both strictness modes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorStats {
    pub lenient: ModeStats,
    pub strict: ModeStats,
}

impl DetectorStats {
    fn clean() -> Self {
        Self {
            lenient: ModeStats::clean(),
            strict: ModeStats::clean(),
        }
    }

    pub fn mode(&self, mode: ScoreMode) -> ModeStats {
        match mode {
            ScoreMode::Lenient => self.lenient,
            ScoreMode::Strict => self.strict,
        }
    }

    fn mode_mut(&mut self, mode: ScoreMode) -> &mut ModeStats {
        match mode {
            ScoreMode::Lenient => &mut self.lenient,
            ScoreMode::Strict => &mut self.strict,
        }
    }
}

/// In-scope findings for a detector: non-suppressed, zone-filtered.
fn scoring_candidates<'a>(
    detector: &'a str,
    findings: &'a BTreeMap<String, Finding>,
    detector_policy: &'a DetectorPolicy,
) -> impl Iterator<Item = &'a Finding> {
    findings.values().filter(move |finding| {
        !finding.suppressed
            && finding.detector == detector
            && !detector_policy.excluded_zones.contains(&finding.zone)
    })
}

fn finding_weight(finding: &Finding, use_loc_weight: bool) -> f64 {
    if use_loc_weight {
        finding.detail.loc_weight.unwrap_or(1.0).max(0.0)
    } else {
        finding.confidence.weight()
    }
}

fn is_holistic(finding: &Finding) -> bool {
    finding.file == "." && finding.detail.holistic
}

/// Per-mode accumulator for file-based detectors.
#[derive(Debug, Default)]
struct FileAccum {
    by_file: BTreeMap<String, f64>,
    by_file_count: BTreeMap<String, usize>,
    /// First (largest-single-finding) weight seen per file, LOC mode
    file_cap: BTreeMap<String, f64>,
    holistic_sum: f64,
    issue_count: u64,
}

impl FileAccum {
    fn total(&self, use_loc_weight: bool) -> f64 {
        let capped: f64 = self
            .by_file
            .iter()
            .map(|(file, weighted_sum)| {
                let cap = if use_loc_weight {
                    self.file_cap.get(file).copied().unwrap_or(*weighted_sum)
                } else {
                    file_count_cap(self.by_file_count.get(file).copied().unwrap_or(0))
                };
                weighted_sum.min(cap)
            })
            .sum();
        capped + self.holistic_sum
    }
}

fn file_based_failures(
    detector: &str,
    findings: &BTreeMap<String, Finding>,
    detector_policy: &DetectorPolicy,
    holistic_multiplier: f64,
) -> [(u64, f64); 2] {
    let mut accum = [FileAccum::default(), FileAccum::default()];

    for finding in scoring_candidates(detector, findings, detector_policy) {
        let holistic = is_holistic(finding);
        for (slot, mode) in SCORE_MODES.iter().enumerate() {
            if !mode.is_failure(finding.status) {
                continue;
            }
            let a = &mut accum[slot];
            if holistic {
                a.holistic_sum += finding.confidence.weight() * holistic_multiplier;
                a.issue_count += 1;
                continue;
            }
            let weight = finding_weight(finding, detector_policy.use_loc_weight);
            *a.by_file.entry(finding.file.clone()).or_insert(0.0) += weight;
            *a.by_file_count.entry(finding.file.clone()).or_insert(0) += 1;
            if detector_policy.use_loc_weight {
                // Cap at the largest single finding's weight in the file
                let cap = a.file_cap.entry(finding.file.clone()).or_insert(weight);
                *cap = cap.max(weight);
            }
            a.issue_count += 1;
        }
    }

    [
        (accum[0].issue_count, accum[0].total(detector_policy.use_loc_weight)),
        (accum[1].issue_count, accum[1].total(detector_policy.use_loc_weight)),
    ]
}

fn flat_failures(
    detector: &str,
    findings: &BTreeMap<String, Finding>,
    detector_policy: &DetectorPolicy,
) -> [(u64, f64); 2] {
    let mut out = [(0u64, 0.0f64); 2];
    for finding in scoring_candidates(detector, findings, detector_policy) {
        let weight = finding.confidence.weight();
        for (slot, mode) in SCORE_MODES.iter().enumerate() {
            if mode.is_failure(finding.status) {
                out[slot].0 += 1;
                out[slot].1 += weight;
            }
        }
    }
    out
}

/// Compute pass rate, issue count, and weighted failures per mode.
///
/// Zero potential means the detector attempted nothing: a clean 1.0 pass
/// rate with no issues. Review-type detectors are always clean here; they
/// are scored through subjective assessments only.
pub fn detector_stats(
    detector: &str,
    findings: &BTreeMap<String, Finding>,
    potential: u64,
    policy: &ScoringPolicy,
) -> DetectorStats {
    if potential == 0 || policy.registry.is_review_detector(detector) {
        return DetectorStats::clean();
    }

    let detector_policy = policy.registry.policy(detector);
    let failures = if detector_policy.file_based {
        file_based_failures(detector, findings, &detector_policy, policy.holistic_multiplier)
    } else {
        flat_failures(detector, findings, &detector_policy)
    };

    let mut stats = DetectorStats::clean();
    for (slot, mode) in SCORE_MODES.iter().enumerate() {
        let (issues, weighted) = failures[slot];
        let entry = stats.mode_mut(*mode);
        entry.issues = issues;
        entry.weighted_failures = weighted;
        entry.pass_rate = ((potential as f64 - weighted) / potential as f64).max(0.0);
    }
    stats
}
