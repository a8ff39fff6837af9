//! Dimension scoring
//!
//! Groups detectors into tiered dimensions, computes pass rates per
//! strictness mode from the ledger and the potentials table, folds in
//! subjective assessments and coverage confidence, and derives the four
//! aggregate scores.

pub mod coverage;
pub mod detection;
pub mod integrity;
pub mod policy;
pub mod subjective;

use std::collections::BTreeMap;

use log::debug;

use crate::ledger::finding::Finding;
use crate::ledger::scores::{round1, round4, DetectorScore, DimensionScore};
use crate::ledger::Ledger;

use self::detection::detector_stats;
use self::integrity::{apply_integrity_policy, IntegrityPolicy};
use self::policy::{ScoreMode, ScoringPolicy};

/// The four aggregate scores derived from dimension scores.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AggregateScores {
    /// Lenient over all dimensions
    pub overall: f64,
    /// Strict over all dimensions
    pub strict: f64,
    /// Lenient over mechanical-only dimensions
    pub objective: f64,
    /// Strict over mechanical-only dimensions
    pub verified_strict: f64,
}

impl Default for AggregateScores {
    fn default() -> Self {
        Self {
            overall: 100.0,
            strict: 100.0,
            objective: 100.0,
            verified_strict: 100.0,
        }
    }
}

/// Tier-weighted mean of one score field; weight = tier number, so the
/// structural tiers carry more than the mechanical ones.
fn health_score<F>(dimensions: &BTreeMap<String, DimensionScore>, select: F) -> f64
where
    F: Fn(&DimensionScore) -> f64,
{
    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;
    for dim in dimensions.values() {
        let weight = f64::from(dim.tier.max(1));
        weighted_sum += select(dim) * weight;
        weight_total += weight;
    }
    if weight_total == 0.0 {
        100.0
    } else {
        round1(weighted_sum / weight_total)
    }
}

/// Derive all four aggregates from a scored dimension map.
pub fn aggregate_scores(dimensions: &BTreeMap<String, DimensionScore>) -> AggregateScores {
    let mechanical: BTreeMap<String, DimensionScore> = dimensions
        .iter()
        .filter(|(_, dim)| !dim.is_subjective())
        .map(|(name, dim)| (name.clone(), dim.clone()))
        .collect();

    AggregateScores {
        overall: health_score(dimensions, |d| d.score),
        strict: health_score(dimensions, |d| d.strict_score),
        objective: health_score(&mechanical, |d| d.score),
        verified_strict: health_score(&mechanical, |d| d.verified_strict_score),
    }
}

/// Score every registry dimension that has at least one active detector.
///
/// A detector is active when its merged potential is nonzero; review-type
/// detectors never participate here.
pub fn compute_mechanical_dimensions(
    findings: &BTreeMap<String, Finding>,
    potentials: &BTreeMap<String, u64>,
    scoring_policy: &ScoringPolicy,
) -> BTreeMap<String, DimensionScore> {
    let mut results = BTreeMap::new();

    for dimension in scoring_policy.registry.dimensions() {
        let mut detector_scores: BTreeMap<String, DetectorScore> = BTreeMap::new();
        let mut lenient_rates: Vec<f64> = Vec::new();
        let mut strict_rates: Vec<f64> = Vec::new();
        let mut checks = 0u64;
        let mut issues = 0u64;

        for detector in &dimension.detectors {
            if scoring_policy.registry.is_review_detector(detector) {
                continue;
            }
            let potential = potentials.get(detector).copied().unwrap_or(0);
            if potential == 0 {
                continue;
            }
            let stats = detector_stats(detector, findings, potential, scoring_policy);
            let lenient = stats.mode(ScoreMode::Lenient);
            let strict = stats.mode(ScoreMode::Strict);

            lenient_rates.push(lenient.pass_rate);
            strict_rates.push(strict.pass_rate);
            checks += potential;
            issues += lenient.issues;
            detector_scores.insert(
                detector.clone(),
                DetectorScore {
                    potential,
                    pass_rate: round4(lenient.pass_rate),
                    issues: lenient.issues,
                    weighted_failures: round4(lenient.weighted_failures),
                    ..DetectorScore::default()
                },
            );
        }

        if lenient_rates.is_empty() {
            continue;
        }

        let mean = |rates: &[f64]| rates.iter().sum::<f64>() / rates.len() as f64;
        let strict_score = round1(mean(&strict_rates) * 100.0);
        results.insert(
            dimension.name.clone(),
            DimensionScore {
                score: round1(mean(&lenient_rates) * 100.0),
                strict_score,
                verified_strict_score: strict_score,
                checks,
                issues,
                tier: dimension.tier,
                detectors: detector_scores,
                ..DimensionScore::default()
            },
        );
    }

    results
}

/// Recompute every score artifact on the ledger in place.
///
/// Order matters: integrity penalties first (they mutate assessments), then
/// mechanical dimensions, subjective entries, carry-forward, coverage
/// annotations, and finally the aggregates.
pub fn refresh_scores(
    ledger: &mut Ledger,
    scoring_policy: &ScoringPolicy,
    integrity_policy: &IntegrityPolicy,
) {
    ledger.subjective_integrity =
        apply_integrity_policy(&mut ledger.subjective_assessments, integrity_policy);

    let potentials = ledger.merged_potentials();
    let has_active_checks = potentials.values().any(|count| *count > 0);

    if !has_active_checks && ledger.subjective_assessments.is_empty() {
        ledger.dimension_scores = BTreeMap::new();
        let defaults = AggregateScores::default();
        ledger.overall_score = defaults.overall;
        ledger.strict_score = defaults.strict;
        ledger.objective_score = defaults.objective;
        ledger.verified_strict_score = defaults.verified_strict;
        ledger.score_confidence = Default::default();
        return;
    }

    let mut dimensions = compute_mechanical_dimensions(&ledger.findings, &potentials, scoring_policy);

    subjective::append_subjective_dimensions(
        &mut dimensions,
        &ledger.findings,
        &ledger.subjective_assessments,
        scoring_policy,
    );

    // Carry forward mechanical dimensions absent this scan (e.g. a skipped
    // slow pass) so partial scans do not cause score discontinuities.
    for (name, previous) in &ledger.dimension_scores {
        if dimensions.contains_key(name) || previous.is_subjective() {
            continue;
        }
        let mut carried = previous.clone();
        carried.carried_forward = true;
        debug!("Carrying forward dimension {:?} from previous scan", name);
        dimensions.insert(name.clone(), carried);
    }

    ledger.score_confidence = coverage::apply_scan_coverage(&mut dimensions, &ledger.scan_coverage);

    let aggregates = aggregate_scores(&dimensions);
    ledger.dimension_scores = dimensions;
    ledger.overall_score = aggregates.overall;
    ledger.strict_score = aggregates.strict;
    ledger.objective_score = aggregates.objective;
    ledger.verified_strict_score = aggregates.verified_strict;
}
