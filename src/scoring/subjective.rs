//! Subjective dimension integration
//!
//! Subjective dimensions are scored only through imported assessments, never
//! through detector findings. Unassessed dimensions sit at zero — absence of
//! review is never rewarded with a default 100.

use std::collections::BTreeMap;

use crate::ledger::finding::{Finding, FindingStatus};
use crate::ledger::scores::{
    clamp_score, round1, round4, DetectorScore, DimensionScore, SubjectiveAssessment,
    SUBJECTIVE_DETECTOR, TARGET_MATCH_RESET,
};
use crate::scoring::policy::{normalize_dimension_key, subjective_display_name, ScoringPolicy};

/// Subjective dimensions always sit in the advisory tier.
pub const SUBJECTIVE_TIER: u8 = 4;

/// Count open review/concern findings tagged with a dimension.
///
/// Display only: these counts never drive the dimension score.
fn open_review_issues(
    findings: &BTreeMap<String, Finding>,
    policy: &ScoringPolicy,
    dimension_key: &str,
) -> u64 {
    findings
        .values()
        .filter(|f| !f.suppressed && f.status == FindingStatus::Open)
        .filter(|f| policy.registry.is_review_detector(&f.detector))
        .filter(|f| {
            f.detail
                .dimension
                .as_deref()
                .map(normalize_dimension_key)
                .is_some_and(|key| key == dimension_key)
        })
        .count() as u64
}

/// The effective 0-100 score an assessment contributes.
///
/// Placeholders and integrity-reset assessments are forced to zero whatever
/// score value they carry.
fn effective_score(assessment: &SubjectiveAssessment) -> f64 {
    if assessment.placeholder {
        return 0.0;
    }
    if assessment.integrity_penalty.as_deref() == Some(TARGET_MATCH_RESET) {
        return 0.0;
    }
    clamp_score(assessment.score)
}

/// Append subjective dimension entries to the score map.
///
/// Every dimension in the configured default set gets an entry even with no
/// assessment (`score = 0.0`, placeholder). Explicitly imported assessments
/// outside the default set still count — they were deliberate.
pub fn append_subjective_dimensions(
    results: &mut BTreeMap<String, DimensionScore>,
    findings: &BTreeMap<String, Finding>,
    assessments: &BTreeMap<String, SubjectiveAssessment>,
    policy: &ScoringPolicy,
) {
    let default_set: Vec<String> = policy
        .subjective_dimensions
        .iter()
        .map(|key| normalize_dimension_key(key))
        .filter(|key| !key.is_empty())
        .collect();

    let mut assessed: BTreeMap<String, &SubjectiveAssessment> = BTreeMap::new();
    for (raw_key, assessment) in assessments {
        let key = normalize_dimension_key(raw_key);
        if key.is_empty() {
            continue;
        }
        // System placeholders respect the default-set scope; real imports
        // always count.
        if assessment.placeholder && !default_set.contains(&key) {
            continue;
        }
        assessed.insert(key, assessment);
    }

    let mut all_keys: Vec<String> = default_set.clone();
    for key in assessed.keys() {
        if !all_keys.contains(key) {
            all_keys.push(key.clone());
        }
    }

    let existing_lower: Vec<String> = results.keys().map(|name| name.to_lowercase()).collect();

    for key in all_keys {
        let assessment = assessed.get(&key).copied();

        let mut display = subjective_display_name(&key);
        if existing_lower.contains(&display.to_lowercase()) {
            display = format!("{} (subjective)", display);
        }

        let issues = open_review_issues(findings, policy, &key);
        let (score, raw_score, placeholder) = match assessment {
            Some(a) => (effective_score(a), clamp_score(a.score), a.placeholder),
            None => (0.0, 0.0, true),
        };
        let pass_rate = score / 100.0;
        let checks = policy.subjective_checks;

        let mut detector_score = DetectorScore {
            potential: checks,
            pass_rate: round4(pass_rate),
            issues,
            weighted_failures: round4(checks as f64 * (1.0 - pass_rate)),
            assessment_score: Some(round1(raw_score)),
            placeholder,
            dimension_key: Some(key.clone()),
            ..DetectorScore::default()
        };
        if let Some(a) = assessment {
            detector_score.components = a.components.clone();
            detector_score.component_scores = a
                .component_scores
                .iter()
                .map(|(name, value)| (name.clone(), round1(clamp_score(*value))))
                .collect();
        }

        let rounded = round1(score);
        results.insert(
            display,
            DimensionScore {
                score: rounded,
                strict_score: rounded,
                verified_strict_score: rounded,
                checks,
                issues,
                tier: SUBJECTIVE_TIER,
                detectors: BTreeMap::from([(SUBJECTIVE_DETECTOR.to_string(), detector_score)]),
                ..DimensionScore::default()
            },
        );
    }
}

/// Zero out assessments whose dimensions were touched by manually fixed
/// review findings; a fresh review import is required to restore them.
pub fn invalidate_assessments_for_fixed_reviews(
    assessments: &mut BTreeMap<String, SubjectiveAssessment>,
    resolved: &[&Finding],
    policy: &ScoringPolicy,
    now: chrono::DateTime<chrono::Utc>,
) -> Vec<String> {
    let mut touched: Vec<String> = resolved
        .iter()
        .filter(|f| policy.registry.is_review_detector(&f.detector))
        .filter_map(|f| f.detail.dimension.as_deref().map(normalize_dimension_key))
        .filter(|key| !key.is_empty())
        .collect();
    touched.sort();
    touched.dedup();

    let mut invalidated = Vec::new();
    for key in touched {
        if let Some(assessment) = assessments.get_mut(&key) {
            if assessment.score > 0.0 {
                assessment.score = 0.0;
                assessment.assessed_at = Some(now);
                assessment.needs_review_refresh = true;
                invalidated.push(key);
            }
        }
    }
    invalidated
}
