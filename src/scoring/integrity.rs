//! Subjective-score anti-gaming policy
//!
//! Several independent subjective scores landing exactly on the "done"
//! threshold is a strong signal of fabricated review output rather than
//! genuine convergence, so clustered matches are reset to zero.

use std::collections::BTreeMap;

use log::warn;

use crate::ledger::scores::{
    clamp_score, IntegrityReport, IntegrityStatus, SubjectiveAssessment, TARGET_MATCH_RESET,
};

/// Matches required before the penalty fires; a single match only warns.
const TARGET_RESET_THRESHOLD: usize = 2;

/// Configured integrity-check knobs.
#[derive(Debug, Clone)]
pub struct IntegrityPolicy {
    /// The "you are done" score; `None` disables the check
    pub target: Option<f64>,
    /// Absolute distance from target that counts as a match
    pub tolerance: f64,
}

impl Default for IntegrityPolicy {
    fn default() -> Self {
        Self {
            target: Some(95.0),
            tolerance: 0.05,
        }
    }
}

impl IntegrityPolicy {
    pub fn matches_target(&self, score: f64, target: f64) -> bool {
        (score - target).abs() <= self.tolerance
    }
}

/// Check assessments for target clustering and apply penalties.
///
/// 0 matches -> pass; 1 match -> warn (scores unchanged, a rerun is
/// recommended); 2+ matches -> every matched dimension is reset to 0.0 with
/// `integrity_penalty = "target_match_reset"`.
pub fn apply_integrity_policy(
    assessments: &mut BTreeMap<String, SubjectiveAssessment>,
    policy: &IntegrityPolicy,
) -> IntegrityReport {
    let Some(raw_target) = policy.target else {
        return IntegrityReport {
            status: IntegrityStatus::Disabled,
            ..IntegrityReport::default()
        };
    };
    let target = clamp_score(raw_target);

    let matched: Vec<String> = assessments
        .iter()
        .filter(|(_, assessment)| {
            !assessment.placeholder && policy.matches_target(clamp_score(assessment.score), target)
        })
        .map(|(dimension, _)| dimension.clone())
        .collect();

    let mut report = IntegrityReport {
        status: IntegrityStatus::Pass,
        target_score: Some(target),
        matched_count: matched.len(),
        matched_dimensions: matched.clone(),
        reset_dimensions: Vec::new(),
    };

    if matched.len() < TARGET_RESET_THRESHOLD {
        if !matched.is_empty() {
            report.status = IntegrityStatus::Warn;
            warn!(
                "Subjective score for {:?} sits on the integrity target {}; rerun the review to confirm",
                matched, target
            );
        }
        return report;
    }

    for dimension in &matched {
        if let Some(assessment) = assessments.get_mut(dimension) {
            assessment.score = 0.0;
            assessment.integrity_penalty = Some(TARGET_MATCH_RESET.to_string());
        }
    }
    report.status = IntegrityStatus::Penalized;
    report.reset_dimensions = matched;
    warn!(
        "Integrity penalty: {} subjective dimension(s) clustered on target {}; scores reset to 0",
        report.reset_dimensions.len(),
        target
    );
    report
}
