//! Persisted scoring schema
//!
//! Data shapes for dimension scores, subjective assessments, coverage
//! confidence, and the integrity report. These are part of the on-disk state;
//! the `scoring` module computes them, the ledger stores them.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-detector breakdown inside a dimension score.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectorScore {
    pub potential: u64,
    pub pass_rate: f64,
    pub issues: u64,
    pub weighted_failures: f64,
    /// Raw imported assessment score, subjective dimensions only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assessment_score: Option<f64>,
    /// True when no real assessment backs this entry yet
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub placeholder: bool,
    /// Canonical dimension key, subjective dimensions only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension_key: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub component_scores: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coverage_status: Option<CoverageStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coverage_confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coverage_summary: Option<String>,
}

/// Detector key used for the synthetic subjective-assessment breakdown.
pub const SUBJECTIVE_DETECTOR: &str = "subjective_assessment";

/// One scored dimension across all strictness modes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DimensionScore {
    pub score: f64,
    pub strict_score: f64,
    pub verified_strict_score: f64,
    /// Sum of potentials across the dimension's detectors
    pub checks: u64,
    /// Open findings counted under the lenient failure set
    pub issues: u64,
    pub tier: u8,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub detectors: BTreeMap<String, DetectorScore>,
    /// Stale score reused because no detector in this dimension ran
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub carried_forward: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coverage_status: Option<CoverageStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coverage_confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub coverage_impacts: Vec<CoverageImpact>,
}

impl DimensionScore {
    /// A dimension is subjective when its score comes from an assessment.
    pub fn is_subjective(&self) -> bool {
        self.detectors.contains_key(SUBJECTIVE_DETECTOR)
    }
}

/// Where a subjective assessment came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentSource {
    #[default]
    PerFile,
    Holistic,
}

/// An externally supplied 0-100 quality assessment for one dimension.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubjectiveAssessment {
    pub score: f64,
    #[serde(default)]
    pub source: AssessmentSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assessed_at: Option<DateTime<Utc>>,
    /// Set by the anti-gaming policy; forces the effective score to zero
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrity_penalty: Option<String>,
    /// System-generated placeholder, not a real review
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub placeholder: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub component_scores: BTreeMap<String, f64>,
    /// A touched review finding invalidated this assessment
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub needs_review_refresh: bool,
}

/// Penalty marker applied when scores cluster on the integrity target.
pub const TARGET_MATCH_RESET: &str = "target_match_reset";

/// Outcome of the subjective anti-gaming check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrityStatus {
    #[default]
    Disabled,
    Pass,
    Warn,
    Penalized,
}

/// Report of the target-match integrity policy for one recompute.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub status: IntegrityStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_score: Option<f64>,
    pub matched_count: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matched_dimensions: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reset_dimensions: Vec<String>,
}

/// Whether a detector ran with full or reduced coverage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoverageStatus {
    #[default]
    Full,
    Reduced,
}

/// Coverage record a scan reports for one detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorCoverage {
    #[serde(default)]
    pub status: CoverageStatus,
    #[serde(default = "full_confidence")]
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub summary: String,
}

fn full_confidence() -> f64 {
    1.0
}

/// One reduced detector's impact on a dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageImpact {
    pub detector: String,
    pub status: CoverageStatus,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub summary: String,
}

/// Global trustworthiness label for the current scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreConfidence {
    pub status: CoverageStatus,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub detectors: Vec<ReducedDetector>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dimensions: Vec<String>,
}

impl Default for ScoreConfidence {
    fn default() -> Self {
        Self {
            status: CoverageStatus::Full,
            confidence: 1.0,
            detectors: Vec::new(),
            dimensions: Vec::new(),
        }
    }
}

/// Reduced-coverage detector entry in the global confidence report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReducedDetector {
    pub detector: String,
    pub status: CoverageStatus,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub summary: String,
}

/// Clamp any numeric score into the 0-100 band.
pub fn clamp_score(value: f64) -> f64 {
    value.clamp(0.0, 100.0)
}

/// Round to one decimal place, the precision scores are reported at.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Round to four decimal places, used for pass rates.
pub fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
