//! Scoring policy: dimensions, detector policies, and strictness modes
//!
//! Dimensions and detector policies are static configuration assembled at
//! process start; nothing here reads process-wide globals, so repeated
//! invocations in one process stay isolated.

use std::collections::BTreeMap;

use crate::ledger::finding::{FindingStatus, Zone};

/// Strictness mode for failure counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScoreMode {
    /// Only open findings fail
    Lenient,
    /// Open and wontfix findings fail
    Strict,
}

/// All modes, in the order score maps are computed.
pub const SCORE_MODES: [ScoreMode; 2] = [ScoreMode::Lenient, ScoreMode::Strict];

impl ScoreMode {
    /// Statuses that count as failures in this mode. FalsePositive and
    /// suppressed findings never fail in any mode.
    pub fn is_failure(self, status: FindingStatus) -> bool {
        match self {
            ScoreMode::Lenient => status == FindingStatus::Open,
            ScoreMode::Strict => {
                matches!(status, FindingStatus::Open | FindingStatus::Wontfix)
            }
        }
    }
}

/// How a detector's findings are weighted and grouped for scoring.
#[derive(Debug, Clone)]
pub struct DetectorPolicy {
    /// Dimension this detector contributes to
    pub dimension: String,
    /// Group findings per file and cap each file's contribution
    pub file_based: bool,
    /// Use `detail.loc_weight` instead of confidence weights
    pub use_loc_weight: bool,
    /// Zones whose findings this detector ignores entirely
    pub excluded_zones: Vec<Zone>,
    /// Review-type detectors are scored through assessments only
    pub review_only: bool,
}

impl Default for DetectorPolicy {
    fn default() -> Self {
        Self {
            dimension: String::new(),
            file_based: false,
            use_loc_weight: false,
            excluded_zones: Vec::new(),
            review_only: false,
        }
    }
}

/// A named, fixed-tier grouping of detectors.
#[derive(Debug, Clone)]
pub struct Dimension {
    pub name: String,
    pub tier: u8,
    pub detectors: Vec<String>,
}

/// Registry of dimensions and detector policies.
///
/// Populated once at startup from the builtin table (optionally overridden
/// from configuration) and passed by reference everywhere.
#[derive(Debug, Clone, Default)]
pub struct DetectorRegistry {
    dimensions: BTreeMap<String, Dimension>,
    policies: BTreeMap<String, DetectorPolicy>,
}

impl DetectorRegistry {
    /// The builtin detector/dimension table.
    pub fn builtin() -> Self {
        let mut registry = Self::default();

        registry.add_dimension("Dead code", 1, &["unused", "orphaned"]);
        registry.add_dimension("Security hygiene", 1, &["security"]);
        registry.add_dimension("Duplication", 2, &["duplication"]);
        registry.add_dimension("File size", 2, &["large"]);
        registry.add_dimension("Naming", 2, &["naming"]);
        registry.add_dimension("Structure", 3, &["flat_dirs", "god_modules"]);
        registry.add_dimension("Test coverage", 3, &["test_coverage"]);

        registry.set_policy(
            "security",
            DetectorPolicy {
                dimension: "Security hygiene".to_string(),
                excluded_zones: vec![Zone::Test, Zone::Vendor],
                ..DetectorPolicy::default()
            },
        );
        registry.set_policy(
            "duplication",
            DetectorPolicy {
                dimension: "Duplication".to_string(),
                file_based: true,
                ..DetectorPolicy::default()
            },
        );
        registry.set_policy(
            "large",
            DetectorPolicy {
                dimension: "File size".to_string(),
                file_based: true,
                use_loc_weight: true,
                ..DetectorPolicy::default()
            },
        );
        registry.set_policy(
            "god_modules",
            DetectorPolicy {
                dimension: "Structure".to_string(),
                file_based: true,
                ..DetectorPolicy::default()
            },
        );

        // Review-type detectors never participate in detection-side scoring.
        for detector in ["review", "concerns"] {
            registry.set_policy(
                detector,
                DetectorPolicy {
                    review_only: true,
                    ..DetectorPolicy::default()
                },
            );
        }

        registry
    }

    /// Register a dimension with its member detectors. Detectors get a plain
    /// confidence-weighted policy unless one is set explicitly.
    pub fn add_dimension(&mut self, name: &str, tier: u8, detectors: &[&str]) {
        self.dimensions.insert(
            name.to_string(),
            Dimension {
                name: name.to_string(),
                tier,
                detectors: detectors.iter().map(|d| d.to_string()).collect(),
            },
        );
        for detector in detectors {
            self.policies.entry(detector.to_string()).or_insert_with(|| DetectorPolicy {
                dimension: name.to_string(),
                ..DetectorPolicy::default()
            });
        }
    }

    /// Set (or replace) one detector's scoring policy.
    pub fn set_policy(&mut self, detector: &str, policy: DetectorPolicy) {
        self.policies.insert(detector.to_string(), policy);
    }

    /// Policy for a detector; unregistered detectors score with the default
    /// confidence-weighted policy.
    pub fn policy(&self, detector: &str) -> DetectorPolicy {
        self.policies.get(detector).cloned().unwrap_or_default()
    }

    pub fn dimensions(&self) -> impl Iterator<Item = &Dimension> {
        self.dimensions.values()
    }

    pub fn dimension(&self, name: &str) -> Option<&Dimension> {
        self.dimensions.get(name)
    }

    /// Whether a detector is scored only through subjective assessments.
    pub fn is_review_detector(&self, detector: &str) -> bool {
        self.policies.get(detector).map(|p| p.review_only).unwrap_or(false)
    }
}

/// Subjective dimensions that always get a placeholder entry when unassessed.
pub const DEFAULT_SUBJECTIVE_DIMENSIONS: &[&str] = &[
    "cross_module_architecture",
    "error_consistency",
    "abstraction_fitness",
    "dependency_health",
    "test_strategy",
    "api_surface_coherence",
    "naming_quality",
    "logic_clarity",
    "contract_coherence",
];

/// Display label for a subjective dimension key.
pub fn subjective_display_name(key: &str) -> String {
    match key {
        "cross_module_architecture" => "Cross-Module Arch".to_string(),
        "error_consistency" => "Error Consistency".to_string(),
        "abstraction_fitness" => "Abstraction Fit".to_string(),
        "dependency_health" => "Dep Health".to_string(),
        "test_strategy" => "Test Strategy".to_string(),
        "api_surface_coherence" => "API Coherence".to_string(),
        "naming_quality" => "Naming Quality".to_string(),
        "logic_clarity" => "Logic Clarity".to_string(),
        "contract_coherence" => "Contracts".to_string(),
        other => {
            // Fallback: title-case the key
            other
                .split('_')
                .map(|word| {
                    let mut chars = word.chars();
                    match chars.next() {
                        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                        None => String::new(),
                    }
                })
                .collect::<Vec<_>>()
                .join(" ")
        }
    }
}

/// Normalize a raw dimension key: trimmed, lowercased, `-`/spaces to `_`.
pub fn normalize_dimension_key(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .replace('-', "_")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

/// Numeric scoring knobs, sourced from configuration.
#[derive(Debug, Clone)]
pub struct ScoringPolicy {
    pub registry: DetectorRegistry,
    /// Amplification applied to codebase-wide (holistic) finding weights
    pub holistic_multiplier: f64,
    /// Synthetic potential assigned to subjective dimensions
    pub subjective_checks: u64,
    /// Resettable default subjective dimension set
    pub subjective_dimensions: Vec<String>,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            registry: DetectorRegistry::builtin(),
            holistic_multiplier: 10.0,
            subjective_checks: 10,
            subjective_dimensions: DEFAULT_SUBJECTIVE_DIMENSIONS
                .iter()
                .map(|d| d.to_string())
                .collect(),
        }
    }
}

/// Tiered per-file cap for count-weighted file-based detectors.
///
/// Keeps one noisy file from dominating a dimension while preserving the
/// concentration signal: 1-2 findings -> 1.0, 3-5 -> 1.5, 6+ -> 2.0.
pub fn file_count_cap(findings_in_file: usize) -> f64 {
    if findings_in_file >= 6 {
        2.0
    } else if findings_in_file >= 3 {
        1.5
    } else {
        1.0
    }
}
