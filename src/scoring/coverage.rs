//! Coverage-based score confidence
//!
//! When a detector ran with reduced coverage (a skipped slow pass, a missing
//! external tool), the numeric scores stand but their trustworthiness drops.
//! This pass attaches advisory confidence metadata — it never changes a
//! score.

use std::collections::BTreeMap;

use crate::ledger::scores::{
    CoverageImpact, CoverageStatus, DetectorCoverage, DimensionScore, ReducedDetector,
    ScoreConfidence,
};

fn coerce_confidence(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        1.0
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Apply a scan coverage report to the dimension scores.
///
/// Dimensions untouched by any reduced detector get no annotation, and any
/// stale annotation from a previous state is cleared. Returns the global
/// confidence summary.
pub fn apply_scan_coverage(
    dimension_scores: &mut BTreeMap<String, DimensionScore>,
    scan_coverage: &BTreeMap<String, DetectorCoverage>,
) -> ScoreConfidence {
    let reduced: BTreeMap<&str, &DetectorCoverage> = scan_coverage
        .iter()
        .filter(|(_, record)| {
            record.status == CoverageStatus::Reduced || coerce_confidence(record.confidence) < 1.0
        })
        .map(|(detector, record)| (detector.as_str(), record))
        .collect();

    let mut reduced_dimensions: Vec<String> = Vec::new();

    for (dim_name, dim) in dimension_scores.iter_mut() {
        let mut impacts: Vec<CoverageImpact> = Vec::new();

        for (detector_name, detector_score) in dim.detectors.iter_mut() {
            match reduced.get(detector_name.as_str()) {
                None => {
                    detector_score.coverage_status = None;
                    detector_score.coverage_confidence = None;
                    detector_score.coverage_summary = None;
                }
                Some(record) => {
                    let confidence = round2(coerce_confidence(record.confidence));
                    detector_score.coverage_status = Some(CoverageStatus::Reduced);
                    detector_score.coverage_confidence = Some(confidence);
                    detector_score.coverage_summary = if record.summary.is_empty() {
                        None
                    } else {
                        Some(record.summary.clone())
                    };
                    impacts.push(CoverageImpact {
                        detector: detector_name.clone(),
                        status: CoverageStatus::Reduced,
                        confidence,
                        summary: record.summary.clone(),
                    });
                }
            }
        }

        if impacts.is_empty() {
            dim.coverage_status = None;
            dim.coverage_confidence = None;
            dim.coverage_impacts = Vec::new();
            continue;
        }

        reduced_dimensions.push(dim_name.clone());
        dim.coverage_status = Some(CoverageStatus::Reduced);
        dim.coverage_confidence = impacts
            .iter()
            .map(|impact| impact.confidence)
            .fold(None, |acc: Option<f64>, c| Some(acc.map_or(c, |a| a.min(c))));
        dim.coverage_impacts = impacts;
    }

    if reduced.is_empty() {
        return ScoreConfidence::default();
    }

    let detectors: Vec<ReducedDetector> = reduced
        .iter()
        .map(|(detector, record)| ReducedDetector {
            detector: detector.to_string(),
            status: CoverageStatus::Reduced,
            confidence: round2(coerce_confidence(record.confidence)),
            reason: record.reason.clone(),
            summary: record.summary.clone(),
        })
        .collect();

    let confidence = detectors
        .iter()
        .map(|d| d.confidence)
        .fold(1.0f64, f64::min);

    reduced_dimensions.sort();
    reduced_dimensions.dedup();

    ScoreConfidence {
        status: CoverageStatus::Reduced,
        confidence: round2(confidence),
        detectors,
        dimensions: reduced_dimensions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::scores::DetectorScore;

    fn dim_with_detectors(detectors: &[&str]) -> DimensionScore {
        DimensionScore {
            score: 80.0,
            strict_score: 70.0,
            verified_strict_score: 70.0,
            tier: 2,
            detectors: detectors
                .iter()
                .map(|d| (d.to_string(), DetectorScore::default()))
                .collect(),
            ..DimensionScore::default()
        }
    }

    fn reduced(confidence: f64, reason: &str) -> DetectorCoverage {
        DetectorCoverage {
            status: CoverageStatus::Reduced,
            confidence,
            reason: reason.to_string(),
            summary: format!("reduced: {}", reason),
        }
    }

    #[test]
    fn test_affected_dimension_annotated() {
        let mut dims = BTreeMap::from([
            ("Duplication".to_string(), dim_with_detectors(&["duplication"])),
            ("Naming".to_string(), dim_with_detectors(&["naming"])),
        ]);
        let coverage = BTreeMap::from([("duplication".to_string(), reduced(0.6, "skip-slow"))]);

        let confidence = apply_scan_coverage(&mut dims, &coverage);

        let dup = &dims["Duplication"];
        assert_eq!(dup.coverage_status, Some(CoverageStatus::Reduced));
        assert_eq!(dup.coverage_confidence, Some(0.6));
        assert_eq!(dup.coverage_impacts.len(), 1);
        assert_eq!(dup.score, 80.0, "numeric score untouched");

        assert!(dims["Naming"].coverage_status.is_none());

        assert_eq!(confidence.status, CoverageStatus::Reduced);
        assert_eq!(confidence.confidence, 0.6);
        assert_eq!(confidence.dimensions, vec!["Duplication".to_string()]);
    }

    #[test]
    fn test_min_confidence_across_detectors() {
        let mut dims = BTreeMap::from([(
            "Structure".to_string(),
            dim_with_detectors(&["flat_dirs", "god_modules"]),
        )]);
        let coverage = BTreeMap::from([
            ("flat_dirs".to_string(), reduced(0.9, "partial")),
            ("god_modules".to_string(), reduced(0.4, "tool missing")),
        ]);

        let confidence = apply_scan_coverage(&mut dims, &coverage);
        assert_eq!(dims["Structure"].coverage_confidence, Some(0.4));
        assert_eq!(confidence.confidence, 0.4);
        assert_eq!(confidence.detectors.len(), 2);
    }

    #[test]
    fn test_stale_annotations_cleared() {
        let mut dim = dim_with_detectors(&["duplication"]);
        dim.coverage_status = Some(CoverageStatus::Reduced);
        dim.coverage_confidence = Some(0.5);
        dim.coverage_impacts = vec![CoverageImpact {
            detector: "duplication".to_string(),
            status: CoverageStatus::Reduced,
            confidence: 0.5,
            summary: String::new(),
        }];
        dim.detectors.get_mut("duplication").unwrap().coverage_status = Some(CoverageStatus::Reduced);
        let mut dims = BTreeMap::from([("Duplication".to_string(), dim)]);

        let confidence = apply_scan_coverage(&mut dims, &BTreeMap::new());

        let dup = &dims["Duplication"];
        assert!(dup.coverage_status.is_none());
        assert!(dup.coverage_impacts.is_empty());
        assert!(dup.detectors["duplication"].coverage_status.is_none());
        assert_eq!(confidence, ScoreConfidence::default());
    }

    #[test]
    fn test_full_coverage_record_ignored() {
        let mut dims = BTreeMap::from([("Naming".to_string(), dim_with_detectors(&["naming"]))]);
        let coverage = BTreeMap::from([(
            "naming".to_string(),
            DetectorCoverage {
                status: CoverageStatus::Full,
                confidence: 1.0,
                reason: String::new(),
                summary: String::new(),
            },
        )]);

        let confidence = apply_scan_coverage(&mut dims, &coverage);
        assert!(dims["Naming"].coverage_status.is_none());
        assert_eq!(confidence.status, CoverageStatus::Full);
    }

    #[test]
    fn test_out_of_range_confidence_clamped() {
        let mut dims = BTreeMap::from([("Duplication".to_string(), dim_with_detectors(&["duplication"]))]);
        let coverage = BTreeMap::from([("duplication".to_string(), reduced(-2.0, "weird"))]);

        let confidence = apply_scan_coverage(&mut dims, &coverage);
        assert_eq!(confidence.confidence, 0.0);
        assert_eq!(dims["Duplication"].coverage_confidence, Some(0.0));
    }
}
