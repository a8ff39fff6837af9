//! Subjective review import: assessments, placeholders, and the anti-gaming
//! integrity policy.

use chrono::Utc;
use serde_json::json;

use codeledger::import::{apply_review_import, parse_review_import};
use codeledger::ledger::scores::{IntegrityStatus, SUBJECTIVE_DETECTOR, TARGET_MATCH_RESET};
use codeledger::ledger::Ledger;
use codeledger::scoring::integrity::IntegrityPolicy;
use codeledger::scoring::policy::ScoringPolicy;
use codeledger::scoring::refresh_scores;

fn two_dimension_policy() -> ScoringPolicy {
    ScoringPolicy {
        subjective_dimensions: vec!["naming_quality".to_string(), "logic_clarity".to_string()],
        ..ScoringPolicy::default()
    }
}

fn import_assessments(ledger: &mut Ledger, assessments: serde_json::Value) {
    let review = parse_review_import(&json!({ "assessments": assessments })).unwrap();
    apply_review_import(ledger, review, Utc::now());
}

#[test]
fn unassessed_dimensions_start_at_zero() {
    let mut ledger = Ledger::new(Utc::now());
    ledger.potentials.insert(
        "rust".to_string(),
        std::collections::BTreeMap::from([("unused".to_string(), 10)]),
    );

    refresh_scores(&mut ledger, &two_dimension_policy(), &IntegrityPolicy::default());

    for name in ["Naming Quality", "Logic Clarity"] {
        let dim = &ledger.dimension_scores[name];
        assert_eq!(dim.score, 0.0, "{} must not default to 100", name);
        assert_eq!(dim.tier, 4);
        assert!(dim.detectors[SUBJECTIVE_DETECTOR].placeholder);
    }
    // Objective aggregates exclude the zeroed subjective dimensions
    assert_eq!(ledger.objective_score, 100.0);
    assert!(ledger.overall_score < 100.0);
}

#[test]
fn imported_assessment_drives_dimension_score() {
    let mut ledger = Ledger::new(Utc::now());
    import_assessments(&mut ledger, json!({"naming_quality": 85.0}));
    refresh_scores(&mut ledger, &two_dimension_policy(), &IntegrityPolicy::default());

    let dim = &ledger.dimension_scores["Naming Quality"];
    assert_eq!(dim.score, 85.0);
    assert!(!dim.detectors[SUBJECTIVE_DETECTOR].placeholder);
    assert_eq!(ledger.subjective_integrity.status, IntegrityStatus::Pass);
}

#[test]
fn single_target_match_warns_without_reset() {
    let mut ledger = Ledger::new(Utc::now());
    import_assessments(
        &mut ledger,
        json!({"naming_quality": 95.0, "logic_clarity": 40.0}),
    );
    refresh_scores(&mut ledger, &two_dimension_policy(), &IntegrityPolicy::default());

    assert_eq!(ledger.subjective_integrity.status, IntegrityStatus::Warn);
    assert_eq!(ledger.subjective_integrity.matched_count, 1);
    assert!(ledger.subjective_integrity.reset_dimensions.is_empty());
    assert_eq!(ledger.dimension_scores["Naming Quality"].score, 95.0);
    assert_eq!(ledger.dimension_scores["Logic Clarity"].score, 40.0);
}

#[test]
fn clustered_target_matches_reset_to_zero() {
    let mut ledger = Ledger::new(Utc::now());
    import_assessments(
        &mut ledger,
        json!({"naming_quality": 95.0, "logic_clarity": 95.0}),
    );
    refresh_scores(&mut ledger, &two_dimension_policy(), &IntegrityPolicy::default());

    let integrity = &ledger.subjective_integrity;
    assert_eq!(integrity.status, IntegrityStatus::Penalized);
    assert_eq!(
        integrity.reset_dimensions,
        vec!["logic_clarity".to_string(), "naming_quality".to_string()]
    );
    assert_eq!(ledger.dimension_scores["Naming Quality"].score, 0.0);
    assert_eq!(ledger.dimension_scores["Logic Clarity"].score, 0.0);
    for key in ["naming_quality", "logic_clarity"] {
        assert_eq!(
            ledger.subjective_assessments[key].integrity_penalty.as_deref(),
            Some(TARGET_MATCH_RESET)
        );
    }
}

#[test]
fn penalized_assessment_stays_zero_until_fresh_import() {
    let mut ledger = Ledger::new(Utc::now());
    import_assessments(
        &mut ledger,
        json!({"naming_quality": 95.0, "logic_clarity": 95.0}),
    );
    let policy = two_dimension_policy();
    refresh_scores(&mut ledger, &policy, &IntegrityPolicy::default());

    // Rescoring without a new import keeps the penalty in place
    refresh_scores(&mut ledger, &policy, &IntegrityPolicy::default());
    assert_eq!(ledger.dimension_scores["Naming Quality"].score, 0.0);

    // A fresh, diverse import replaces the penalized entries
    import_assessments(
        &mut ledger,
        json!({"naming_quality": 88.0, "logic_clarity": 72.0}),
    );
    refresh_scores(&mut ledger, &policy, &IntegrityPolicy::default());
    assert_eq!(ledger.subjective_integrity.status, IntegrityStatus::Pass);
    assert_eq!(ledger.dimension_scores["Naming Quality"].score, 88.0);
    assert_eq!(ledger.dimension_scores["Logic Clarity"].score, 72.0);
}

#[test]
fn review_findings_tagged_to_dimension_count_as_issues() {
    let mut ledger = Ledger::new(Utc::now());
    let review = parse_review_import(&json!({
        "findings": [
            {"detector": "review", "file": "src/a.rs", "name": "vague-names", "tier": 4,
             "confidence": "medium", "summary": "identifier soup",
             "detail": {"dimension": "naming_quality"}},
            {"detector": "review", "file": "src/b.rs", "name": "more-vague", "tier": 4,
             "confidence": "low", "summary": "more identifier soup",
             "detail": {"dimension": "naming_quality"}},
        ],
        "assessments": {"naming_quality": 64.0},
    }))
    .unwrap();
    apply_review_import(&mut ledger, review, Utc::now());
    refresh_scores(&mut ledger, &two_dimension_policy(), &IntegrityPolicy::default());

    let dim = &ledger.dimension_scores["Naming Quality"];
    assert_eq!(dim.issues, 2);
    assert_eq!(dim.score, 64.0, "issue count is display only");
}

#[test]
fn integrity_disabled_leaves_everything_alone() {
    let mut ledger = Ledger::new(Utc::now());
    import_assessments(
        &mut ledger,
        json!({"naming_quality": 95.0, "logic_clarity": 95.0}),
    );
    let disabled = IntegrityPolicy {
        target: None,
        tolerance: 0.05,
    };
    refresh_scores(&mut ledger, &two_dimension_policy(), &disabled);

    assert_eq!(ledger.subjective_integrity.status, IntegrityStatus::Disabled);
    assert_eq!(ledger.dimension_scores["Naming Quality"].score, 95.0);
}
