//! End-to-end scan reconciliation: merge, score, persist, rescan.

use std::collections::BTreeMap;

use chrono::Utc;
use proptest::prelude::*;
use serde_json::json;
use tempfile::TempDir;

use codeledger::import::{parse_scan_batch, ImportError};
use codeledger::ledger::finding::FindingStatus;
use codeledger::ledger::merge::ScanScope;
use codeledger::ledger::Ledger;
use codeledger::scoring::integrity::IntegrityPolicy;
use codeledger::scoring::policy::ScoringPolicy;
use codeledger::scoring::refresh_scores;

fn batch_payload() -> serde_json::Value {
    json!({
        "findings": [
            {"detector": "unused", "file": "src/parser.rs", "name": "old_helper", "tier": 1,
             "confidence": "high", "summary": "unused function old_helper"},
            {"detector": "unused", "file": "src/lexer.rs", "name": "tokens_v1", "tier": 1,
             "confidence": "medium", "summary": "unused constant tokens_v1"},
            {"detector": "large", "file": "src/parser.rs", "name": "", "tier": 2,
             "confidence": "high", "summary": "file over size threshold",
             "detail": {"loc_weight": 2.0}},
        ],
        "potentials": {"unused": 40, "large": 12},
    })
}

fn run_scan(ledger: &mut Ledger, payload: &serde_json::Value, scope: &ScanScope) -> codeledger::ledger::merge::MergeDiff {
    let batch = parse_scan_batch(payload).unwrap();
    let diff = ledger.apply_scan(
        scope,
        batch.candidates,
        batch.skipped,
        batch.potentials,
        batch.coverage,
        Utc::now(),
    );
    refresh_scores(ledger, &ScoringPolicy::default(), &IntegrityPolicy::default());
    diff
}

#[test]
fn full_scan_cycle_round_trips_through_disk() {
    let dir = TempDir::new().unwrap();
    let state_path = Ledger::state_path(dir.path());

    let mut ledger = Ledger::new(Utc::now());
    let diff = run_scan(&mut ledger, &batch_payload(), &ScanScope::default());
    assert_eq!(diff.new, 3);
    ledger.save(&state_path).unwrap();

    // A second process loads the same state and sees identical scores
    let reloaded = Ledger::load(&state_path, Utc::now()).unwrap();
    assert_eq!(reloaded.findings.len(), 3);
    assert_eq!(reloaded.overall_score, ledger.overall_score);
    assert_eq!(reloaded.stats.counters.open, 3);
    assert_eq!(reloaded.scan_history.len(), 1);
}

#[test]
fn second_identical_scan_is_a_noop() {
    let mut ledger = Ledger::new(Utc::now());
    run_scan(&mut ledger, &batch_payload(), &ScanScope::default());
    let scores_before = (ledger.overall_score, ledger.strict_score);

    let diff = run_scan(&mut ledger, &batch_payload(), &ScanScope::default());
    assert!(diff.is_noop(), "identical batch must not produce a diff: {:?}", diff);
    assert_eq!((ledger.overall_score, ledger.strict_score), scores_before);
}

#[test]
fn disappearance_and_reappearance_lifecycle() {
    let mut ledger = Ledger::new(Utc::now());
    run_scan(&mut ledger, &batch_payload(), &ScanScope::default());

    // The lexer finding is fixed; next scan no longer reports it
    let smaller = json!({
        "findings": [
            {"detector": "unused", "file": "src/parser.rs", "name": "old_helper", "tier": 1,
             "confidence": "high", "summary": "unused function old_helper"},
            {"detector": "large", "file": "src/parser.rs", "name": "", "tier": 2,
             "confidence": "high", "summary": "file over size threshold",
             "detail": {"loc_weight": 2.0}},
        ],
        "potentials": {"unused": 40, "large": 12},
    });
    let diff = run_scan(&mut ledger, &smaller, &ScanScope::default());
    assert_eq!(diff.auto_resolved, 1);
    let resolved = &ledger.findings["unused::src/lexer.rs::tokens_v1"];
    assert_eq!(resolved.status, FindingStatus::AutoResolved);
    assert!(resolved.resolved_at.is_some());

    // It regresses: same id comes back, reopened not duplicated
    let diff = run_scan(&mut ledger, &batch_payload(), &ScanScope::default());
    assert_eq!(diff.reopened, 1);
    assert_eq!(diff.new, 0);
    let reopened = &ledger.findings["unused::src/lexer.rs::tokens_v1"];
    assert_eq!(reopened.status, FindingStatus::Open);
    assert_eq!(reopened.reopen_count, 1);
    assert_eq!(ledger.findings.len(), 3, "re-observation never duplicates");
}

#[test]
fn scores_reflect_weighted_failures() {
    let mut ledger = Ledger::new(Utc::now());
    run_scan(&mut ledger, &batch_payload(), &ScanScope::default());

    // unused: weights 1.0 + 0.7 over 40 checks; large: loc cap 2.0 over 12
    let dead_code = &ledger.dimension_scores["Dead code"];
    assert!((dead_code.detectors["unused"].pass_rate - 0.9575).abs() < 1e-6);
    let file_size = &ledger.dimension_scores["File size"];
    assert!((file_size.detectors["large"].pass_rate - (10.0 / 12.0)).abs() < 1e-4);

    for dim in ledger.dimension_scores.values() {
        assert!(dim.score >= 0.0 && dim.score <= 100.0);
        assert!(dim.strict_score <= dim.score + 1e-9);
    }
    assert!(ledger.strict_score <= ledger.overall_score + 1e-9);
}

#[test]
fn suppression_is_invisible_everywhere() {
    let mut ledger = Ledger::new(Utc::now());
    run_scan(&mut ledger, &batch_payload(), &ScanScope::default());
    let open_before = ledger.stats.counters.open;

    let suppressed = ledger.add_ignore("src/lexer.rs", Utc::now());
    assert_eq!(suppressed, 1);
    refresh_scores(&mut ledger, &ScoringPolicy::default(), &IntegrityPolicy::default());

    assert_eq!(ledger.stats.counters.open, open_before - 1, "stats exclude suppressed");
    let unused = &ledger.dimension_scores["Dead code"].detectors["unused"];
    assert_eq!(unused.issues, 1, "scoring excludes the suppressed finding");

    // Still present in the ledger, still open, just invisible
    let finding = &ledger.findings["unused::src/lexer.rs::tokens_v1"];
    assert!(finding.suppressed);
    assert_eq!(finding.status, FindingStatus::Open);
}

#[test]
fn suppressing_fixed_finding_preserves_status() {
    let mut ledger = Ledger::new(Utc::now());
    run_scan(&mut ledger, &batch_payload(), &ScanScope::default());
    codeledger::ledger::resolve::resolve_findings(
        &mut ledger.findings,
        "unused::src/lexer.rs::tokens_v1",
        FindingStatus::Fixed,
        Some("removed in cleanup"),
        Utc::now(),
    )
    .unwrap();

    ledger.add_ignore("src/lexer.rs", Utc::now());
    assert_eq!(
        ledger.findings["unused::src/lexer.rs::tokens_v1"].status,
        FindingStatus::Fixed,
        "suppression never reopens a fixed finding"
    );
}

#[test]
fn malformed_candidates_reported_not_dropped() {
    let payload = json!({
        "findings": [
            {"detector": "unused", "file": "src/a.rs", "name": "ok", "tier": 1,
             "confidence": "high", "summary": "fine"},
            {"detector": "unused", "name": "missing-file", "tier": 1,
             "confidence": "high", "summary": "broken"},
        ],
    });
    let mut ledger = Ledger::new(Utc::now());
    let diff = run_scan(&mut ledger, &payload, &ScanScope::default());
    assert_eq!(diff.new, 1);
    assert_eq!(diff.skipped, 1);
    assert_eq!(diff.skipped_details.len(), 1);
    assert!(diff.skipped_details[0].reason.contains("file"));
}

#[test]
fn schema_violation_fails_import() {
    assert!(matches!(
        parse_scan_batch(&json!("not an object")),
        Err(ImportError::Schema { .. })
    ));
}

#[test]
fn coverage_report_reduces_confidence_only() {
    let payload = json!({
        "findings": [
            {"detector": "duplication", "file": "src/a.rs", "name": "d1", "tier": 2,
             "confidence": "high", "summary": "copy-paste"},
        ],
        "potentials": {"duplication": 20},
        "coverage": {
            "duplication": {"status": "reduced", "confidence": 0.5, "reason": "skip-slow"},
        },
    });
    let mut ledger = Ledger::new(Utc::now());
    run_scan(&mut ledger, &payload, &ScanScope::default());

    assert_eq!(ledger.score_confidence.confidence, 0.5);
    assert_eq!(ledger.score_confidence.dimensions, vec!["Duplication".to_string()]);
    let dim = &ledger.dimension_scores["Duplication"];
    assert!(dim.coverage_confidence.is_some());
    // Numeric score unchanged by coverage: (20 - 1.0) / 20
    assert!((dim.detectors["duplication"].pass_rate - 0.95).abs() < 1e-9);
}

proptest! {
    /// Id derivation is stable and merge is idempotent for any candidate set.
    #[test]
    fn merge_idempotent_for_arbitrary_batches(
        names in proptest::collection::vec("[a-z]{1,8}", 1..20),
    ) {
        let findings: Vec<serde_json::Value> = names
            .iter()
            .map(|name| json!({
                "detector": "unused",
                "file": format!("src/{}.rs", name),
                "name": name,
                "tier": 1,
                "confidence": "high",
                "summary": format!("unused {}", name),
            }))
            .collect();
        let payload = json!({"findings": findings, "potentials": {"unused": 100}});

        let mut ledger = Ledger::new(Utc::now());
        let first = run_scan(&mut ledger, &payload, &ScanScope::default());
        let unique: std::collections::BTreeSet<&String> = names.iter().collect();
        prop_assert_eq!(first.new, unique.len());

        let second = run_scan(&mut ledger, &payload, &ScanScope::default());
        prop_assert!(second.is_noop());
        prop_assert_eq!(ledger.findings.len(), unique.len());
    }
}

#[test]
fn potentials_merge_across_sources() {
    let mut ledger = Ledger::new(Utc::now());
    let rust_scope = ScanScope {
        source: Some("rust".to_string()),
        ..ScanScope::default()
    };
    run_scan(&mut ledger, &batch_payload(), &rust_scope);

    let python = json!({
        "findings": [
            {"detector": "unused", "file": "scripts/run.py", "name": "main_old", "tier": 1,
             "confidence": "high", "summary": "unused function main_old"},
        ],
        "potentials": {"unused": 10},
    });
    let python_scope = ScanScope {
        source: Some("python".to_string()),
        ..ScanScope::default()
    };
    let diff = run_scan(&mut ledger, &python, &python_scope);

    // Cross-source findings must not auto-resolve from a different source's scan
    assert_eq!(diff.auto_resolved, 0);
    assert_eq!(diff.skipped_other_source, 3);

    let merged: BTreeMap<String, u64> = ledger.merged_potentials();
    assert_eq!(merged["unused"], 50);
}
