//! Work queue over a live ledger, with and without a living plan.

use chrono::Utc;
use serde_json::json;
use tempfile::TempDir;

use codeledger::import::parse_scan_batch;
use codeledger::ledger::finding::FindingStatus;
use codeledger::ledger::merge::ScanScope;
use codeledger::ledger::Ledger;
use codeledger::queue::plan::{reconcile_after_scan, Plan, SkipKind};
use codeledger::queue::ranking::ItemKind;
use codeledger::queue::{build_work_queue, QueueBuildOptions, QueuePolicy};
use codeledger::scoring::policy::ScoringPolicy;

fn seeded_ledger() -> Ledger {
    let payload = json!({
        "findings": [
            {"detector": "unused", "file": "src/a.rs", "name": "dead_fn", "tier": 1,
             "confidence": "high", "summary": "unused function dead_fn"},
            {"detector": "security", "file": "src/auth.rs", "name": "hardcoded_key", "tier": 1,
             "confidence": "medium", "summary": "hardcoded credential"},
            {"detector": "naming", "file": "src/b.rs", "name": "BadName", "tier": 2,
             "confidence": "high", "summary": "non-idiomatic name", "detail": {"count": 4}},
            {"detector": "naming", "file": "src/c.rs", "name": "WorseName", "tier": 2,
             "confidence": "high", "summary": "non-idiomatic name", "detail": {"count": 9}},
            {"detector": "god_modules", "file": "src/core.rs", "name": "", "tier": 3,
             "confidence": "low", "summary": "module does everything"},
        ],
    });
    let batch = parse_scan_batch(&payload).unwrap();
    let mut ledger = Ledger::new(Utc::now());
    ledger.apply_scan(
        &ScanScope::default(),
        batch.candidates,
        batch.skipped,
        batch.potentials,
        batch.coverage,
        Utc::now(),
    );
    ledger
}

fn everything() -> QueueBuildOptions {
    QueueBuildOptions {
        count: None,
        ..QueueBuildOptions::default()
    }
}

#[test]
fn default_order_is_deterministic_and_tier_first() {
    let ledger = seeded_ledger();
    let result = build_work_queue(
        &ledger,
        &ScoringPolicy::default(),
        &QueuePolicy::default(),
        None,
        &everything(),
    );

    let ids: Vec<&str> = result.items.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(
        ids,
        vec![
            // T1: high confidence before medium
            "unused::src/a.rs::dead_fn",
            "security::src/auth.rs::hardcoded_key",
            // T2: higher count first
            "naming::src/c.rs::WorseName",
            "naming::src/b.rs::BadName",
            // T3
            "god_modules::src/core.rs",
        ]
    );
    assert_eq!(result.tier_counts[&1], 2);
    assert_eq!(result.tier_counts[&2], 2);
    assert_eq!(result.available_tiers, vec![1, 2, 3]);
}

#[test]
fn resolved_findings_leave_the_queue() {
    let mut ledger = seeded_ledger();
    codeledger::ledger::resolve::resolve_findings(
        &mut ledger.findings,
        "unused",
        FindingStatus::Wontfix,
        None,
        Utc::now(),
    )
    .unwrap();

    let result = build_work_queue(
        &ledger,
        &ScoringPolicy::default(),
        &QueuePolicy::default(),
        None,
        &everything(),
    );
    assert!(result.items.iter().all(|i| i.detector != "unused"));
}

#[test]
fn tier_fallback_reports_alternatives() {
    let ledger = seeded_ledger();
    // Empty tier 4 request with subjective disabled: nearest is tier 3
    let options = QueueBuildOptions {
        tier: Some(4),
        count: None,
        include_subjective: false,
        ..QueueBuildOptions::default()
    };
    let result = build_work_queue(
        &ledger,
        &ScoringPolicy::default(),
        &QueuePolicy::default(),
        None,
        &options,
    );
    assert_eq!(result.selected_tier, Some(3));
    assert!(result.fallback_reason.is_some());
    assert_eq!(result.items.len(), 1);
}

#[test]
fn plan_order_skips_and_superseded_interact() {
    let mut ledger = seeded_ledger();
    let now = Utc::now();
    let mut plan = Plan::new(now);

    // Explicit order puts the structure work first; one naming item is skipped
    plan.queue_order = vec!["god_modules::src/core.rs".to_string()];
    plan.skip(
        "naming::src/b.rs::BadName",
        SkipKind::Temporary,
        Some("bulk rename scheduled".to_string()),
        Some(2),
        ledger.scan_count,
        now,
    );

    let result = build_work_queue(
        &ledger,
        &ScoringPolicy::default(),
        &QueuePolicy::default(),
        Some(&plan),
        &everything(),
    );
    assert_eq!(result.items[0].id, "god_modules::src/core.rs");
    assert!(result.items.iter().all(|i| i.id != "naming::src/b.rs::BadName"));

    // Two scans later the temporary skip resurfaces
    ledger.scan_count += 2;
    let reconcile = reconcile_after_scan(&mut plan, &ledger, now);
    assert_eq!(reconcile.resurfaced, vec!["naming::src/b.rs::BadName".to_string()]);

    // The ordered finding resolves; reconciliation supersedes the reference
    ledger
        .findings
        .get_mut("god_modules::src/core.rs")
        .unwrap()
        .status = FindingStatus::Fixed;
    let reconcile = reconcile_after_scan(&mut plan, &ledger, now);
    assert_eq!(reconcile.superseded, vec!["god_modules::src/core.rs".to_string()]);
    assert!(plan.superseded.contains_key("god_modules::src/core.rs"));
    assert!(plan.queue_order.is_empty());

    // Superseded entries are surfaced, not fed back into the queue
    let result = build_work_queue(
        &ledger,
        &ScoringPolicy::default(),
        &QueuePolicy::default(),
        Some(&plan),
        &everything(),
    );
    assert!(result.items.iter().all(|i| i.id != "god_modules::src/core.rs"));
}

#[test]
fn plan_round_trips_through_disk() {
    let dir = TempDir::new().unwrap();
    let path = Plan::plan_path(dir.path());
    let now = Utc::now();

    let mut plan = Plan::new(now);
    plan.skip("unused::src/a.rs::dead_fn", SkipKind::Permanent, None, None, 3, now);
    plan.save(&path, now).unwrap();

    let loaded = Plan::load(&path).unwrap().unwrap();
    assert_eq!(loaded.skipped["unused::src/a.rs::dead_fn"].kind, SkipKind::Permanent);

    let ledger = seeded_ledger();
    let result = build_work_queue(
        &ledger,
        &ScoringPolicy::default(),
        &QueuePolicy::default(),
        Some(&loaded),
        &everything(),
    );
    assert!(result.items.iter().all(|i| i.id != "unused::src/a.rs::dead_fn"));
}

#[test]
fn chronic_filter_only_returns_repeat_offenders() {
    let mut ledger = seeded_ledger();
    ledger
        .findings
        .get_mut("naming::src/b.rs::BadName")
        .unwrap()
        .reopen_count = 3;

    let options = QueueBuildOptions {
        chronic: true,
        count: None,
        ..QueueBuildOptions::default()
    };
    let result = build_work_queue(
        &ledger,
        &ScoringPolicy::default(),
        &QueuePolicy::default(),
        None,
        &options,
    );
    assert_eq!(result.items.len(), 1);
    assert_eq!(result.items[0].id, "naming::src/b.rs::BadName");
}

#[test]
fn scope_filters_queue() {
    let ledger = seeded_ledger();
    let options = QueueBuildOptions {
        scope: Some("naming".to_string()),
        count: None,
        ..QueueBuildOptions::default()
    };
    let result = build_work_queue(
        &ledger,
        &ScoringPolicy::default(),
        &QueuePolicy::default(),
        None,
        &options,
    );
    assert_eq!(result.items.len(), 2);
    assert!(result.items.iter().all(|i| i.detector == "naming"));
}

#[test]
fn queue_items_serialize_cleanly() {
    let ledger = seeded_ledger();
    let options = QueueBuildOptions {
        explain: true,
        count: Some(2),
        ..QueueBuildOptions::default()
    };
    let result = build_work_queue(
        &ledger,
        &ScoringPolicy::default(),
        &QueuePolicy::default(),
        None,
        &options,
    );

    let value = serde_json::to_value(&result).unwrap();
    assert_eq!(value["total"], 5);
    assert_eq!(value["items"][0]["kind"], "finding");
    assert_eq!(value["items"][0]["effective_tier"], 1);
    assert!(value["items"][0]["explain"]["ranking_factors"].is_array());
    // Empty optional fields stay out of the payload
    assert!(value["items"][0].get("plan_skipped").is_none());
    assert_eq!(value["items"][0].get("kind").unwrap(), "finding");
    assert!(result.items.iter().all(|i| i.kind != ItemKind::Cluster));
}
