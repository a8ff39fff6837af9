//! Queue item construction and deterministic ranking
//!
//! Ordering key: tier ascending, then mechanical-before-subjective within a
//! tier, then confidence (High > Medium > Low), then weight/count descending,
//! then id ascending. The id tie-break guarantees the order never depends on
//! insertion order.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use regex::Regex;
use serde::Serialize;

use crate::ledger::finding::{Confidence, Detail, Finding, FindingStatus};
use crate::ledger::scores::SUBJECTIVE_DETECTOR;
use crate::ledger::Ledger;
use crate::queue::plan::{ClusterAction, SUBJECTIVE_ID_PREFIX};
use crate::scoring::policy::{normalize_dimension_key, ScoringPolicy};

/// What a queue item represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Finding,
    SubjectiveDimension,
    Cluster,
}

/// Plan cluster context attached to a member item.
#[derive(Debug, Clone, Serialize)]
pub struct PlanClusterInfo {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub total_items: usize,
}

/// Ranking explanation payload, attached on request.
#[derive(Debug, Clone, Serialize)]
pub struct Explain {
    pub effective_tier: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence_rank: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subjective_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review_weight: Option<f64>,
    pub count: u64,
    pub ranking_factors: Vec<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy: Option<&'static str>,
}

/// One ranked, actionable queue entry. Pure data; rendering happens
/// elsewhere.
#[derive(Debug, Clone, Serialize)]
pub struct QueueItem {
    pub id: String,
    pub kind: ItemKind,
    pub detector: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub file: String,
    pub tier: u8,
    pub effective_tier: u8,
    pub confidence: Confidence,
    pub summary: String,
    #[serde(skip_serializing_if = "Detail::is_empty")]
    pub detail: Detail,
    /// Secondary ranking count from the detector payload
    #[serde(skip_serializing_if = "is_zero")]
    pub count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review_weight: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subjective_score: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<QueueItem>,
    #[serde(skip_serializing_if = "is_zero_usize")]
    pub member_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_type: Option<ClusterAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_position: Option<usize>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub plan_skipped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_skip_kind: Option<crate::queue::plan::SkipKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_skip_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_cluster: Option<PlanClusterInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explain: Option<Explain>,
}

fn is_zero(value: &u64) -> bool {
    *value == 0
}

fn is_zero_usize(value: &usize) -> bool {
    *value == 0
}

impl QueueItem {
    fn base(id: String, kind: ItemKind) -> Self {
        Self {
            id,
            kind,
            detector: String::new(),
            file: String::new(),
            tier: 3,
            effective_tier: 3,
            confidence: Confidence::Low,
            summary: String::new(),
            detail: Detail::default(),
            count: 0,
            review_weight: None,
            subjective_score: None,
            members: Vec::new(),
            member_count: 0,
            action_type: None,
            queue_position: None,
            plan_skipped: false,
            plan_skip_kind: None,
            plan_skip_reason: None,
            plan_description: None,
            plan_note: None,
            plan_cluster: None,
            explain: None,
        }
    }

    /// Empty cluster meta-item shell; the caller fills members and metadata.
    pub fn cluster_shell(name: &str) -> Self {
        Self::base(name.to_string(), ItemKind::Cluster)
    }

    pub fn is_subjective(&self) -> bool {
        self.kind == ItemKind::SubjectiveDimension
    }
}

/// Review issue weight: confidence weight, amplified for holistic findings.
fn review_weight(finding: &Finding, holistic_multiplier: f64) -> f64 {
    let weight = finding.confidence.weight();
    if finding.detail.holistic {
        weight * holistic_multiplier
    } else {
        weight
    }
}

/// Build queue items from open, non-suppressed findings.
pub fn build_finding_items(
    ledger: &Ledger,
    policy: &ScoringPolicy,
    status_filter: Option<FindingStatus>,
    chronic_only: bool,
) -> Vec<QueueItem> {
    let mut items = Vec::new();
    for (id, finding) in &ledger.findings {
        if finding.suppressed {
            continue;
        }
        if let Some(status) = status_filter {
            if finding.status != status {
                continue;
            }
        }
        if chronic_only && !(finding.status == FindingStatus::Open && finding.reopen_count >= 2) {
            continue;
        }

        let is_review = policy.registry.is_review_detector(&finding.detector);
        let mut item = QueueItem::base(id.clone(), ItemKind::Finding);
        item.detector = finding.detector.clone();
        item.file = finding.file.clone();
        item.tier = finding.tier;
        item.effective_tier = if is_review { 4 } else { finding.tier };
        item.confidence = finding.confidence;
        item.summary = finding.summary.clone();
        item.detail = finding.detail.clone();
        item.count = finding.detail.count.unwrap_or(0);
        item.review_weight = is_review.then(|| review_weight(finding, policy.holistic_multiplier));
        items.push(item);
    }
    items
}

/// Build synthetic items for subjective dimensions below the threshold.
///
/// These always rank at tier 4; low subjective coverage never outranks
/// mechanical tier 1-3 work.
pub fn build_subjective_items(ledger: &Ledger, threshold: f64) -> Vec<QueueItem> {
    let threshold = threshold.clamp(0.0, 100.0);
    let mut items = Vec::new();

    for (display_name, dim) in &ledger.dimension_scores {
        let Some(breakdown) = dim.detectors.get(SUBJECTIVE_DETECTOR) else {
            continue;
        };
        if dim.strict_score >= threshold {
            continue;
        }
        let key = breakdown
            .dimension_key
            .clone()
            .unwrap_or_else(|| normalize_dimension_key(display_name));

        let mut item = QueueItem::base(
            format!("{}{}", SUBJECTIVE_ID_PREFIX, key),
            ItemKind::SubjectiveDimension,
        );
        item.detector = SUBJECTIVE_DETECTOR.to_string();
        item.file = ".".to_string();
        item.tier = 4;
        item.effective_tier = 4;
        item.confidence = Confidence::Medium;
        item.summary = if breakdown.placeholder {
            format!("Subjective dimension unassessed: {}", display_name)
        } else {
            format!(
                "Subjective dimension below target: {} ({:.1}%)",
                display_name, dim.strict_score
            )
        };
        item.detail.dimension = Some(key);
        item.count = dim.issues;
        item.subjective_score = Some(dim.strict_score);
        items.push(item);
    }
    items
}

/// Deterministic total order over queue items.
pub fn compare_items(a: &QueueItem, b: &QueueItem) -> Ordering {
    // Clusters sort before individual findings, by action type then size.
    let cluster_group = |item: &QueueItem| u8::from(item.kind != ItemKind::Cluster);
    cluster_group(a).cmp(&cluster_group(b)).then_with(|| {
        if a.kind == ItemKind::Cluster && b.kind == ItemKind::Cluster {
            let rank = |item: &QueueItem| {
                item.action_type.unwrap_or(ClusterAction::ManualFix).rank()
            };
            return rank(a)
                .cmp(&rank(b))
                .then_with(|| b.member_count.cmp(&a.member_count))
                .then_with(|| a.id.cmp(&b.id));
        }

        a.effective_tier
            .cmp(&b.effective_tier)
            // Subjective items sort after mechanical items within a tier
            .then_with(|| u8::from(a.is_subjective()).cmp(&u8::from(b.is_subjective())))
            .then_with(|| {
                if a.is_subjective() && b.is_subjective() {
                    let score = |item: &QueueItem| item.subjective_score.unwrap_or(100.0);
                    return score(a).partial_cmp(&score(b)).unwrap_or(Ordering::Equal);
                }
                a.confidence
                    .rank()
                    .cmp(&b.confidence.rank())
                    .then_with(|| {
                        let weight = |item: &QueueItem| item.review_weight.unwrap_or(0.0);
                        weight(b).partial_cmp(&weight(a)).unwrap_or(Ordering::Equal)
                    })
                    .then_with(|| b.count.cmp(&a.count))
            })
            .then_with(|| a.id.cmp(&b.id))
    })
}

/// Open-item counts per tier; cluster members count at their own tier.
pub fn tier_counts(items: &[QueueItem]) -> BTreeMap<u8, usize> {
    let mut counts: BTreeMap<u8, usize> = (1..=4).map(|tier| (tier, 0)).collect();
    for item in items {
        if item.kind == ItemKind::Cluster {
            for member in &item.members {
                *counts.entry(member.effective_tier).or_insert(0) += 1;
            }
            continue;
        }
        *counts.entry(item.effective_tier).or_insert(0) += 1;
    }
    counts
}

/// Nearest non-empty tier to the requested one (ties go to the lower tier).
pub fn choose_fallback_tier(requested: u8, counts: &BTreeMap<u8, usize>) -> Option<u8> {
    counts
        .iter()
        .filter(|(_, count)| **count > 0)
        .map(|(tier, _)| *tier)
        .min_by_key(|tier| (tier.abs_diff(requested), *tier))
}

/// Does an item (or any cluster member) sit at a tier?
pub fn item_matches_tier(item: &QueueItem, tier: u8) -> bool {
    if item.kind == ItemKind::Cluster {
        return item.members.iter().any(|member| member.effective_tier == tier);
    }
    item.effective_tier == tier
}

/// Show-style scope matching against a queue item.
///
/// `*` globs over id/file/detector/dimension/summary; `::` matches an id
/// prefix; a hex string of 8+ chars matches an id hash suffix; otherwise the
/// scope must equal the detector, the file, or a directory prefix of it.
pub fn scope_matches(item: &QueueItem, scope: Option<&str>) -> bool {
    let Some(scope) = scope else { return true };
    if scope.is_empty() {
        return true;
    }

    let dimension = item.detail.dimension.as_deref().unwrap_or("");

    if scope.contains('*') {
        let expr = format!(
            "^{}$",
            scope
                .chars()
                .map(|c| match c {
                    '*' => ".*".to_string(),
                    '?' => ".".to_string(),
                    c => regex::escape(&c.to_string()),
                })
                .collect::<String>()
        );
        return Regex::new(&expr).is_ok_and(|re| {
            [item.id.as_str(), item.file.as_str(), item.detector.as_str(), dimension, item.summary.as_str()]
                .iter()
                .any(|candidate| re.is_match(candidate))
        });
    }

    if scope.contains("::") {
        return item.id.starts_with(scope);
    }

    let lowered = scope.to_lowercase();
    if item.kind == ItemKind::SubjectiveDimension {
        return item.id.to_lowercase().contains(&lowered)
            || dimension.to_lowercase().contains(&lowered)
            || item.summary.to_lowercase().contains(&lowered);
    }

    if lowered.len() >= 8 && lowered.chars().all(|c| c.is_ascii_hexdigit()) {
        return item.id.to_lowercase().ends_with(&format!("::{}", lowered));
    }

    item.detector == scope
        || item.file == scope
        || item.file.starts_with(&format!("{}/", scope.trim_end_matches('/')))
}

/// Attach the ranking explanation to an item.
pub fn explain_item(item: &QueueItem) -> Explain {
    match item.kind {
        ItemKind::SubjectiveDimension => Explain {
            effective_tier: item.effective_tier,
            confidence_rank: None,
            subjective_score: item.subjective_score,
            review_weight: None,
            count: item.count,
            ranking_factors: vec!["tier asc", "subjective_score asc", "id asc"],
            policy: Some(
                "Subjective dimensions are always queued at tier 4 and never outrank mechanical tier 1-3 work.",
            ),
        },
        ItemKind::Cluster => Explain {
            effective_tier: item.effective_tier,
            confidence_rank: None,
            subjective_score: None,
            review_weight: None,
            count: item.member_count as u64,
            ranking_factors: vec!["clusters first", "action type asc", "member count desc", "id asc"],
            policy: None,
        },
        ItemKind::Finding => Explain {
            effective_tier: item.effective_tier,
            confidence_rank: Some(item.confidence.rank()),
            subjective_score: None,
            review_weight: item.review_weight,
            count: item.count,
            ranking_factors: if item.review_weight.is_some() {
                vec!["tier asc", "confidence asc", "review_weight desc", "count desc", "id asc"]
            } else {
                vec!["tier asc", "confidence asc", "count desc", "id asc"]
            },
            policy: None,
        },
    }
}
