//! Work queue
//!
//! Derives a deterministically ordered, tier-first action queue from the
//! scored ledger, optionally biased by the living plan. Consumes finding
//! status; never mutates it.

pub mod plan;
pub mod ranking;

use std::collections::BTreeMap;

use serde::Serialize;

use crate::ledger::finding::FindingStatus;
use crate::ledger::Ledger;
use crate::queue::plan::{Cluster, ClusterAction, Plan};
use crate::queue::ranking::{
    build_finding_items, build_subjective_items, choose_fallback_tier, compare_items, explain_item,
    item_matches_tier, scope_matches, tier_counts, PlanClusterInfo, QueueItem,
};
use crate::scoring::policy::ScoringPolicy;

/// Queue construction knobs sourced from configuration.
#[derive(Debug, Clone)]
pub struct QueuePolicy {
    /// Subjective dimensions below this strict score become queue items
    pub subjective_threshold: f64,
    /// Interleave guardrail burst sizes
    pub objective_burst: usize,
    pub subjective_burst: usize,
}

impl Default for QueuePolicy {
    fn default() -> Self {
        Self {
            subjective_threshold: 100.0,
            objective_burst: 3,
            subjective_burst: 1,
        }
    }
}

/// Per-request queue options.
#[derive(Debug, Clone)]
pub struct QueueBuildOptions {
    pub tier: Option<u8>,
    /// Max items returned; `None` returns everything
    pub count: Option<usize>,
    /// Status filter; `None` includes every status
    pub status: Option<FindingStatus>,
    pub scope: Option<String>,
    pub include_subjective: bool,
    /// Only chronic reopeners (open, reopened twice or more)
    pub chronic: bool,
    pub no_tier_fallback: bool,
    pub explain: bool,
    pub include_skipped: bool,
    /// Restrict to one cluster's members
    pub cluster: Option<String>,
    pub collapse_clusters: bool,
}

impl Default for QueueBuildOptions {
    fn default() -> Self {
        Self {
            tier: None,
            count: Some(1),
            status: Some(FindingStatus::Open),
            scope: None,
            include_subjective: true,
            chronic: false,
            no_tier_fallback: false,
            explain: false,
            include_skipped: false,
            cluster: None,
            collapse_clusters: true,
        }
    }
}

/// The ranked queue plus tier metadata.
#[derive(Debug, Clone, Serialize)]
pub struct WorkQueueResult {
    pub items: Vec<QueueItem>,
    /// Matching items before the count cut
    pub total: usize,
    pub tier_counts: BTreeMap<u8, usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested_tier: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_tier: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
    pub available_tiers: Vec<u8>,
}

/// Annotate items with plan overrides and reorder per the living plan.
///
/// Items named in `queue_order` come first in that order; the rest keep the
/// mechanical sort; skipped items drop out (or trail when requested).
fn apply_plan_order(items: Vec<QueueItem>, plan: &Plan, include_skipped: bool) -> Vec<QueueItem> {
    let mut items = items;
    for item in items.iter_mut() {
        if let Some(override_entry) = plan.overrides.get(&item.id) {
            item.plan_description = override_entry.description.clone();
            item.plan_note = override_entry.note.clone();
            if let Some(cluster_name) = &override_entry.cluster {
                if let Some(cluster) = plan.clusters.get(cluster_name) {
                    item.plan_cluster = Some(PlanClusterInfo {
                        name: cluster_name.clone(),
                        description: cluster.description.clone(),
                        total_items: cluster.finding_ids.len(),
                    });
                }
            }
        }
    }

    let mut ordered: Vec<QueueItem> = Vec::new();
    let mut remaining: Vec<QueueItem> = Vec::new();
    let mut skipped: Vec<QueueItem> = Vec::new();

    for mut item in items {
        if let Some(entry) = plan.skipped.get(&item.id) {
            item.plan_skipped = true;
            item.plan_skip_kind = Some(entry.kind);
            item.plan_skip_reason = entry.reason.clone();
            skipped.push(item);
        } else if plan.queue_order.iter().any(|id| id == &item.id) {
            ordered.push(item);
        } else {
            remaining.push(item);
        }
    }
    ordered.sort_by_key(|item| {
        plan.queue_order
            .iter()
            .position(|id| id == &item.id)
            .unwrap_or(usize::MAX)
    });

    let mut result = ordered;
    result.extend(remaining);
    if include_skipped {
        result.extend(skipped);
    }
    for (position, item) in result.iter_mut().enumerate() {
        item.queue_position = Some(position + 1);
    }
    result
}

fn cluster_meta_item(name: &str, cluster: &Cluster, members: Vec<QueueItem>) -> QueueItem {
    let min_tier = members.iter().map(|m| m.effective_tier).min().unwrap_or(3);
    let mut item = QueueItem::cluster_shell(name);
    item.detector = members
        .first()
        .map(|m| m.detector.clone())
        .unwrap_or_default();
    item.confidence = crate::ledger::finding::Confidence::High;
    item.tier = min_tier;
    item.effective_tier = min_tier;
    item.summary = cluster
        .description
        .clone()
        .unwrap_or_else(|| format!("{} findings", members.len()));
    item.member_count = members.len();
    item.action_type = Some(cluster.action_type.unwrap_or(ClusterAction::ManualFix));
    item.members = members;
    item
}

/// Replace auto-cluster member items with single meta-items.
///
/// Singletons stay as individual findings.
fn collapse_clusters(items: Vec<QueueItem>, plan: &Plan) -> Vec<QueueItem> {
    let mut member_of: BTreeMap<&str, &str> = BTreeMap::new();
    for (name, cluster) in &plan.clusters {
        if !cluster.auto {
            continue;
        }
        for finding_id in &cluster.finding_ids {
            member_of.insert(finding_id.as_str(), name.as_str());
        }
    }
    if member_of.is_empty() {
        return items;
    }

    let mut cluster_members: BTreeMap<String, Vec<QueueItem>> = BTreeMap::new();
    let mut rest: Vec<QueueItem> = Vec::new();
    for item in items {
        match member_of.get(item.id.as_str()) {
            Some(cluster_name) => cluster_members
                .entry(cluster_name.to_string())
                .or_default()
                .push(item),
            None => rest.push(item),
        }
    }

    for (name, members) in cluster_members {
        if members.len() < 2 {
            rest.extend(members);
            continue;
        }
        if let Some(cluster) = plan.clusters.get(&name) {
            rest.push(cluster_meta_item(&name, cluster, members));
        }
    }
    rest.sort_by(compare_items);
    rest
}

/// Alternate bursts of objective and subjective work so subjective items are
/// neither starved nor dominant on unfiltered queues.
fn interleave_subjective(items: Vec<QueueItem>, queue_policy: &QueuePolicy) -> Vec<QueueItem> {
    if queue_policy.objective_burst == 0 || queue_policy.subjective_burst == 0 {
        return items;
    }
    let (subjective, objective): (Vec<QueueItem>, Vec<QueueItem>) =
        items.into_iter().partition(|item| item.is_subjective());
    if subjective.is_empty() || objective.is_empty() {
        let mut merged = objective;
        merged.extend(subjective);
        return merged;
    }

    let mut result = Vec::with_capacity(objective.len() + subjective.len());
    let mut objective = objective.into_iter();
    let mut subjective = subjective.into_iter();
    loop {
        let mut emitted = false;
        for _ in 0..queue_policy.objective_burst {
            if let Some(item) = objective.next() {
                result.push(item);
                emitted = true;
            }
        }
        for _ in 0..queue_policy.subjective_burst {
            if let Some(item) = subjective.next() {
                result.push(item);
                emitted = true;
            }
        }
        if !emitted {
            break;
        }
    }
    result
}

/// Build the ranked queue plus tier metadata.
pub fn build_work_queue(
    ledger: &Ledger,
    scoring_policy: &ScoringPolicy,
    queue_policy: &QueuePolicy,
    living_plan: Option<&Plan>,
    options: &QueueBuildOptions,
) -> WorkQueueResult {
    let mut items = build_finding_items(ledger, scoring_policy, options.status, options.chronic);

    let subjective_eligible = options.include_subjective
        && !options.chronic
        && matches!(options.status, None | Some(FindingStatus::Open));
    if subjective_eligible {
        items.extend(build_subjective_items(ledger, queue_policy.subjective_threshold));
    }

    items.retain(|item| scope_matches(item, options.scope.as_deref()));
    items.sort_by(compare_items);

    if let Some(plan) = living_plan {
        items = apply_plan_order(items, plan, options.include_skipped);

        let effective_cluster = options
            .cluster
            .clone()
            .or_else(|| plan.active_cluster.clone());
        match effective_cluster {
            Some(cluster_name) => {
                if let Some(cluster) = plan.clusters.get(&cluster_name) {
                    items.retain(|item| cluster.finding_ids.contains(&item.id));
                }
            }
            None => {
                if options.collapse_clusters {
                    items = collapse_clusters(items, plan);
                }
            }
        }
    }

    let should_interleave = subjective_eligible
        && options.tier.is_none()
        && options.scope.is_none()
        && options.cluster.is_none();
    if should_interleave {
        items = interleave_subjective(items, queue_policy);
    }

    let counts = tier_counts(&items);
    let mut selected_tier = options.tier;
    let mut fallback_reason = None;
    let mut filtered = items;

    if let Some(requested) = options.tier {
        let matching: Vec<QueueItem> = filtered
            .iter()
            .filter(|item| item_matches_tier(item, requested))
            .cloned()
            .collect();
        if matching.is_empty() && !options.no_tier_fallback {
            match choose_fallback_tier(requested, &counts) {
                Some(chosen) => {
                    selected_tier = Some(chosen);
                    fallback_reason = Some(format!(
                        "Requested T{} has 0 open -> showing T{} (nearest non-empty)",
                        requested, chosen
                    ));
                    filtered.retain(|item| item_matches_tier(item, chosen));
                }
                None => {
                    fallback_reason = Some(format!("Requested T{} has 0 open", requested));
                    filtered = Vec::new();
                }
            }
        } else if matching.is_empty() {
            fallback_reason = Some(format!("Requested T{} has 0 open", requested));
            filtered = Vec::new();
        } else {
            filtered = matching;
        }
    }

    let total = filtered.len();
    if let Some(count) = options.count {
        if count > 0 {
            filtered.truncate(count);
        }
    }

    if options.explain {
        for item in filtered.iter_mut() {
            item.explain = Some(explain_item(item));
        }
    }

    let available_tiers: Vec<u8> = counts
        .iter()
        .filter(|(_, count)| **count > 0)
        .map(|(tier, _)| *tier)
        .collect();

    WorkQueueResult {
        items: filtered,
        total,
        tier_counts: counts,
        requested_tier: options.tier,
        selected_tier,
        fallback_reason,
        available_tiers,
    }
}
