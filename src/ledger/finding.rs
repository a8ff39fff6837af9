//! Finding data model
//!
//! A Finding is the atomic unit of tracked state: one detector-identified
//! issue with a stable identity across scans. Status and suppression are the
//! only mutable aspects once a finding exists — findings are never deleted.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a tracked finding.
///
/// Transitions are one-directional except for explicit reopen: resolved
/// statuses persist across rescans unless the user reopens the finding or a
/// detector actively re-reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingStatus {
    /// Actively reported and unaddressed
    Open,
    /// Manually resolved with a concrete fix
    Fixed,
    /// Disappeared from a scan without manual action
    AutoResolved,
    /// Acknowledged, deliberately not fixed
    Wontfix,
    /// Dismissed as not a real issue
    FalsePositive,
}

impl FindingStatus {
    /// Statuses a human applied explicitly; these survive re-detection.
    pub fn is_manual_resolution(self) -> bool {
        matches!(
            self,
            FindingStatus::Fixed | FindingStatus::Wontfix | FindingStatus::FalsePositive
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FindingStatus::Open => "open",
            FindingStatus::Fixed => "fixed",
            FindingStatus::AutoResolved => "auto_resolved",
            FindingStatus::Wontfix => "wontfix",
            FindingStatus::FalsePositive => "false_positive",
        }
    }
}

impl std::str::FromStr for FindingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "open" => Ok(FindingStatus::Open),
            "fixed" => Ok(FindingStatus::Fixed),
            "auto_resolved" => Ok(FindingStatus::AutoResolved),
            "wontfix" => Ok(FindingStatus::Wontfix),
            "false_positive" => Ok(FindingStatus::FalsePositive),
            _ => Err(format!(
                "Invalid status: {}. Valid: open, fixed, auto_resolved, wontfix, false_positive",
                s
            )),
        }
    }
}

/// Detector confidence in a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    /// Scoring weight for weighted-failure sums.
    pub fn weight(self) -> f64 {
        match self {
            Confidence::High => 1.0,
            Confidence::Medium => 0.7,
            Confidence::Low => 0.3,
        }
    }

    /// Rank for queue ordering (lower ranks first).
    pub fn rank(self) -> u8 {
        match self {
            Confidence::High => 0,
            Confidence::Medium => 1,
            Confidence::Low => 2,
        }
    }

    /// Lenient label parsing: unknown labels fall back to the lowest weight
    /// rather than failing the candidate.
    pub fn from_label(label: &str) -> Confidence {
        match label.to_lowercase().as_str() {
            "high" => Confidence::High,
            "medium" => Confidence::Medium,
            _ => Confidence::Low,
        }
    }
}

/// Codebase zone a finding belongs to, assigned by an external classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Zone {
    #[default]
    Production,
    Test,
    Vendor,
    Generated,
}

impl Zone {
    pub fn from_label(label: &str) -> Zone {
        match label.to_lowercase().as_str() {
            "test" => Zone::Test,
            "vendor" => Zone::Vendor,
            "generated" => Zone::Generated,
            _ => Zone::Production,
        }
    }
}

/// Detector-specific payload attached to a finding.
///
/// Fields the engine itself interprets are typed; anything else a detector
/// supplies rides along in `extra` untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Detail {
    /// LOC-derived scoring weight for size-style detectors
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loc_weight: Option<f64>,
    /// Marks a codebase-wide finding (`file == "."`)
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub holistic: bool,
    /// Occurrence count used as a queue-ranking secondary key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    /// Subjective dimension key for review/concern findings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension: Option<String>,
    /// Detector-specific extension fields, preserved verbatim
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Detail {
    pub fn is_empty(&self) -> bool {
        self.loc_weight.is_none()
            && !self.holistic
            && self.count.is_none()
            && self.dimension.is_none()
            && self.extra.is_empty()
    }
}

/// One tracked occurrence of a detector-identified issue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub id: String,
    pub detector: String,
    pub file: String,
    pub tier: u8,
    pub confidence: Confidence,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Detail::is_empty")]
    pub detail: Detail,
    pub status: FindingStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reopen_count: u32,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub suppressed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suppressed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suppression_pattern: Option<String>,
    #[serde(default, skip_serializing_if = "is_default_zone")]
    pub zone: Zone,
    /// Scan source label (e.g. a language name) for scoped auto-resolution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

fn is_default_zone(zone: &Zone) -> bool {
    *zone == Zone::Production
}

/// Compose the stable finding id from its identity triple.
///
/// The same `(detector, file, name)` must always yield the same id across
/// runs; reconciliation keys on it.
pub fn finding_id(detector: &str, file: &str, name: &str) -> String {
    if name.is_empty() {
        format!("{}::{}", detector, file)
    } else {
        format!("{}::{}::{}", detector, file, name)
    }
}

/// A validated candidate from a detector batch, not yet merged.
#[derive(Debug, Clone)]
pub struct RawCandidate {
    pub detector: String,
    pub file: String,
    pub name: String,
    pub tier: u8,
    pub confidence: Confidence,
    pub summary: String,
    pub detail: Detail,
    pub zone: Zone,
}

impl RawCandidate {
    pub fn id(&self) -> String {
        finding_id(&self.detector, &self.file, &self.name)
    }

    /// Materialize a candidate into a fresh Open finding.
    pub fn into_finding(self, now: DateTime<Utc>, source: Option<&str>) -> Finding {
        let id = self.id();
        Finding {
            id,
            detector: self.detector,
            file: self.file,
            tier: self.tier,
            confidence: self.confidence,
            summary: self.summary,
            detail: self.detail,
            status: FindingStatus::Open,
            note: None,
            first_seen: now,
            last_seen: now,
            resolved_at: None,
            reopen_count: 0,
            suppressed: false,
            suppressed_at: None,
            suppression_pattern: None,
            zone: self.zone,
            source: source.map(str::to_string),
        }
    }
}
