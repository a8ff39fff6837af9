//! Manual finding resolution and reopen
//!
//! Pattern-driven queries and status changes applied by a user, as opposed to
//! the automatic transitions the merge step performs.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use log::info;
use regex::Regex;

use crate::ledger::error::{LedgerError, LedgerResult};
use crate::ledger::finding::{Finding, FindingStatus};

/// Match a show/resolve pattern against one finding.
///
/// Checked in order: exact id, `*` glob on id, `::` id prefix, detector name,
/// exact file path or directory prefix.
fn matches_query(finding_id: &str, finding: &Finding, pattern: &str) -> bool {
    if finding_id == pattern {
        return true;
    }
    if pattern.contains('*') {
        // Globs in queries always target the id, unlike ignore rules.
        let expr = format!(
            "^{}$",
            pattern
                .chars()
                .map(|c| match c {
                    '*' => ".*".to_string(),
                    '?' => ".".to_string(),
                    c => regex::escape(&c.to_string()),
                })
                .collect::<String>()
        );
        return Regex::new(&expr).is_ok_and(|re| re.is_match(finding_id));
    }
    if pattern.contains("::") {
        return finding_id.starts_with(pattern);
    }
    if finding.detector == pattern {
        return true;
    }
    finding.file == pattern || finding.file.starts_with(&format!("{}/", pattern.trim_end_matches('/')))
}

/// Status filter for queries; `None` means any status.
pub fn match_findings<'a>(
    findings: &'a BTreeMap<String, Finding>,
    pattern: &str,
    status_filter: Option<FindingStatus>,
) -> Vec<&'a Finding> {
    findings
        .iter()
        .filter(|(_, f)| !f.suppressed)
        .filter(|(_, f)| status_filter.map_or(true, |status| f.status == status))
        .filter(|(id, f)| matches_query(id, f, pattern))
        .map(|(_, f)| f)
        .collect()
}

/// Resolve every open finding matching `pattern` to a manual status.
///
/// Resolving also clears suppression flags so the record is auditable again.
/// Returns the resolved ids.
pub fn resolve_findings(
    findings: &mut BTreeMap<String, Finding>,
    pattern: &str,
    status: FindingStatus,
    note: Option<&str>,
    now: DateTime<Utc>,
) -> LedgerResult<Vec<String>> {
    if !status.is_manual_resolution() {
        return Err(LedgerError::InvalidTransition {
            id: pattern.to_string(),
            reason: format!("{} is not a manual resolution status", status.as_str()),
        });
    }

    let ids: Vec<String> = findings
        .iter()
        .filter(|(_, f)| !f.suppressed && f.status == FindingStatus::Open)
        .filter(|(id, f)| matches_query(id, f, pattern))
        .map(|(id, _)| id.clone())
        .collect();

    for id in &ids {
        if let Some(finding) = findings.get_mut(id) {
            finding.status = status;
            finding.note = note.map(str::to_string);
            finding.resolved_at = Some(now);
            finding.suppressed = false;
            finding.suppressed_at = None;
            finding.suppression_pattern = None;
        }
    }
    info!("Resolved {} finding(s) as {} via {:?}", ids.len(), status.as_str(), pattern);
    Ok(ids)
}

/// Explicitly reopen one finding, whatever its resolved status.
pub fn reopen_finding(
    findings: &mut BTreeMap<String, Finding>,
    id: &str,
    note: Option<&str>,
) -> LedgerResult<()> {
    let finding = findings
        .get_mut(id)
        .ok_or_else(|| LedgerError::UnknownFinding { id: id.to_string() })?;

    if finding.status == FindingStatus::Open {
        return Err(LedgerError::InvalidTransition {
            id: id.to_string(),
            reason: "finding is already open".to_string(),
        });
    }

    finding.status = FindingStatus::Open;
    finding.reopen_count += 1;
    finding.resolved_at = None;
    finding.note = note.map(str::to_string).or_else(|| Some("Reopened by user".to_string()));
    info!("Reopened {}", id);
    Ok(())
}
