//! Ignore-pattern suppression
//!
//! Suppression is a ledger-level invisibility flag independent of status:
//! suppressed findings keep their historical status but contribute nothing to
//! stats, scoring, or the work queue. Patterns come from user ignore rules.
//!
//! Pattern grammar (checked in order):
//! - contains `*` — glob match against the finding id when the pattern also
//!   contains `::`, otherwise against the file path
//! - contains `::` — prefix match on the finding id
//! - otherwise — exact file path match

use chrono::{DateTime, Utc};
use log::debug;
use regex::Regex;

use crate::ledger::finding::Finding;

/// Translate a shell-style glob into an anchored regex.
///
/// `*` matches any run of characters (including `/`, matching the way ignore
/// rules are written against whole ids), `?` matches one character.
fn glob_regex(pattern: &str) -> Option<Regex> {
    let mut expr = String::with_capacity(pattern.len() + 8);
    expr.push('^');
    for ch in pattern.chars() {
        match ch {
            '*' => expr.push_str(".*"),
            '?' => expr.push('.'),
            c => expr.push_str(&regex::escape(&c.to_string())),
        }
    }
    expr.push('$');
    Regex::new(&expr).ok()
}

/// Check whether one pattern matches a finding id / file pair.
pub fn pattern_matches(pattern: &str, finding_id: &str, file: &str) -> bool {
    if pattern.contains('*') {
        let target = if pattern.contains("::") { finding_id } else { file };
        return glob_regex(pattern).is_some_and(|re| re.is_match(target));
    }
    if pattern.contains("::") {
        return finding_id.starts_with(pattern);
    }
    file == pattern
}

/// Check a finding against every active ignore pattern.
pub fn is_ignored(finding_id: &str, file: &str, ignore_patterns: &[String]) -> bool {
    ignore_patterns
        .iter()
        .any(|pattern| pattern_matches(pattern, finding_id, file))
}

/// Flag every finding matching `pattern` as suppressed.
///
/// Status is left untouched: a suppressed Fixed finding stays Fixed, never
/// reopened. Returns the ids newly suppressed by this call.
pub fn suppress_matching(
    findings: &mut std::collections::BTreeMap<String, Finding>,
    pattern: &str,
    now: DateTime<Utc>,
) -> Vec<String> {
    let mut suppressed = Vec::new();
    for (id, finding) in findings.iter_mut() {
        if finding.suppressed {
            continue;
        }
        if pattern_matches(pattern, id, &finding.file) {
            finding.suppressed = true;
            finding.suppressed_at = Some(now);
            finding.suppression_pattern = Some(pattern.to_string());
            suppressed.push(id.clone());
        }
    }
    debug!("Pattern {:?} suppressed {} finding(s)", pattern, suppressed.len());
    suppressed
}

/// Lift suppression from findings no longer covered by any active pattern.
///
/// Used when an ignore rule is removed so previously hidden findings become
/// visible again without losing their status.
pub fn unsuppress_unmatched(
    findings: &mut std::collections::BTreeMap<String, Finding>,
    active_patterns: &[String],
) -> Vec<String> {
    let mut released = Vec::new();
    for (id, finding) in findings.iter_mut() {
        if !finding.suppressed {
            continue;
        }
        if !is_ignored(id, &finding.file, active_patterns) {
            finding.suppressed = false;
            finding.suppressed_at = None;
            finding.suppression_pattern = None;
            released.push(id.clone());
        }
    }
    released
}
