//! Structured decomposition of raw coverage-name strings.
//!
//! [`decompose`] is a pure function: it never mutates or discards the
//! original text, only reads annotations out of it. Fragment detection runs
//! first and short-circuits; every other extraction step reads the raw
//! string independently, so the steps are order-independent and
//! re-runnable.

use serde::{Deserialize, Serialize};

use crate::heuristics::Heuristics;

/// Canonical payout-limit kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutLimitType {
    /// Paid at most N times over the policy lifetime ("최초 N회한")
    PerPolicy,
    /// Paid at most N times per year ("연간 N회")
    PerYear,
    /// Paid at most N times per accident ("사고당 N회")
    PerAccident,
}

/// Structured decomposition of one coverage-name string.
///
/// A record with `fragment_detected = true` carries no other reliable field
/// and must be routed to the fragment stream, never merged into the main
/// fact stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageSemantics {
    /// Display title: parentheticals and leading enumeration stripped
    pub coverage_title: String,
    /// Individual excluded terms from "…제외" parentheticals
    pub exclusions: Vec<String>,
    /// Payout-limit kind, when a limit parenthetical is present
    pub payout_limit_type: Option<PayoutLimitType>,
    /// Payout-limit count
    pub payout_limit_count: Option<u32>,
    /// Renewal marker as written ("갱신", "20년갱신")
    pub renewal_type: Option<String>,
    /// True when any renewal parenthetical is present
    pub renewal_flag: bool,
    /// Allow-listed parenthetical annotations, verbatim
    pub coverage_modifiers: Vec<String>,
    /// True when the text is a mis-split remnant of a larger entry
    pub fragment_detected: bool,
    /// Probable parent coverage for a fragment, when the lookup knows one
    pub parent_coverage_hint: Option<String>,
}

impl CoverageSemantics {
    fn fragment(hint: Option<String>) -> Self {
        Self {
            coverage_title: String::new(),
            exclusions: Vec::new(),
            payout_limit_type: None,
            payout_limit_count: None,
            renewal_type: None,
            renewal_flag: false,
            coverage_modifiers: Vec::new(),
            fragment_detected: true,
            parent_coverage_hint: hint,
        }
    }
}

/// Decompose a raw coverage-name string.
pub fn decompose(raw: &str, heuristics: &Heuristics) -> CoverageSemantics {
    let trimmed = raw.trim();

    // Fragment detection first and exclusively.
    if is_fragment(trimmed, heuristics) {
        let hint = heuristics.parent_hint(trimmed).map(|h| h.to_string());
        return CoverageSemantics::fragment(hint);
    }

    let exclusions = extract_exclusions(trimmed, heuristics);
    let (payout_limit_type, payout_limit_count) = extract_payout_limit(trimmed, heuristics);
    let (renewal_flag, renewal_type) = extract_renewal(trimmed, heuristics);
    let coverage_modifiers = extract_modifiers(trimmed, heuristics);
    let coverage_title = build_title(trimmed, heuristics);

    CoverageSemantics {
        coverage_title,
        exclusions,
        payout_limit_type,
        payout_limit_count,
        renewal_type,
        renewal_flag,
        coverage_modifiers,
        fragment_detected: false,
        parent_coverage_hint: None,
    }
}

/// Bare frequency phrase, or an unterminated parenthesis at either end.
fn is_fragment(text: &str, heuristics: &Heuristics) -> bool {
    if text.is_empty() {
        return false;
    }
    if heuristics.is_bare_frequency(text) {
        return true;
    }
    let has_open = text.contains('(') || text.contains('（');
    let has_close = text.contains(')') || text.contains('）');
    // A parenthesis missing its partner marks a mis-split remnant
    (has_open && !has_close) || (has_close && !has_open)
}

/// Every "…제외" parenthetical, split into individual excluded terms.
fn extract_exclusions(text: &str, heuristics: &Heuristics) -> Vec<String> {
    let mut exclusions = Vec::new();
    for body in heuristics.exclusion_bodies(text) {
        for term in split_list_items(body) {
            if !term.is_empty() {
                exclusions.push(term);
            }
        }
    }
    exclusions
}

/// Split an exclusion body on common Korean list delimiters.
fn split_list_items(body: &str) -> Vec<String> {
    body.replace(" 및 ", ",")
        .split([',', '·', '/'])
        .map(|t| t.trim().to_string())
        .collect()
}

fn extract_payout_limit(
    text: &str,
    heuristics: &Heuristics,
) -> (Option<PayoutLimitType>, Option<u32>) {
    match heuristics.payout_limit(text) {
        Some((kind, count)) => {
            let limit_type = match kind {
                "최초" => PayoutLimitType::PerPolicy,
                "연간" => PayoutLimitType::PerYear,
                _ => PayoutLimitType::PerAccident,
            };
            (Some(limit_type), Some(count))
        },
        None => (None, None),
    }
}

fn extract_renewal(text: &str, heuristics: &Heuristics) -> (bool, Option<String>) {
    match heuristics.renewal(text) {
        Some(Some(years)) => (true, Some(format!("{}년갱신", years))),
        Some(None) => (true, Some("갱신".to_string())),
        None => (false, None),
    }
}

/// Parenthetical annotations on the modifier allow-list, verbatim.
fn extract_modifiers(text: &str, heuristics: &Heuristics) -> Vec<String> {
    let mut modifiers = Vec::new();
    let mut rest = text;
    while let Some(open) = rest.find(['(', '（']) {
        let tail = &rest[open..];
        let close = match tail.find([')', '）']) {
            Some(c) => c,
            None => break,
        };
        let inner: &str = tail[..close]
            .trim_start_matches(['(', '（'])
            .trim();
        if heuristics
            .lexicon
            .modifier_allowlist
            .iter()
            .any(|m| inner.contains(m.as_str()))
        {
            modifiers.push(inner.to_string());
        }
        rest = &tail[close..];
        rest = &rest[rest.chars().next().map(char::len_utf8).unwrap_or(0)..];
    }
    modifiers
}

/// Display title: parentheticals and leading enumeration stripped,
/// whitespace collapsed.
fn build_title(text: &str, heuristics: &Heuristics) -> String {
    let stripped = heuristics.strip_parentheticals(text);
    let stripped = heuristics.strip_enumeration(&stripped);
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}
