//! Profile building: two-pass table discovery and schema inference.
//!
//! Pass A scans every table on every page for coverage/amount/premium
//! header keywords. Pass B is a content-pattern fallback that only examines
//! pages Pass A left unclaimed — the claimed set is explicit state, not a
//! side effect, so the pass-ordering invariant stays testable. Neither pass
//! depends on a fixed per-issuer template.

pub mod column_mapper;

use std::collections::BTreeSet;

use chrono::{SecondsFormat, Utc};
use indexmap::IndexMap;

use crate::document::{DocumentSource, TableGrid};
use crate::error::Result;
use crate::fingerprint::Fingerprint;
use crate::heuristics::{Heuristics, HEURISTICS_VERSION};
use crate::profile::{
    DetectionPass, Profile, ProfileStore, RowFilterRules, SaveOutcome, SummaryTable,
    TableSignature, BUILDER_VERSION, PROFILE_VERSION,
};

/// Pages already claimed by an earlier detection pass.
///
/// Pass B never re-examines a claimed page.
#[derive(Debug, Default)]
pub struct ClaimedRegions {
    pages: BTreeSet<usize>,
}

impl ClaimedRegions {
    /// Empty claim set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a page for the current pass.
    pub fn claim(&mut self, page: usize) {
        self.pages.insert(page);
    }

    /// True when a page was claimed by an earlier pass.
    pub fn is_claimed(&self, page: usize) -> bool {
        self.pages.contains(&page)
    }

    /// Claimed pages in ascending order.
    pub fn pages(&self) -> impl Iterator<Item = usize> + '_ {
        self.pages.iter().copied()
    }
}

/// Pass-A classification of one table.
enum PassA {
    /// Keyword candidate meeting the primary row minimum
    Primary { header_row: usize, evidence: Vec<String> },
    /// Keyword candidate demoted or rescued into the variant group
    Variant { header_row: usize, evidence: Vec<String> },
    /// Candidate examined and rejected, with an anomaly note
    Rejected(String),
    /// Not a summary-table candidate at all
    NotACandidate,
}

/// Builds one profile per (insurer, variant) document.
pub struct ProfileBuilder<'h> {
    heuristics: &'h Heuristics,
}

impl<'h> ProfileBuilder<'h> {
    /// Create a builder over the given heuristics service.
    pub fn new(heuristics: &'h Heuristics) -> Self {
        Self { heuristics }
    }

    /// Discover table signatures and assemble a profile for `doc`.
    pub fn build(
        &self,
        doc: &dyn DocumentSource,
        insurer: &str,
        variant: &str,
    ) -> Result<Profile> {
        let fingerprint = Fingerprint::compute(doc.source_path(), doc.page_count())?;

        let mut primary = Vec::new();
        let mut variants = Vec::new();
        let mut anomalies = Vec::new();
        let mut claimed = ClaimedRegions::new();

        // Pass A: keyword-based detection over every table.
        for page in 1..=doc.page_count() {
            for (table_index, table) in doc.page_tables(page)?.iter().enumerate() {
                match self.classify_pass_a(table) {
                    PassA::Primary { header_row, evidence } => {
                        let sig = self.pass_a_signature(
                            table,
                            page,
                            table_index,
                            header_row,
                            evidence,
                            &mut anomalies,
                        );
                        claimed.claim(page);
                        primary.push(sig);
                    },
                    PassA::Variant { header_row, evidence } => {
                        let sig = self.pass_a_signature(
                            table,
                            page,
                            table_index,
                            header_row,
                            evidence,
                            &mut anomalies,
                        );
                        claimed.claim(page);
                        variants.push(sig);
                    },
                    PassA::Rejected(note) => {
                        anomalies.push(format!("page {} table {}: {}", page, table_index, note));
                    },
                    PassA::NotACandidate => {},
                }
            }
        }

        // Pass B: content-pattern fallback over unclaimed pages only.
        for page in 1..=doc.page_count() {
            if claimed.is_claimed(page) {
                continue;
            }
            for (table_index, table) in doc.page_tables(page)?.iter().enumerate() {
                if let Some(evidence) = self.classify_pass_b(table) {
                    let column_map = column_mapper::infer_pattern_mapping(table, self.heuristics);
                    if column_map.coverage_name_index.is_none() {
                        anomalies.push(format!(
                            "page {} table {}: pass B signature without coverage-name column",
                            page, table_index
                        ));
                    }
                    variants.push(TableSignature {
                        page,
                        table_index,
                        row_count: table.row_count(),
                        col_count: table.col_count(),
                        header_row_index: None,
                        column_map,
                        row_filter_rules: self.row_filter_rules(),
                        detection_evidence: evidence,
                        detection_pass: DetectionPass::B,
                    });
                }
            }
        }

        let mut detection_metadata = IndexMap::new();
        detection_metadata.insert(
            "heuristics_version".to_string(),
            serde_json::json!(HEURISTICS_VERSION),
        );
        detection_metadata.insert(
            "pass_a_signatures".to_string(),
            serde_json::json!(primary.len() + variants.iter().filter(|s| s.detection_pass == DetectionPass::A).count()),
        );
        detection_metadata.insert(
            "pass_b_signatures".to_string(),
            serde_json::json!(variants.iter().filter(|s| s.detection_pass == DetectionPass::B).count()),
        );
        detection_metadata.insert(
            "claimed_pages".to_string(),
            serde_json::json!(claimed.pages().collect::<Vec<_>>()),
        );

        Ok(Profile {
            profile_version: PROFILE_VERSION,
            builder_version: BUILDER_VERSION.to_string(),
            generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            insurer: insurer.to_string(),
            variant: variant.to_string(),
            source_pdf_path: doc.source_path().display().to_string(),
            pdf_fingerprint: Some(fingerprint),
            summary_table: SummaryTable {
                primary_signatures: primary,
                variant_signatures: variants,
            },
            detail_structure: None,
            detection_metadata,
            known_anomalies: anomalies,
        })
    }

    /// Build and persist, passing through the Profile Lock check.
    pub fn build_and_save(
        &self,
        doc: &dyn DocumentSource,
        insurer: &str,
        variant: &str,
        store: &ProfileStore,
    ) -> Result<(Profile, SaveOutcome)> {
        let profile = self.build(doc, insurer, variant)?;
        let outcome = store.save(&profile)?;
        Ok((profile, outcome))
    }

    fn pass_a_signature(
        &self,
        table: &TableGrid,
        page: usize,
        table_index: usize,
        header_row: usize,
        evidence: Vec<String>,
        anomalies: &mut Vec<String>,
    ) -> TableSignature {
        let column_map = column_mapper::infer_header_mapping(table, header_row, self.heuristics);
        if column_map.coverage_name_index.is_none() {
            anomalies.push(format!(
                "page {} table {}: no coverage-name column resolvable",
                page, table_index
            ));
        }
        TableSignature {
            page,
            table_index,
            row_count: table.row_count(),
            col_count: table.col_count(),
            header_row_index: Some(header_row),
            column_map,
            row_filter_rules: self.row_filter_rules(),
            detection_evidence: evidence,
            detection_pass: DetectionPass::A,
        }
    }

    fn row_filter_rules(&self) -> RowFilterRules {
        RowFilterRules {
            min_name_len: self.heuristics.thresholds.name_min_len,
            max_name_len: self.heuristics.thresholds.name_max_len,
            totals_keywords: self.heuristics.lexicon.totals_tokens.clone(),
            disclaimer_keywords: self.heuristics.lexicon.disclaimer_tokens.clone(),
        }
    }

    /// Keyword classification of one table.
    fn classify_pass_a(&self, table: &TableGrid) -> PassA {
        let t = &self.heuristics.thresholds;
        let header_row = match self.find_header_row(table) {
            Some(r) => r,
            None => return PassA::NotACandidate,
        };

        // Join every cell down to the header row: issuers split header
        // labels across merged rows.
        let header_text: String = (0..=header_row)
            .flat_map(|r| (0..table.col_count()).map(move |c| (r, c)))
            .map(|(r, c)| table.cell_text(r, c))
            .collect::<Vec<_>>()
            .join(" ");

        let has_amount = self.heuristics.is_amount_header(&header_text);
        let has_money_context = self.heuristics.is_premium_header(&header_text)
            || self.heuristics.is_period_header(&header_text);
        if !has_amount || !has_money_context {
            return PassA::NotACandidate;
        }

        let data_rows = table.row_count().saturating_sub(header_row + 1);
        let mut evidence = vec![format!(
            "header keywords: coverage+amount+{}",
            if self.heuristics.is_premium_header(&header_text) {
                "premium"
            } else {
                "period"
            }
        )];

        if self.heuristics.is_disqualifying_header(&header_text) {
            // Provisional reclassification: boilerplate markers in the
            // header, but the body may still be a value table.
            return match self.rescue_check(table, header_row + 1) {
                Some(note) if data_rows >= t.min_rows_variant => {
                    evidence.push(note);
                    evidence.push("rescued after disqualifying header".to_string());
                    PassA::Variant { header_row, evidence }
                },
                Some(_) => PassA::Rejected(format!(
                    "rescued candidate below variant row minimum ({} rows)",
                    data_rows
                )),
                None => PassA::Rejected(
                    "disqualifying header and clause-like body".to_string(),
                ),
            };
        }

        if data_rows >= t.min_rows_primary {
            PassA::Primary { header_row, evidence }
        } else if data_rows >= t.min_rows_variant {
            evidence.push(format!("row count {} below primary minimum", data_rows));
            PassA::Variant { header_row, evidence }
        } else {
            PassA::Rejected(format!("keyword candidate with only {} data rows", data_rows))
        }
    }

    /// First of the leading rows whose cells contain a coverage keyword.
    fn find_header_row(&self, table: &TableGrid) -> Option<usize> {
        for row in 0..table.row_count().min(3) {
            for col in 0..table.col_count() {
                if self.heuristics.is_coverage_header(table.cell_text(row, col)) {
                    return Some(row);
                }
            }
        }
        None
    }

    /// Secondary check for disqualified candidates: mostly short value rows,
    /// not clause prose. Returns evidence on success.
    fn rescue_check(&self, table: &TableGrid, data_start: usize) -> Option<String> {
        let t = &self.heuristics.thresholds;
        let end = table.row_count().min(data_start + t.pass_b_sample_rows);
        let sampled = end.saturating_sub(data_start);
        if sampled == 0 {
            return None;
        }

        let mut clause_rows = 0usize;
        let mut value_rows = 0usize;
        for row in data_start..end {
            let cells: Vec<&str> = (0..table.col_count())
                .map(|c| table.cell_text(row, c))
                .collect();
            if cells.iter().any(|c| self.heuristics.is_clause_text(c)) {
                clause_rows += 1;
            }
            let has_amount = cells.iter().any(|c| self.heuristics.has_amount_pattern(c));
            let has_value = cells.iter().any(|c| {
                self.heuristics.has_premium_pattern(c) || self.heuristics.has_period_pattern(c)
            });
            if has_amount && has_value {
                value_rows += 1;
            }
        }

        let clause_ratio = clause_rows as f32 / sampled as f32;
        let value_ratio = value_rows as f32 / sampled as f32;
        if clause_ratio < t.rescue_long_text_max_ratio && value_ratio > t.rescue_value_min_ratio {
            Some(format!(
                "rescue check: clause rows {:.0}%, value rows {:.0}%",
                clause_ratio * 100.0,
                value_ratio * 100.0
            ))
        } else {
            log::debug!(
                "rescue check failed: clause {:.2}, value {:.2}",
                clause_ratio,
                value_ratio
            );
            None
        }
    }

    /// Content-pattern qualification for Pass B. Returns evidence when the
    /// table qualifies.
    fn classify_pass_b(&self, table: &TableGrid) -> Option<Vec<String>> {
        let t = &self.heuristics.thresholds;
        if table.row_count() < t.min_rows_variant {
            return None;
        }
        let end = table.row_count().min(t.pass_b_sample_rows);
        let sampled = end;
        let mut amount_rows = 0usize;
        let mut value_rows = 0usize;
        let mut korean_rows = 0usize;
        let mut clause_rows = 0usize;

        for row in 0..end {
            let cells: Vec<&str> = (0..table.col_count())
                .map(|c| table.cell_text(row, c))
                .collect();
            if cells.iter().any(|c| self.heuristics.has_amount_pattern(c)) {
                amount_rows += 1;
            }
            if cells.iter().any(|c| {
                self.heuristics.has_premium_pattern(c) || self.heuristics.has_period_pattern(c)
            }) {
                value_rows += 1;
            }
            if cells
                .iter()
                .take(2)
                .any(|c| self.heuristics.is_korean_text(c))
            {
                korean_rows += 1;
            }
            if cells.iter().any(|c| self.heuristics.is_clause_text(c)) {
                clause_rows += 1;
            }
        }

        let amount_ratio = amount_rows as f32 / sampled as f32;
        let value_ratio = value_rows as f32 / sampled as f32;
        let korean_ratio = korean_rows as f32 / sampled as f32;
        let clause_ratio = clause_rows as f32 / sampled as f32;

        if amount_ratio >= t.pass_b_amount_min_ratio
            && value_ratio >= t.pass_b_value_min_ratio
            && korean_ratio >= t.pass_b_korean_min_ratio
            && clause_ratio < t.pass_b_clause_max_ratio
        {
            Some(vec![format!(
                "pass B patterns: amount {:.0}%, value {:.0}%, korean {:.0}%, clause {:.0}%",
                amount_ratio * 100.0,
                value_ratio * 100.0,
                korean_ratio * 100.0,
                clause_ratio * 100.0
            )])
        } else {
            None
        }
    }
}
