//! Extraction orchestration: profile + document -> fact stream.
//!
//! The extractor never re-runs detection. It recomputes the document
//! fingerprint and refuses to proceed on any mismatch, then applies each
//! signature's declared schema, choosing between direct cell extraction
//! and hybrid layout reconstruction per signature. Row-level problems are
//! recorded and skipped; only gate failures abort the document.

use serde::Serialize;

use crate::detail::{DetailExtractor, DetailFact};
use crate::document::{DocumentSource, TableGrid};
use crate::error::{GateFailure, Result};
use crate::facts::{normalize_join_key, CoverageFacts, Evidence, FactWriter, ProposalFact};
use crate::fingerprint::Fingerprint;
use crate::geometry::Rect;
use crate::heuristics::Heuristics;
use crate::hybrid;
use crate::identity::IdentityExtractor;
use crate::profile::{Profile, TableSignature};
use crate::semantics::decompose;

/// Caller-supplied knobs for one extraction run.
#[derive(Debug, Clone, Default)]
pub struct ExtractionOptions {
    /// Issuer code stamped onto every record
    pub issuer_code: Option<String>,
    /// Free-form batch context stamped onto every record
    pub proposal_context: Option<String>,
    /// Non-binding variant cross-check (logged on mismatch)
    pub variant_hint: Option<String>,
    /// Keep standard extraction even past the empty-cell auto-trigger
    pub force_standard: bool,
    /// Prior fact count for the parity report
    pub baseline_count: Option<usize>,
}

/// One recorded row-level anomaly.
#[derive(Debug, Clone, Serialize)]
pub struct RowAnomaly {
    /// Source page
    pub page: usize,
    /// Table index within the page
    pub table_index: usize,
    /// Row index, when row-addressable
    pub row: Option<usize>,
    /// What went wrong
    pub reason: String,
}

/// Parity tier for a completed batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParityStatus {
    /// Extracted count within the warn band of baseline
    Pass,
    /// Noticeable drift; review before trusting
    Warn,
    /// Large drift; treat the batch as suspect
    Fail,
}

/// Aggregate report for one completed extraction.
#[derive(Debug, Clone, Serialize)]
pub struct ParityReport {
    /// Records emitted to the main stream
    pub extracted: usize,
    /// Records routed to the fragment stream
    pub fragments: usize,
    /// Baseline count, when one was supplied
    pub baseline: Option<usize>,
    /// (extracted - baseline) / baseline
    pub delta_ratio: Option<f32>,
    /// Tier derived from the delta
    pub status: ParityStatus,
    /// Row-level anomalies recorded during the run
    pub anomalies: Vec<RowAnomaly>,
}

/// In-memory result of one extraction run.
#[derive(Debug)]
pub struct ExtractionOutcome {
    /// Main fact stream, in emission order
    pub facts: Vec<ProposalFact>,
    /// Fragment stream, same schema
    pub fragment_facts: Vec<ProposalFact>,
    /// Aggregate parity report
    pub parity: ParityReport,
}

/// Catch-all region when a table reports no bounding box.
const FULL_PAGE: Rect = Rect {
    x: 0.0,
    y: 0.0,
    width: 1.0e6,
    height: 1.0e6,
};

/// One row pulled out of a signature before decomposition.
struct ExtractedRow {
    name: String,
    amount: Option<String>,
    premium: Option<String>,
    period: Option<String>,
    evidence: Evidence,
}

/// Applies a profile to a document.
pub struct Extractor<'h> {
    heuristics: &'h Heuristics,
}

impl<'h> Extractor<'h> {
    /// Create an extractor over the given heuristics service.
    pub fn new(heuristics: &'h Heuristics) -> Self {
        Self { heuristics }
    }

    /// Run the full extraction and return facts plus the parity report.
    pub fn run(
        &self,
        doc: &dyn DocumentSource,
        profile: &Profile,
        options: &ExtractionOptions,
    ) -> Result<ExtractionOutcome> {
        self.fingerprint_gate(doc, profile)?;

        let identity = IdentityExtractor::new(self.heuristics);
        let (product, variant) = identity.extract(doc, options.variant_hint.as_deref())?;

        let mut anomalies = Vec::new();
        let mut rows = Vec::new();

        for sig in &profile.summary_table.primary_signatures {
            rows.extend(self.extract_primary(doc, sig, options, &mut anomalies)?);
        }
        for sig in &profile.summary_table.variant_signatures {
            rows.extend(self.extract_variant(doc, sig, &mut anomalies)?);
        }

        // Detail join by normalized name; first detail wins a key.
        let details = match &profile.detail_structure {
            Some(structure) => DetailExtractor::new(self.heuristics).extract(doc, structure)?,
            None => Vec::new(),
        };
        let mut detail_index: Vec<(String, DetailFact)> = Vec::new();
        for detail in details {
            let key = normalize_join_key(&detail.coverage_name_raw, self.heuristics);
            if !detail_index.iter().any(|(k, _)| *k == key) {
                detail_index.push((key, detail));
            }
        }

        let mut facts = Vec::new();
        let mut fragment_facts = Vec::new();
        for row in rows {
            let semantics = decompose(&row.name, self.heuristics);
            let is_fragment = semantics.fragment_detected;
            let detail = if is_fragment {
                None
            } else {
                let key = normalize_join_key(&row.name, self.heuristics);
                detail_index
                    .iter()
                    .find(|(k, _)| *k == key)
                    .map(|(_, d)| d.clone())
            };
            let fact = ProposalFact {
                insurer_key: profile.insurer.clone(),
                issuer_code: options.issuer_code.clone(),
                product: product.clone(),
                variant: variant.clone(),
                proposal_context: options.proposal_context.clone(),
                coverage_name_raw: row.name,
                proposal_facts: CoverageFacts {
                    coverage_amount_text: row.amount,
                    premium_text: row.premium,
                    period_text: row.period,
                    coverage_semantics: semantics,
                    evidence_requirements: None,
                    evidences: vec![row.evidence],
                },
                proposal_detail_facts: detail,
            };
            if is_fragment {
                fragment_facts.push(fact);
            } else {
                facts.push(fact);
            }
        }

        let parity = self.parity_report(facts.len(), fragment_facts.len(), options, anomalies);
        Ok(ExtractionOutcome {
            facts,
            fragment_facts,
            parity,
        })
    }

    /// Run and write both JSONL streams.
    pub fn run_to_files<P: AsRef<std::path::Path>>(
        &self,
        doc: &dyn DocumentSource,
        profile: &Profile,
        options: &ExtractionOptions,
        main_path: P,
        fragment_path: P,
    ) -> Result<ParityReport> {
        let outcome = self.run(doc, profile, options)?;
        let mut writer = FactWriter::create(main_path, fragment_path)?;
        for fact in outcome.facts.iter().chain(outcome.fragment_facts.iter()) {
            writer.write(fact)?;
        }
        writer.finish()?;
        Ok(outcome.parity)
    }

    /// Hard startup gate: the profile's fingerprint must match the document
    /// exactly, and must exist at all.
    fn fingerprint_gate(&self, doc: &dyn DocumentSource, profile: &Profile) -> Result<()> {
        let recorded = profile.pdf_fingerprint.as_ref().ok_or_else(|| {
            GateFailure::MissingFingerprint {
                insurer: profile.insurer.clone(),
                variant: profile.variant.clone(),
            }
        })?;
        let current = Fingerprint::compute(doc.source_path(), doc.page_count())?;
        if !current.matches(recorded) {
            return Err(GateFailure::FingerprintMismatch {
                document: current.source_basename.clone(),
                changed_fields: current.changed_fields(recorded).join(", "),
            }
            .into());
        }
        Ok(())
    }

    /// Primary signatures run standard-first, with the hybrid auto-trigger
    /// measured on the raw grid before any row filtering.
    fn extract_primary(
        &self,
        doc: &dyn DocumentSource,
        sig: &TableSignature,
        options: &ExtractionOptions,
        anomalies: &mut Vec<RowAnomaly>,
    ) -> Result<Vec<ExtractedRow>> {
        let Some(table) = self.signature_table(doc, sig, anomalies)? else {
            return Ok(Vec::new());
        };

        let Some(name_col) = sig.column_map.coverage_name_index else {
            // No coverage-name column: standard extraction is skipped
            // entirely for this signature.
            return self.run_hybrid(doc, sig, table);
        };

        let empty_ratio = self.raw_empty_ratio(table, sig, name_col);
        if empty_ratio > self.heuristics.thresholds.hybrid_trigger_empty_ratio
            && !options.force_standard
        {
            log::info!(
                "page {} table {}: {:.0}% empty name cells, switching to hybrid",
                sig.page,
                sig.table_index,
                empty_ratio * 100.0
            );
            return self.run_hybrid(doc, sig, table);
        }

        Ok(self.extract_standard(table, sig, name_col, anomalies))
    }

    /// Variant signatures run hybrid-first, falling back to standard cells
    /// only when reconstruction yields nothing.
    fn extract_variant(
        &self,
        doc: &dyn DocumentSource,
        sig: &TableSignature,
        anomalies: &mut Vec<RowAnomaly>,
    ) -> Result<Vec<ExtractedRow>> {
        let Some(table) = self.signature_table(doc, sig, anomalies)? else {
            return Ok(Vec::new());
        };

        let rows = self.run_hybrid(doc, sig, table)?;
        if !rows.is_empty() {
            return Ok(rows);
        }
        match sig.column_map.coverage_name_index {
            Some(name_col) => Ok(self.extract_standard(table, sig, name_col, anomalies)),
            None => Ok(Vec::new()),
        }
    }

    fn signature_table<'d>(
        &self,
        doc: &'d dyn DocumentSource,
        sig: &TableSignature,
        anomalies: &mut Vec<RowAnomaly>,
    ) -> Result<Option<&'d TableGrid>> {
        let tables = doc.page_tables(sig.page)?;
        match tables.get(sig.table_index) {
            Some(table) => Ok(Some(table)),
            None => {
                anomalies.push(RowAnomaly {
                    page: sig.page,
                    table_index: sig.table_index,
                    row: None,
                    reason: format!(
                        "signature table missing ({} tables on page)",
                        tables.len()
                    ),
                });
                Ok(None)
            },
        }
    }

    /// Fraction of raw data rows whose coverage-name cell is blank.
    fn raw_empty_ratio(&self, table: &TableGrid, sig: &TableSignature, name_col: usize) -> f32 {
        let data_start = sig.header_row_index.map_or(0, |h| h + 1);
        let total = table.row_count().saturating_sub(data_start);
        if total == 0 {
            return 0.0;
        }
        let empty = (data_start..table.row_count())
            .filter(|&row| table.is_blank_cell(row, name_col))
            .count();
        empty as f32 / total as f32
    }

    /// Direct cell extraction with row filtering.
    fn extract_standard(
        &self,
        table: &TableGrid,
        sig: &TableSignature,
        name_col: usize,
        anomalies: &mut Vec<RowAnomaly>,
    ) -> Vec<ExtractedRow> {
        let data_start = sig.header_row_index.map_or(0, |h| h + 1);
        let rules = &sig.row_filter_rules;
        let mut rows = Vec::new();

        for row in data_start..table.row_count() {
            let cells = match table.rows.get(row) {
                Some(cells) => cells,
                None => continue,
            };
            if cells.len() < table.col_count() && cells.len() <= name_col {
                anomalies.push(RowAnomaly {
                    page: sig.page,
                    table_index: sig.table_index,
                    row: Some(row),
                    reason: format!(
                        "row has {} cells, name column is {}",
                        cells.len(),
                        name_col
                    ),
                });
                continue;
            }

            let name = table.cell_text(row, name_col).trim().to_string();
            let len = name.chars().count();
            if name.is_empty()
                || len < rules.min_name_len
                || len > rules.max_name_len
                || rules.totals_keywords.iter().any(|k| name.contains(k.as_str()))
                || rules
                    .disclaimer_keywords
                    .iter()
                    .any(|k| name.contains(k.as_str()))
                || self.heuristics.is_row_number_token(&name)
            {
                continue;
            }

            let cell_of = |idx: Option<usize>| -> Option<String> {
                idx.map(|c| table.cell_text(row, c).trim().to_string())
                    .filter(|t| !t.is_empty())
            };
            rows.push(ExtractedRow {
                name,
                amount: cell_of(sig.column_map.coverage_amount_index),
                premium: cell_of(sig.column_map.premium_index),
                period: cell_of(sig.column_map.period_index),
                evidence: Evidence {
                    page: sig.page,
                    row: Some(row),
                    y_range: None,
                },
            });
        }
        rows
    }

    fn run_hybrid(
        &self,
        doc: &dyn DocumentSource,
        sig: &TableSignature,
        table: &TableGrid,
    ) -> Result<Vec<ExtractedRow>> {
        let region = table.bbox.unwrap_or(FULL_PAGE);
        let reconstructed = hybrid::reconstruct_rows(doc, sig.page, &region, self.heuristics)?;
        Ok(reconstructed
            .into_iter()
            .map(|row| ExtractedRow {
                name: row.coverage_name,
                amount: row.amount_text,
                premium: row.premium_text,
                period: row.period_text,
                evidence: Evidence {
                    page: row.page,
                    row: None,
                    y_range: Some(row.y_range),
                },
            })
            .collect())
    }

    fn parity_report(
        &self,
        extracted: usize,
        fragments: usize,
        options: &ExtractionOptions,
        anomalies: Vec<RowAnomaly>,
    ) -> ParityReport {
        let t = &self.heuristics.thresholds;
        let (delta_ratio, status) = match options.baseline_count {
            Some(0) | None => (None, ParityStatus::Pass),
            Some(baseline) => {
                let delta = (extracted as f32 - baseline as f32) / baseline as f32;
                let status = if delta.abs() <= t.parity_warn_delta {
                    ParityStatus::Pass
                } else if delta.abs() <= t.parity_fail_delta {
                    ParityStatus::Warn
                } else {
                    ParityStatus::Fail
                };
                (Some(delta), status)
            },
        };
        ParityReport {
            extracted,
            fragments,
            baseline: options.baseline_count,
            delta_ratio,
            status,
            anomalies,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ProfileBuilder;
    use crate::document::{grid_from_rows, MemoryDocument, PageContent, TextFragment};

    const PAGE1: &str = "무배당 든든한 종합보험\n40세 남자 기준";

    fn summary_grid(data_rows: usize) -> TableGrid {
        let mut rows = vec![vec![
            Some("담보명"),
            Some("가입금액"),
            Some("보험료"),
            Some("보험기간"),
        ]];
        for i in 0..data_rows {
            rows.push(vec![
                Some(if i % 3 == 0 {
                    "암진단비(갱신형)"
                } else if i % 3 == 1 {
                    "뇌출혈진단비"
                } else {
                    "질병수술비(최초1회한)"
                }),
                Some("1,000만원"),
                Some("12,500"),
                Some("20년"),
            ]);
        }
        rows.push(vec![Some("합계"), None, Some("150,000"), None]);
        grid_from_rows(rows)
    }

    fn fixture(tables: Vec<TableGrid>) -> (MemoryDocument, tempfile::NamedTempFile) {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), b"fixture bytes").unwrap();
        let doc = MemoryDocument::new(
            tmp.path(),
            vec![
                PageContent {
                    text: PAGE1.to_string(),
                    ..Default::default()
                },
                PageContent {
                    tables,
                    ..Default::default()
                },
            ],
        );
        (doc, tmp)
    }

    fn heuristics() -> Heuristics {
        Heuristics::default()
    }

    #[test]
    fn test_standard_extraction_end_to_end() {
        let h = heuristics();
        let (doc, _tmp) = fixture(vec![summary_grid(12)]);
        let profile = ProfileBuilder::new(&h).build(&doc, "samsung", "m_40").unwrap();
        let outcome = Extractor::new(&h)
            .run(&doc, &profile, &ExtractionOptions::default())
            .unwrap();

        // Totals row filtered, all data rows kept
        assert_eq!(outcome.facts.len(), 12);
        assert!(outcome.fragment_facts.is_empty());
        assert_eq!(outcome.parity.status, ParityStatus::Pass);
        let fact = &outcome.facts[0];
        assert_eq!(fact.insurer_key, "samsung");
        assert_eq!(fact.variant.variant_key, "m_40");
        assert_eq!(
            fact.proposal_facts.coverage_amount_text.as_deref(),
            Some("1,000만원")
        );
        assert!(fact.proposal_facts.coverage_semantics.renewal_flag);
    }

    #[test]
    fn test_fingerprint_mismatch_is_fatal() {
        let h = heuristics();
        let (doc, tmp) = fixture(vec![summary_grid(12)]);
        let profile = ProfileBuilder::new(&h).build(&doc, "samsung", "m_40").unwrap();

        // The document changes after profiling
        std::fs::write(tmp.path(), b"different bytes").unwrap();
        let err = Extractor::new(&h)
            .run(&doc, &profile, &ExtractionOptions::default())
            .unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(format!("{}", err).contains("content_hash"));
    }

    #[test]
    fn test_missing_fingerprint_is_fatal() {
        let h = heuristics();
        let (doc, _tmp) = fixture(vec![summary_grid(12)]);
        let mut profile = ProfileBuilder::new(&h).build(&doc, "samsung", "m_40").unwrap();
        profile.pdf_fingerprint = None;

        let err = Extractor::new(&h)
            .run(&doc, &profile, &ExtractionOptions::default())
            .unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_hybrid_auto_trigger_on_empty_names() {
        let h = heuristics();
        // Raw grid: most coverage-name cells empty, values present; the
        // real text lives in positioned fragments.
        let mut rows = vec![vec![
            Some("담보명"),
            Some("가입금액"),
            Some("보험료"),
            Some("보험기간"),
        ]];
        for i in 0..12 {
            let name = if i < 2 { Some("암진단비") } else { None };
            rows.push(vec![name, Some("1,000만원"), Some("12,500"), Some("20년")]);
        }
        let mut table = grid_from_rows(rows);
        table.bbox = Some(Rect::new(0.0, 50.0, 600.0, 400.0));

        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), b"fixture bytes").unwrap();
        let fragments = vec![
            TextFragment {
                text: "암진단비".to_string(),
                bbox: Rect::new(10.0, 100.0, 60.0, 10.0),
            },
            TextFragment {
                text: "1,000만원 12,500 20년".to_string(),
                bbox: Rect::new(200.0, 100.5, 120.0, 10.0),
            },
            TextFragment {
                text: "뇌출혈진단비".to_string(),
                bbox: Rect::new(10.0, 130.0, 60.0, 10.0),
            },
            TextFragment {
                text: "2,000만원 9,800 100세만기".to_string(),
                bbox: Rect::new(200.0, 130.5, 120.0, 10.0),
            },
        ];
        let doc = MemoryDocument::new(
            tmp.path(),
            vec![
                PageContent {
                    text: PAGE1.to_string(),
                    ..Default::default()
                },
                PageContent {
                    tables: vec![table],
                    fragments,
                    ..Default::default()
                },
            ],
        );

        let profile = ProfileBuilder::new(&h).build(&doc, "samsung", "m_40").unwrap();
        assert_eq!(profile.summary_table.primary_signatures.len(), 1);

        let outcome = Extractor::new(&h)
            .run(&doc, &profile, &ExtractionOptions::default())
            .unwrap();
        // Hybrid reconstruction produced the rows, with y-range evidence
        assert_eq!(outcome.facts.len(), 2);
        assert_eq!(outcome.facts[0].coverage_name_raw, "암진단비");
        assert!(outcome.facts[0].proposal_facts.evidences[0].y_range.is_some());

        // The override flag keeps standard extraction
        let forced = Extractor::new(&h)
            .run(
                &doc,
                &profile,
                &ExtractionOptions {
                    force_standard: true,
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(forced.facts.len(), 2);
        assert!(forced.facts[0].proposal_facts.evidences[0].y_range.is_none());
    }

    #[test]
    fn test_fragment_rows_routed_separately() {
        let h = heuristics();
        let mut grid = summary_grid(11);
        // One row is a mis-split remnant
        grid.rows.insert(
            5,
            vec![
                Some("최초1회한".to_string()),
                Some("1,000만원".to_string()),
                None,
                None,
            ],
        );
        let (doc, _tmp) = fixture(vec![grid]);
        let profile = ProfileBuilder::new(&h).build(&doc, "samsung", "m_40").unwrap();
        let outcome = Extractor::new(&h)
            .run(&doc, &profile, &ExtractionOptions::default())
            .unwrap();

        assert_eq!(outcome.facts.len(), 11);
        assert_eq!(outcome.fragment_facts.len(), 1);
        assert!(outcome.fragment_facts[0]
            .proposal_facts
            .coverage_semantics
            .fragment_detected);
        assert!(!outcome
            .facts
            .iter()
            .any(|f| f.coverage_name_raw == "최초1회한"));
    }

    #[test]
    fn test_parity_tiers() {
        let h = heuristics();
        let (doc, _tmp) = fixture(vec![summary_grid(12)]);
        let profile = ProfileBuilder::new(&h).build(&doc, "samsung", "m_40").unwrap();
        let extractor = Extractor::new(&h);

        let run = |baseline| {
            extractor
                .run(
                    &doc,
                    &profile,
                    &ExtractionOptions {
                        baseline_count: Some(baseline),
                        ..Default::default()
                    },
                )
                .unwrap()
                .parity
        };
        assert_eq!(run(12).status, ParityStatus::Pass);
        assert_eq!(run(14).status, ParityStatus::Warn);
        assert_eq!(run(30).status, ParityStatus::Fail);
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let h = heuristics();
        let (doc, _tmp) = fixture(vec![summary_grid(12)]);
        let profile = ProfileBuilder::new(&h).build(&doc, "samsung", "m_40").unwrap();
        let extractor = Extractor::new(&h);

        let dir = tempfile::tempdir().unwrap();
        let main_a = dir.path().join("a.jsonl");
        let frag_a = dir.path().join("a.frag.jsonl");
        let main_b = dir.path().join("b.jsonl");
        let frag_b = dir.path().join("b.frag.jsonl");
        extractor
            .run_to_files(&doc, &profile, &ExtractionOptions::default(), &main_a, &frag_a)
            .unwrap();
        extractor
            .run_to_files(&doc, &profile, &ExtractionOptions::default(), &main_b, &frag_b)
            .unwrap();

        assert_eq!(
            std::fs::read(&main_a).unwrap(),
            std::fs::read(&main_b).unwrap()
        );
        assert_eq!(
            std::fs::read(&frag_a).unwrap(),
            std::fs::read(&frag_b).unwrap()
        );
    }
}
