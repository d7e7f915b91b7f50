//! Benefit-description ("detail fact") extraction.
//!
//! Issuers lay out benefit descriptions in a handful of recurring shapes.
//! Which shape a document uses is a declared configuration value on the
//! profile — never inferred ad hoc at call time — and each shape has its
//! own walker here. Every extracted description is capped at a sentence
//! boundary, and the summary-embedded variants additionally cut at the
//! first numeric fact so amounts never bleed into free text.

use serde::{Deserialize, Serialize};

use crate::document::{DocumentSource, TableGrid};
use crate::error::Result;
use crate::facts::Evidence;
use crate::heuristics::{Heuristics, AMOUNT_RE, PERIOD_RE, PREMIUM_RE};

/// Detail layout shapes, declared per profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetailLayout {
    /// Distinct coverage-name and description columns
    ExplicitColumns,
    /// Name and description share one cell, separated by a newline
    MergedInlineSplit,
    /// Name row followed by a description row in the same column
    MergedMultiRow,
    /// No table structure; numbered coverage lines in page text
    TextLayout,
    /// Description lives in page text outside the table, keyed by index
    SummaryEmbedded,
    /// Alternating label/description table rows
    SummaryEmbeddedSplit,
}

/// Profile-declared detail structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailStructure {
    /// Layout shape to walk
    #[serde(rename = "type")]
    pub layout: DetailLayout,
    /// Pages to scan; all pages when absent
    #[serde(default)]
    pub pages: Option<Vec<usize>>,
}

/// One extracted benefit description, matched to summary facts later by
/// normalized name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailFact {
    /// Coverage name as written in the detail region
    pub coverage_name_raw: String,
    /// Benefit description text, truncated at a sentence boundary
    pub benefit_description_text: String,
    /// Page the description came from
    pub detail_page: usize,
    /// Row or index hint within the detail region
    pub detail_row_hint: Option<usize>,
    /// Traceability references
    pub evidences: Vec<Evidence>,
}

/// Walks the declared detail layout over a document.
pub struct DetailExtractor<'h> {
    heuristics: &'h Heuristics,
}

impl<'h> DetailExtractor<'h> {
    /// Create an extractor over the given heuristics service.
    pub fn new(heuristics: &'h Heuristics) -> Self {
        Self { heuristics }
    }

    /// Extract detail facts according to the declared structure.
    pub fn extract(
        &self,
        doc: &dyn DocumentSource,
        structure: &DetailStructure,
    ) -> Result<Vec<DetailFact>> {
        let pages: Vec<usize> = match &structure.pages {
            Some(pages) => pages.clone(),
            None => (1..=doc.page_count()).collect(),
        };

        let mut facts = Vec::new();
        for page in pages {
            match structure.layout {
                DetailLayout::ExplicitColumns => {
                    self.walk_explicit_columns(doc, page, &mut facts)?;
                },
                DetailLayout::MergedInlineSplit => {
                    self.walk_merged_inline(doc, page, &mut facts)?;
                },
                DetailLayout::MergedMultiRow => {
                    self.walk_merged_multi_row(doc, page, &mut facts)?;
                },
                DetailLayout::TextLayout => {
                    self.walk_text_layout(doc, page, &mut facts)?;
                },
                DetailLayout::SummaryEmbedded => {
                    self.walk_summary_embedded(doc, page, &mut facts)?;
                },
                DetailLayout::SummaryEmbeddedSplit => {
                    self.walk_summary_embedded_split(doc, page, &mut facts)?;
                },
            }
        }
        Ok(facts)
    }

    /// Header row has distinct name and description columns.
    fn walk_explicit_columns(
        &self,
        doc: &dyn DocumentSource,
        page: usize,
        facts: &mut Vec<DetailFact>,
    ) -> Result<()> {
        for table in doc.page_tables(page)? {
            let Some((header_row, name_col, desc_col)) = self.find_detail_columns(table) else {
                continue;
            };
            for row in (header_row + 1)..table.row_count() {
                let name = table.cell_text(row, name_col).trim();
                let desc = table.cell_text(row, desc_col).trim();
                if name.is_empty() || desc.is_empty() {
                    continue;
                }
                facts.push(self.fact(name, desc, page, Some(row), false));
            }
        }
        Ok(())
    }

    /// Name and description share one cell, split at the first newline.
    fn walk_merged_inline(
        &self,
        doc: &dyn DocumentSource,
        page: usize,
        facts: &mut Vec<DetailFact>,
    ) -> Result<()> {
        for table in doc.page_tables(page)? {
            let Some((header_row, name_col)) = self.find_name_column(table) else {
                continue;
            };
            for row in (header_row + 1)..table.row_count() {
                let cell = table.cell_text(row, name_col);
                let Some((name, desc)) = cell.split_once('\n') else {
                    continue;
                };
                let (name, desc) = (name.trim(), desc.trim());
                if name.is_empty() || desc.is_empty() {
                    continue;
                }
                facts.push(self.fact(name, desc, page, Some(row), false));
            }
        }
        Ok(())
    }

    /// Name occupies one row, the next row's same column holds the text.
    fn walk_merged_multi_row(
        &self,
        doc: &dyn DocumentSource,
        page: usize,
        facts: &mut Vec<DetailFact>,
    ) -> Result<()> {
        for table in doc.page_tables(page)? {
            let Some((header_row, name_col)) = self.find_name_column(table) else {
                continue;
            };
            let mut row = header_row + 1;
            while row + 1 < table.row_count() {
                let name = table.cell_text(row, name_col).trim();
                let next = table.cell_text(row + 1, name_col).trim();
                if name.is_empty() || next.is_empty() {
                    row += 1;
                    continue;
                }
                // The follow-up row must be prose, not another label or an
                // exclusion-section header.
                if self.is_exclusion_header(next) || self.heuristics.is_disclaimer_text(next) {
                    row += 2;
                    continue;
                }
                facts.push(self.fact(name, next, page, Some(row), false));
                row += 2;
            }
        }
        Ok(())
    }

    /// No table at all: numbered coverage lines with description runs.
    fn walk_text_layout(
        &self,
        doc: &dyn DocumentSource,
        page: usize,
        facts: &mut Vec<DetailFact>,
    ) -> Result<()> {
        let text = doc.page_text(page)?;
        let lines: Vec<&str> = text.lines().collect();

        let mut i = 0;
        while i < lines.len() {
            let line = lines[i].trim();
            if !self.heuristics.is_coverage_line(line) {
                i += 1;
                continue;
            }
            let name = self.coverage_line_name(line);
            let hint = Some(i);
            let mut description = Vec::new();

            let mut j = i + 1;
            while j < lines.len() {
                let next = lines[j].trim();
                if next.is_empty() {
                    j += 1;
                    continue;
                }
                // Payment/term-only lines are skipped, not accumulated —
                // checked before the coverage-line test, which a bare
                // amount+term line would otherwise satisfy.
                if self.is_value_only_line(next) {
                    j += 1;
                    continue;
                }
                if self.heuristics.is_coverage_line(next)
                    || self.is_exclusion_header(next)
                    || self.is_footer(next)
                {
                    break;
                }
                description.push(next);
                j += 1;
            }

            if !name.is_empty() && !description.is_empty() {
                let desc = description.join(" ");
                facts.push(self.fact(&name, &desc, page, hint, false));
            }
            i = j.max(i + 1);
        }
        Ok(())
    }

    /// Page-text blocks keyed by a leading numeric coverage index.
    fn walk_summary_embedded(
        &self,
        doc: &dyn DocumentSource,
        page: usize,
        facts: &mut Vec<DetailFact>,
    ) -> Result<()> {
        let text = doc.page_text(page)?;
        let lines: Vec<&str> = text.lines().collect();

        let mut i = 0;
        while i < lines.len() {
            let line = lines[i].trim();
            let Some((index, name)) = split_indexed_line(line) else {
                i += 1;
                continue;
            };
            let mut description = Vec::new();
            let mut j = i + 1;
            while j < lines.len() {
                let next = lines[j].trim();
                if next.is_empty() || split_indexed_line(next).is_some() || self.is_footer(next) {
                    break;
                }
                description.push(next);
                j += 1;
            }
            if !name.is_empty() && !description.is_empty() {
                let desc = description.join(" ");
                facts.push(self.fact(&name, &desc, page, Some(index), true));
            }
            i = j.max(i + 1);
        }
        Ok(())
    }

    /// Alternating label/description table rows.
    fn walk_summary_embedded_split(
        &self,
        doc: &dyn DocumentSource,
        page: usize,
        facts: &mut Vec<DetailFact>,
    ) -> Result<()> {
        for table in doc.page_tables(page)? {
            let mut row = 0;
            while row + 1 < table.row_count() {
                let label = table.cell_text(row, 0).trim();
                let desc = table.cell_text(row + 1, 0).trim();
                if label.is_empty() || desc.is_empty() || !self.heuristics.is_korean_text(label) {
                    row += 1;
                    continue;
                }
                facts.push(self.fact(label, desc, page, Some(row), true));
                row += 2;
            }
        }
        Ok(())
    }

    /// Assemble a fact, applying cleanup and the truncation cap.
    fn fact(
        &self,
        name: &str,
        description: &str,
        page: usize,
        row_hint: Option<usize>,
        numeric_cleanup: bool,
    ) -> DetailFact {
        let cleaned = if numeric_cleanup {
            cut_at_numeric_fact(description, self.heuristics)
        } else {
            description.to_string()
        };
        let truncated =
            truncate_at_sentence(&cleaned, self.heuristics.thresholds.detail_max_chars);
        DetailFact {
            coverage_name_raw: name.to_string(),
            benefit_description_text: truncated,
            detail_page: page,
            detail_row_hint: row_hint,
            evidences: vec![Evidence {
                page,
                row: row_hint,
                y_range: None,
            }],
        }
    }

    /// Locate (header row, name column) in a detail table.
    fn find_name_column(&self, table: &TableGrid) -> Option<(usize, usize)> {
        for row in 0..table.row_count().min(3) {
            for col in 0..table.col_count() {
                if self.heuristics.is_coverage_header(table.cell_text(row, col)) {
                    return Some((row, col));
                }
            }
        }
        None
    }

    /// Locate (header row, name column, description column) in a detail
    /// table. Applies the offset correction when both keyword matches
    /// collide on the same header cell.
    fn find_detail_columns(&self, table: &TableGrid) -> Option<(usize, usize, usize)> {
        let (row, name) = self.find_name_column(table)?;
        let mut desc_col = None;
        for col in 0..table.col_count() {
            if self.heuristics.is_disqualifying_header(table.cell_text(row, col)) {
                desc_col = Some(col);
                break;
            }
        }
        let desc = match desc_col {
            // Both keywords landed on the same merged header cell: the
            // description text actually sits one column over.
            Some(d) if d == name => name + 1,
            Some(d) => d,
            None => name + 1,
        };
        if desc < table.col_count() {
            Some((row, name, desc))
        } else {
            None
        }
    }

    fn coverage_line_name(&self, line: &str) -> String {
        let stripped = self.heuristics.strip_enumeration(line);
        // Cut at the first figure so "암진단비 1,000만원 20년" keeps the name
        let cut = AMOUNT_RE
            .find(stripped)
            .map(|m| m.start())
            .unwrap_or(stripped.len());
        stripped[..cut].trim().to_string()
    }

    /// Line that carries only payment/term values.
    fn is_value_only_line(&self, line: &str) -> bool {
        if !self.heuristics.has_amount_pattern(line)
            && !self.heuristics.has_premium_pattern(line)
            && !self.heuristics.has_period_pattern(line)
        {
            return false;
        }
        let mut residue = AMOUNT_RE.replace_all(line, "").to_string();
        residue = PREMIUM_RE.replace_all(&residue, "").to_string();
        residue = PERIOD_RE.replace_all(&residue, "").to_string();
        residue
            .chars()
            .all(|c| !c.is_alphanumeric() || c.is_ascii_digit())
    }

    fn is_exclusion_header(&self, line: &str) -> bool {
        self.heuristics
            .lexicon
            .exclusion_section_markers
            .iter()
            .any(|m| line.contains(m.as_str()))
    }

    fn is_footer(&self, line: &str) -> bool {
        self.heuristics
            .lexicon
            .footer_markers
            .iter()
            .any(|m| line.contains(m.as_str()))
    }
}

/// Split "N. rest" into (N, rest).
fn split_indexed_line(line: &str) -> Option<(usize, String)> {
    let (num, rest) = line.split_once(['.', ')'])?;
    let index: usize = num.trim().parse().ok()?;
    let rest = rest.trim();
    if rest.is_empty() {
        None
    } else {
        Some((index, rest.to_string()))
    }
}

/// Cut a description before the earliest amount/premium/term/limit-hint
/// pattern so numeric facts never bleed into free text.
pub fn cut_at_numeric_fact(text: &str, heuristics: &Heuristics) -> String {
    let mut cut = text.len();
    for re in [&*AMOUNT_RE, &*PREMIUM_RE, &*PERIOD_RE] {
        if let Some(m) = re.find(text) {
            cut = cut.min(m.start());
        }
    }
    for hint in &heuristics.lexicon.limit_hints {
        if let Some(pos) = text.find(hint.as_str()) {
            cut = cut.min(pos);
        }
    }
    text[..cut].trim().to_string()
}

/// Truncate to at most `max_chars`, cutting at the nearest preceding
/// sentence boundary, falling back to the last whitespace. Never cuts
/// mid-sentence past the cap and never exceeds it.
pub fn truncate_at_sentence(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let prefix: String = text.chars().take(max_chars).collect();

    let sentence_end = prefix
        .char_indices()
        .filter(|(_, c)| matches!(c, '.' | '!' | '?' | '。'))
        .map(|(i, c)| i + c.len_utf8())
        .last();
    if let Some(end) = sentence_end {
        return prefix[..end].trim().to_string();
    }

    match prefix.rfind(char::is_whitespace) {
        Some(ws) => prefix[..ws].trim().to_string(),
        None => prefix,
    }
}
