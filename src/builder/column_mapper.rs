//! Column-to-field mapping inference.
//!
//! Works from sampled cell statistics only: no issuer templates, no
//! positional assumptions beyond "row numbers live in column 0". The
//! inference order matters — structural exclusions first (row-number and
//! category columns), then header keywords, then content scoring as the
//! fallback — because a category column can carry a coverage keyword in its
//! header and must still never win the name slot.

use crate::document::TableGrid;
use crate::heuristics::{Heuristics, AMOUNT_RE, PERIOD_RE, PREMIUM_RE, ROW_NUMBER_RE};
use crate::profile::{ColumnMap, MappingMethod};

/// Sampled statistics for one column over the data rows.
#[derive(Debug, Clone, Default)]
pub struct ColumnStats {
    /// Rows sampled
    pub sampled: usize,
    /// Non-empty cells among the sample
    pub non_empty: usize,
    /// Distinct non-empty values / sampled rows
    pub unique_ratio: f32,
    /// Average character length of non-empty values
    pub avg_non_empty_len: f32,
    /// Category-keyword matches / non-empty values
    pub category_keyword_ratio: f32,
    /// Korean-text cells / sampled rows
    pub korean_ratio: f32,
    /// Pure-integer cells / sampled rows
    pub integer_ratio: f32,
    /// Numeric-pattern cells (amount, premium or bare figure) / sampled rows
    pub numeric_ratio: f32,
    /// Amount-pattern cells / sampled rows
    pub amount_ratio: f32,
    /// Premium-pattern cells / sampled rows
    pub premium_ratio: f32,
    /// Period-pattern cells / sampled rows
    pub period_ratio: f32,
}

impl ColumnStats {
    /// Fraction of sampled cells that are empty.
    pub fn empty_ratio(&self) -> f32 {
        if self.sampled == 0 {
            0.0
        } else {
            (self.sampled - self.non_empty) as f32 / self.sampled as f32
        }
    }
}

/// Compute stats for every column over up to `sample_rows` data rows.
pub fn sample_columns(
    table: &TableGrid,
    data_start: usize,
    sample_rows: usize,
    heuristics: &Heuristics,
) -> Vec<ColumnStats> {
    let cols = table.col_count();
    let end = table.row_count().min(data_start + sample_rows);
    let mut stats = vec![ColumnStats::default(); cols];

    for (col, stat) in stats.iter_mut().enumerate() {
        let mut values: Vec<String> = Vec::new();
        let mut korean = 0usize;
        let mut integers = 0usize;
        let mut numeric = 0usize;
        let mut amounts = 0usize;
        let mut premiums = 0usize;
        let mut periods = 0usize;
        let mut sampled = 0usize;

        for row in data_start..end {
            sampled += 1;
            if table.is_blank_cell(row, col) {
                continue;
            }
            let text = table.cell_text(row, col).trim().to_string();
            if heuristics.is_korean_text(&text) {
                korean += 1;
            }
            if ROW_NUMBER_RE.is_match(&text) {
                integers += 1;
            }
            if AMOUNT_RE.is_match(&text) {
                amounts += 1;
            }
            if PREMIUM_RE.is_match(&text) {
                premiums += 1;
            }
            if PERIOD_RE.is_match(&text) {
                periods += 1;
            }
            if AMOUNT_RE.is_match(&text)
                || PREMIUM_RE.is_match(&text)
                || ROW_NUMBER_RE.is_match(&text)
            {
                numeric += 1;
            }
            values.push(text);
        }

        let non_empty = values.len();
        let keyword_matches = values
            .iter()
            .filter(|v| heuristics.is_category_token(v))
            .count();
        let total_len: usize = values.iter().map(|v| v.chars().count()).sum();
        let mut distinct = values.clone();
        distinct.sort();
        distinct.dedup();

        stat.sampled = sampled;
        stat.non_empty = non_empty;
        stat.unique_ratio = if sampled == 0 {
            0.0
        } else {
            distinct.len() as f32 / sampled as f32
        };
        stat.avg_non_empty_len = if non_empty == 0 {
            0.0
        } else {
            total_len as f32 / non_empty as f32
        };
        stat.category_keyword_ratio = if non_empty == 0 {
            0.0
        } else {
            keyword_matches as f32 / non_empty as f32
        };
        stat.korean_ratio = ratio(korean, sampled);
        stat.integer_ratio = ratio(integers, sampled);
        stat.numeric_ratio = ratio(numeric, sampled);
        stat.amount_ratio = ratio(amounts, sampled);
        stat.premium_ratio = ratio(premiums, sampled);
        stat.period_ratio = ratio(periods, sampled);
    }

    stats
}

fn ratio(count: usize, total: usize) -> f32 {
    if total == 0 {
        0.0
    } else {
        count as f32 / total as f32
    }
}

/// Column 0 holds row numbers when most of its sampled values are pure
/// integers.
pub fn detect_row_number_column(stats: &[ColumnStats], heuristics: &Heuristics) -> Option<usize> {
    let first = stats.first()?;
    if first.integer_ratio > heuristics.thresholds.row_number_min_ratio {
        Some(0)
    } else {
        None
    }
}

/// Columns meeting all four category criteria: sparse, low-diversity,
/// short, keyword-dominated.
pub fn detect_category_columns(stats: &[ColumnStats], heuristics: &Heuristics) -> Vec<usize> {
    let t = &heuristics.thresholds;
    stats
        .iter()
        .enumerate()
        .filter(|(_, s)| {
            s.non_empty > 0
                && s.empty_ratio() > t.category_empty_min_ratio
                && s.unique_ratio < t.category_unique_max_ratio
                && s.avg_non_empty_len < t.category_avg_len_max
                && s.category_keyword_ratio > t.category_keyword_min_ratio
        })
        .map(|(i, _)| i)
        .collect()
}

/// Content score for a candidate coverage-name column.
///
/// Weighted blend of Korean-text ratio (counted only above the configured
/// floor), normalized average length, and inverse numeric-pattern ratio.
pub fn name_content_score(stats: &ColumnStats, heuristics: &Heuristics) -> f32 {
    let korean = if stats.korean_ratio > heuristics.thresholds.content_korean_min_ratio {
        stats.korean_ratio
    } else {
        0.0
    };
    let length = (stats.avg_non_empty_len / 20.0).min(1.0);
    let non_numeric = 1.0 - stats.numeric_ratio;
    0.5 * korean + 0.3 * length + 0.2 * non_numeric
}

/// Infer the mapping for a Pass-A candidate from its header row plus
/// content fallback.
pub fn infer_header_mapping(
    table: &TableGrid,
    header_row_index: usize,
    heuristics: &Heuristics,
) -> ColumnMap {
    let data_start = header_row_index + 1;
    let stats = sample_columns(
        table,
        data_start,
        heuristics.thresholds.mapping_sample_rows,
        heuristics,
    );
    let row_number = detect_row_number_column(&stats, heuristics);
    let category_cols = detect_category_columns(&stats, heuristics);

    let excluded =
        |col: usize| -> bool { row_number == Some(col) || category_cols.contains(&col) };

    let cols = table.col_count();
    let header_text =
        |col: usize| -> String { table.cell_text(header_row_index, col).trim().to_string() };

    let mut name = None;
    let mut amount = None;
    let mut premium = None;
    let mut period = None;

    for col in 0..cols {
        let header = header_text(col);
        if header.is_empty() {
            continue;
        }
        if name.is_none() && !excluded(col) && heuristics.is_coverage_header(&header) {
            name = Some(col);
            continue;
        }
        if amount.is_none() && heuristics.is_amount_header(&header) {
            amount = Some(col);
            continue;
        }
        if premium.is_none() && heuristics.is_premium_header(&header) {
            premium = Some(col);
            continue;
        }
        if period.is_none() && heuristics.is_period_header(&header) {
            period = Some(col);
        }
    }

    let mut method = MappingMethod::Header;
    if name.is_none() {
        // No header keyword yielded a name column: fall back to content.
        let mut best: Option<(usize, f32)> = None;
        for (col, stat) in stats.iter().enumerate() {
            if excluded(col) || Some(col) == amount || Some(col) == premium || Some(col) == period
            {
                continue;
            }
            let score = name_content_score(stat, heuristics);
            // Strictly-greater keeps the left-most column on ties
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((col, score));
            }
        }
        if let Some((col, score)) = best {
            if score >= heuristics.thresholds.content_score_min {
                name = Some(col);
                method = MappingMethod::Content;
                log::debug!("content fallback chose column {} (score {:.2})", col, score);
            }
        }
    }

    ColumnMap {
        has_row_number_column: row_number.is_some(),
        row_number_column_index: row_number,
        coverage_name_index: name,
        coverage_amount_index: amount,
        premium_index: premium,
        period_index: period,
        mapping_method: method,
        mapping_confidence: 1.0,
    }
}

/// Infer the mapping for a Pass-B signature from content patterns alone.
///
/// Each of the four fields resolves independently; unresolved fields stay
/// `None` and lower the confidence rather than failing the signature.
pub fn infer_pattern_mapping(table: &TableGrid, heuristics: &Heuristics) -> ColumnMap {
    let stats = sample_columns(
        table,
        0,
        heuristics.thresholds.pass_b_sample_rows,
        heuristics,
    );
    let row_number = detect_row_number_column(&stats, heuristics);
    let category_cols = detect_category_columns(&stats, heuristics);
    let excluded =
        |col: usize| -> bool { row_number == Some(col) || category_cols.contains(&col) };

    let name = best_column(&stats, heuristics.thresholds.content_score_min, |col, s| {
        if excluded(col) {
            None
        } else {
            Some(name_content_score(s, heuristics))
        }
    });
    let amount = best_column(&stats, heuristics.thresholds.pass_b_amount_min_ratio, |col, s| {
        if excluded(col) || Some(col) == name {
            None
        } else {
            Some(s.amount_ratio)
        }
    });
    let premium = best_column(&stats, heuristics.thresholds.pass_b_value_min_ratio, |col, s| {
        if excluded(col) || Some(col) == name || Some(col) == amount {
            None
        } else {
            // A premium column is thousands-separated figures that do not
            // read as unit amounts
            Some(s.premium_ratio - s.amount_ratio)
        }
    });
    let period = best_column(&stats, heuristics.thresholds.pass_b_value_min_ratio, |col, s| {
        if excluded(col) || Some(col) == name || Some(col) == amount || Some(col) == premium {
            None
        } else {
            Some(s.period_ratio)
        }
    });

    let resolved = [name, amount, premium, period]
        .iter()
        .filter(|f| f.is_some())
        .count();

    ColumnMap {
        has_row_number_column: row_number.is_some(),
        row_number_column_index: row_number,
        coverage_name_index: name,
        coverage_amount_index: amount,
        premium_index: premium,
        period_index: period,
        mapping_method: MappingMethod::PatternB,
        mapping_confidence: resolved as f32 / 4.0,
    }
}

/// Highest-scoring column at or above `min_score`, left-most on ties.
fn best_column<F>(stats: &[ColumnStats], min_score: f32, score: F) -> Option<usize>
where
    F: Fn(usize, &ColumnStats) -> Option<f32>,
{
    let mut best: Option<(usize, f32)> = None;
    for (col, stat) in stats.iter().enumerate() {
        if let Some(s) = score(col, stat) {
            if best.map_or(true, |(_, b)| s > b) {
                best = Some((col, s));
            }
        }
    }
    best.filter(|(_, s)| *s >= min_score).map(|(col, _)| col)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::grid_from_rows;

    fn header_table() -> TableGrid {
        let mut rows = vec![vec![
            Some("담보명"),
            Some("가입금액"),
            Some("보험료"),
            Some("보험기간"),
        ]];
        for i in 0..12 {
            rows.push(vec![
                Some(if i % 2 == 0 { "암진단비" } else { "뇌출혈진단비" }),
                Some("1,000만원"),
                Some("12,500"),
                Some("20년"),
            ]);
        }
        grid_from_rows(rows)
    }

    #[test]
    fn test_header_keyword_mapping() {
        let h = Heuristics::default();
        let map = infer_header_mapping(&header_table(), 0, &h);
        assert_eq!(map.coverage_name_index, Some(0));
        assert_eq!(map.coverage_amount_index, Some(1));
        assert_eq!(map.premium_index, Some(2));
        assert_eq!(map.period_index, Some(3));
        assert_eq!(map.mapping_method, MappingMethod::Header);
        assert!(!map.has_row_number_column);
    }

    #[test]
    fn test_row_number_column_shifts_name() {
        let h = Heuristics::default();
        let mut rows: Vec<Vec<Option<String>>> = vec![
            ["번호", "담보명", "가입금액", "보험료"]
                .iter()
                .map(|s| Some(s.to_string()))
                .collect(),
        ];
        for i in 0..12 {
            rows.push(vec![
                Some((i + 1).to_string()),
                Some("암진단비".to_string()),
                Some("1,000만원".to_string()),
                Some("12,500".to_string()),
            ]);
        }
        let table = TableGrid { bbox: None, rows };
        let map = infer_header_mapping(&table, 0, &h);
        assert!(map.has_row_number_column);
        assert_eq!(map.row_number_column_index, Some(0));
        assert_eq!(map.coverage_name_index, Some(1));
        assert_ne!(map.coverage_name_index, map.row_number_column_index);
    }

    #[test]
    fn test_category_column_never_wins_name() {
        let h = Heuristics::default();
        // Column 0: sparse category labels (merged-cell artifact), with a
        // coverage keyword in its header; column 1: the real names.
        let mut rows = vec![vec![
            Some("담보구분"),
            Some("보장명"),
            Some("가입금액"),
            Some("보험료"),
        ]];
        for i in 0..10 {
            let cat = match i {
                0 => Some("기본계약"),
                4 => Some("진단"),
                7 => Some("진단"),
                _ => None,
            };
            rows.push(vec![cat, Some("암진단비"), Some("1,000만원"), Some("12,500")]);
        }
        let table = grid_from_rows(rows);
        let stats = sample_columns(&table, 1, 10, &h);
        assert_eq!(detect_category_columns(&stats, &h), vec![0]);

        let map = infer_header_mapping(&table, 0, &h);
        assert_eq!(map.coverage_name_index, Some(1));
    }

    #[test]
    fn test_content_fallback_when_headers_unusable() {
        let h = Heuristics::default();
        // Headers carry no recognizable keywords at all.
        let mut rows = vec![vec![Some("A"), Some("B"), Some("C")]];
        for _ in 0..10 {
            rows.push(vec![
                Some("질병후유장해보장"),
                Some("3,000만원"),
                Some("15,000"),
            ]);
        }
        let map = infer_header_mapping(&grid_from_rows(rows), 0, &h);
        assert_eq!(map.coverage_name_index, Some(0));
        assert_eq!(map.mapping_method, MappingMethod::Content);
    }

    #[test]
    fn test_pattern_mapping_confidence() {
        let h = Heuristics::default();
        let mut rows = Vec::new();
        for _ in 0..10 {
            rows.push(vec![
                Some("상해수술비보장"),
                Some("500만원"),
                Some("8,200"),
                Some("100세만기"),
            ]);
        }
        let map = infer_pattern_mapping(&grid_from_rows(rows), &h);
        assert_eq!(map.mapping_method, MappingMethod::PatternB);
        assert_eq!(map.coverage_name_index, Some(0));
        assert_eq!(map.coverage_amount_index, Some(1));
        assert_eq!(map.period_index, Some(3));
        assert!(map.mapping_confidence >= 0.75);
    }

    #[test]
    fn test_pattern_mapping_degrades_to_null() {
        let h = Heuristics::default();
        // No period column anywhere: the field stays None, the signature
        // survives with reduced confidence.
        let mut rows = Vec::new();
        for _ in 0..10 {
            rows.push(vec![Some("상해수술비보장"), Some("500만원"), Some("8,200")]);
        }
        let map = infer_pattern_mapping(&grid_from_rows(rows), &h);
        assert_eq!(map.period_index, None);
        assert!(map.mapping_confidence <= 0.75);
    }
}
