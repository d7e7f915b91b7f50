//! Hybrid layout reconstruction from positioned text fragments.
//!
//! Some issuers render coverage-row text outside the actual table cell
//! boundaries, so direct cell extraction returns a sparsely populated grid.
//! This module rebuilds rows from the positioned fragments inside the table
//! region instead: fragments are clustered into horizontal bands by
//! vertical proximity, each band is split into one value fragment and the
//! name fragments around it, and the value fragment is parsed positionally
//! as `[seq]? name amount premium period`.

use lazy_static::lazy_static;
use regex::Regex;

use crate::document::{DocumentSource, TextFragment};
use crate::error::Result;
use crate::geometry::Rect;
use crate::heuristics::{Heuristics, AMOUNT_RE};

lazy_static! {
    /// Positional shape of a value fragment:
    /// optional sequence number, name remnant, amount, premium figure,
    /// trailing period text.
    static ref HYBRID_ROW_RE: Regex = Regex::new(
        r"^(?:(\d{1,3})\s+)?(.*?)\s*((?:\d{1,3}(?:,\d{3})+|\d+)\s*(?:억|천만|백만|십만|만)?\s*원)\s*(\d{1,3}(?:,\d{3})+)?\s*원?\s*(.*)$"
    )
    .unwrap();
}

/// One row rebuilt from positioned fragments.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconstructedRow {
    /// Leading sequence number parsed from the value fragment
    pub sequence: Option<u32>,
    /// Coverage-name candidate (name fragments + value-fragment remnant)
    pub coverage_name: String,
    /// Amount text as written
    pub amount_text: Option<String>,
    /// Premium text as written
    pub premium_text: Option<String>,
    /// Trailing period/term text as written
    pub period_text: Option<String>,
    /// Source page
    pub page: usize,
    /// Vertical extent of the merged band (top, bottom)
    pub y_range: (f32, f32),
}

/// Rebuild coverage rows from the fragments inside `region`.
///
/// Rows come back sorted top-to-bottom, each carrying its page and band
/// y-range as evidence.
pub fn reconstruct_rows(
    doc: &dyn DocumentSource,
    page: usize,
    region: &Rect,
    heuristics: &Heuristics,
) -> Result<Vec<ReconstructedRow>> {
    let fragments = doc.text_fragments(page, region)?;
    let bands = cluster_into_bands(&fragments, heuristics.thresholds.band_tolerance);

    let mut rows = Vec::new();
    for band in bands {
        if let Some(row) = reconstruct_band(&fragments, &band, page, heuristics) {
            rows.push(row);
        }
    }
    rows.sort_by(|a, b| crate::utils::safe_float_cmp(a.y_range.0, b.y_range.0));
    Ok(rows)
}

/// Cluster fragment indices into horizontal bands by top-edge proximity.
///
/// BFS over the tolerance relation: a fragment joins a band when its top
/// edge is within `tolerance` of any fragment already in the band. Bands
/// are returned top-to-bottom, fragments within a band left-to-right.
pub fn cluster_into_bands(fragments: &[TextFragment], tolerance: f32) -> Vec<Vec<usize>> {
    if fragments.is_empty() {
        return vec![];
    }

    let mut assigned = vec![false; fragments.len()];
    let mut bands: Vec<Vec<usize>> = vec![];

    for i in 0..fragments.len() {
        if assigned[i] {
            continue;
        }

        let mut band = vec![i];
        assigned[i] = true;

        let mut j = 0;
        while j < band.len() {
            let current_top = fragments[band[j]].bbox.top();
            for k in 0..fragments.len() {
                if assigned[k] {
                    continue;
                }
                if (fragments[k].bbox.top() - current_top).abs() <= tolerance {
                    band.push(k);
                    assigned[k] = true;
                }
            }
            j += 1;
        }

        // Left-to-right within the band
        band.sort_by(|&a, &b| {
            crate::utils::safe_float_cmp(fragments[a].bbox.left(), fragments[b].bbox.left())
        });
        bands.push(band);
    }

    bands.sort_by(|a, b| {
        crate::utils::safe_float_cmp(fragments[a[0]].bbox.top(), fragments[b[0]].bbox.top())
    });
    bands
}

/// Split a band into one value fragment plus name fragments and parse it.
fn reconstruct_band(
    fragments: &[TextFragment],
    band: &[usize],
    page: usize,
    heuristics: &Heuristics,
) -> Option<ReconstructedRow> {
    let value_idx = band
        .iter()
        .position(|&i| AMOUNT_RE.is_match(&fragments[i].text))?;

    let mut name = String::new();
    for (pos, &i) in band.iter().enumerate() {
        if pos != value_idx {
            name.push_str(fragments[i].text.trim());
        }
    }

    let value_text = fragments[band[value_idx]].text.trim();
    let caps = HYBRID_ROW_RE.captures(value_text)?;

    let sequence = caps.get(1).and_then(|m| m.as_str().parse().ok());
    if let Some(remnant) = caps.get(2).map(|m| m.as_str().trim()) {
        name.push_str(remnant);
    }
    let amount_text = caps.get(3).map(|m| m.as_str().trim().to_string());
    let premium_text = caps.get(4).map(|m| m.as_str().trim().to_string());
    let period_text = caps
        .get(5)
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string());

    let name = name.trim().to_string();
    if is_suspicious_fragment(&name, heuristics) || heuristics.is_header_noise(&name) {
        log::debug!("hybrid: rejected band with name '{}'", name);
        return None;
    }

    let mut y_top = f32::MAX;
    let mut y_bottom = f32::MIN;
    for &i in band {
        y_top = y_top.min(fragments[i].bbox.top());
        y_bottom = y_bottom.max(fragments[i].bbox.bottom());
    }

    Some(ReconstructedRow {
        sequence,
        coverage_name: name,
        amount_text,
        premium_text,
        period_text,
        page,
        y_range: (y_top, y_bottom),
    })
}

/// Suspiciously short name with no run of word characters.
fn is_suspicious_fragment(name: &str, heuristics: &Heuristics) -> bool {
    if name.chars().count() >= heuristics.thresholds.hybrid_name_min_len {
        return false;
    }
    let chars: Vec<char> = name.chars().collect();
    let has_run = chars
        .windows(2)
        .any(|w| w[0].is_alphanumeric() && w[1].is_alphanumeric());
    !has_run
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{MemoryDocument, PageContent};

    fn frag(text: &str, x: f32, y: f32) -> TextFragment {
        TextFragment {
            text: text.to_string(),
            bbox: Rect::new(x, y, 60.0, 10.0),
        }
    }

    fn doc_with_fragments(fragments: Vec<TextFragment>) -> MemoryDocument {
        MemoryDocument::new(
            "fixture.json",
            vec![PageContent {
                fragments,
                ..Default::default()
            }],
        )
    }

    fn table_region() -> Rect {
        Rect::new(0.0, 0.0, 600.0, 500.0)
    }

    #[test]
    fn test_bands_cluster_by_vertical_proximity() {
        let fragments = vec![
            frag("암진단비", 10.0, 100.0),
            frag("1,000만원 12,500 20년", 200.0, 101.5),
            frag("뇌출혈진단비", 10.0, 130.0),
        ];
        let bands = cluster_into_bands(&fragments, 3.0);
        assert_eq!(bands.len(), 2);
        assert_eq!(bands[0], vec![0, 1]);
        assert_eq!(bands[1], vec![2]);
    }

    #[test]
    fn test_reconstruct_simple_rows() {
        let h = Heuristics::default();
        let doc = doc_with_fragments(vec![
            frag("로봇암수술비", 10.0, 200.0),
            frag("500만원 8,200 100세만기", 200.0, 200.5),
            frag("암진단비", 10.0, 100.0),
            frag("1,000만원 12,500 20년", 200.0, 100.5),
        ]);
        let rows = reconstruct_rows(&doc, 1, &table_region(), &h).unwrap();

        assert_eq!(rows.len(), 2);
        // Sorted top-to-bottom regardless of input order
        assert_eq!(rows[0].coverage_name, "암진단비");
        assert_eq!(rows[0].amount_text.as_deref(), Some("1,000만원"));
        assert_eq!(rows[0].premium_text.as_deref(), Some("12,500"));
        assert_eq!(rows[0].period_text.as_deref(), Some("20년"));
        assert_eq!(rows[1].coverage_name, "로봇암수술비");
        assert!(rows[0].y_range.0 < rows[1].y_range.0);
    }

    #[test]
    fn test_sequence_number_parsed_from_value_fragment() {
        let h = Heuristics::default();
        let doc = doc_with_fragments(vec![
            frag("암진단비", 10.0, 100.0),
            frag("3 1,000만원 12,500 20년", 200.0, 100.5),
        ]);
        let rows = reconstruct_rows(&doc, 1, &table_region(), &h).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].sequence, Some(3));
    }

    #[test]
    fn test_split_name_fragments_concatenate() {
        let h = Heuristics::default();
        let doc = doc_with_fragments(vec![
            frag("로봇암", 10.0, 100.0),
            frag("수술비", 80.0, 100.5),
            frag("500만원 8,200 100세만기", 200.0, 101.0),
        ]);
        let rows = reconstruct_rows(&doc, 1, &table_region(), &h).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].coverage_name, "로봇암수술비");
    }

    #[test]
    fn test_band_without_value_fragment_is_skipped() {
        let h = Heuristics::default();
        let doc = doc_with_fragments(vec![frag("유의사항 안내", 10.0, 100.0)]);
        let rows = reconstruct_rows(&doc, 1, &table_region(), &h).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_header_noise_rejected() {
        let h = Heuristics::default();
        let doc = doc_with_fragments(vec![
            frag("합계", 10.0, 100.0),
            frag("1,000만원 52,300", 200.0, 100.5),
        ]);
        let rows = reconstruct_rows(&doc, 1, &table_region(), &h).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_short_no_run_name_rejected() {
        let h = Heuristics::default();
        let doc = doc_with_fragments(vec![
            frag("※", 10.0, 100.0),
            frag("1,000만원 12,500", 200.0, 100.5),
        ]);
        let rows = reconstruct_rows(&doc, 1, &table_region(), &h).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_fragments_outside_region_ignored() {
        let h = Heuristics::default();
        let doc = doc_with_fragments(vec![
            frag("암진단비", 10.0, 100.0),
            frag("1,000만원 12,500 20년", 200.0, 100.5),
            frag("페이지 꼬리말", 10.0, 900.0),
        ]);
        let region = Rect::new(0.0, 0.0, 600.0, 400.0);
        let rows = reconstruct_rows(&doc, 1, &region, &h).unwrap();
        assert_eq!(rows.len(), 1);
    }
}
