//! Emitted fact records and the JSONL fact stream.
//!
//! Fact records are append-only and immutable once written. The main stream
//! and the fragment stream share one schema; a record lands in exactly one
//! of them depending on `coverage_semantics.fragment_detected`.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::detail::DetailFact;
use crate::error::Result;
use crate::heuristics::Heuristics;
use crate::identity::{ProductIdentity, VariantContext};
use crate::semantics::CoverageSemantics;

/// A page/row/coordinate reference attached to an extracted field.
///
/// Used for downstream traceability, never for inference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    /// 1-based source page
    pub page: usize,
    /// Source row index, when row-addressable
    pub row: Option<usize>,
    /// Vertical extent for hybrid-reconstructed rows
    pub y_range: Option<(f32, f32)>,
}

/// Extracted coverage values plus their decomposition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageFacts {
    /// Coverage amount as written
    pub coverage_amount_text: Option<String>,
    /// Premium as written
    pub premium_text: Option<String>,
    /// Period/term as written
    pub period_text: Option<String>,
    /// Structured decomposition of the coverage name
    pub coverage_semantics: CoverageSemantics,
    /// Downstream evidence requirements, when the profile declares any
    pub evidence_requirements: Option<String>,
    /// Traceability references
    pub evidences: Vec<Evidence>,
}

/// One emitted coverage fact row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalFact {
    /// Insurer key the batch ran under
    pub insurer_key: String,
    /// Issuer code, when the caller supplies one
    pub issuer_code: Option<String>,
    /// Product identity stamped from page 1
    pub product: ProductIdentity,
    /// Variant context stamped from page 1
    pub variant: VariantContext,
    /// Free-form batch context, when the caller supplies one
    pub proposal_context: Option<String>,
    /// Coverage name exactly as extracted
    pub coverage_name_raw: String,
    /// Extracted values and semantics
    pub proposal_facts: CoverageFacts,
    /// Joined detail record, `None` when no detail matched
    pub proposal_detail_facts: Option<DetailFact>,
}

impl ProposalFact {
    /// True when this record belongs in the fragment stream.
    pub fn is_fragment(&self) -> bool {
        self.proposal_facts.coverage_semantics.fragment_detected
    }
}

/// Join key for matching summary facts to detail facts: whitespace,
/// enclosing punctuation and leading enumeration stripped, case-folded.
pub fn normalize_join_key(name: &str, heuristics: &Heuristics) -> String {
    let stripped = heuristics.strip_enumeration(name.trim());
    let stripped = stripped.trim_matches(|c: char| {
        matches!(c, '(' | ')' | '（' | '）' | '[' | ']' | '「' | '」' | '"' | '\'')
    });
    stripped
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

/// Line-delimited JSON writer for the two fact streams.
pub struct FactWriter {
    main: BufWriter<File>,
    fragments: BufWriter<File>,
    main_count: usize,
    fragment_count: usize,
}

impl FactWriter {
    /// Create both stream files, truncating any previous run.
    pub fn create<P: AsRef<Path>>(main_path: P, fragment_path: P) -> Result<Self> {
        Ok(Self {
            main: BufWriter::new(File::create(main_path)?),
            fragments: BufWriter::new(File::create(fragment_path)?),
            main_count: 0,
            fragment_count: 0,
        })
    }

    /// Append one record to the stream it belongs to.
    pub fn write(&mut self, fact: &ProposalFact) -> Result<()> {
        let line = serde_json::to_string(fact)?;
        if fact.is_fragment() {
            self.fragments.write_all(line.as_bytes())?;
            self.fragments.write_all(b"\n")?;
            self.fragment_count += 1;
        } else {
            self.main.write_all(line.as_bytes())?;
            self.main.write_all(b"\n")?;
            self.main_count += 1;
        }
        Ok(())
    }

    /// Flush both streams and return (main, fragment) record counts.
    pub fn finish(mut self) -> Result<(usize, usize)> {
        self.main.flush()?;
        self.fragments.flush()?;
        Ok((self.main_count, self.fragment_count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantics::decompose;

    fn sample_fact(name: &str, heuristics: &Heuristics) -> ProposalFact {
        ProposalFact {
            insurer_key: "samsung".to_string(),
            issuer_code: None,
            product: ProductIdentity {
                product_name_raw: "무배당 튼튼 암보험".to_string(),
                product_name_normalized: "무배당 튼튼 암보험".to_string(),
                product_key: "무배당튼튼암보험".to_string(),
            },
            variant: VariantContext::default_variant(),
            proposal_context: None,
            coverage_name_raw: name.to_string(),
            proposal_facts: CoverageFacts {
                coverage_amount_text: Some("1,000만원".to_string()),
                premium_text: Some("12,500".to_string()),
                period_text: Some("20년".to_string()),
                coverage_semantics: decompose(name, heuristics),
                evidence_requirements: None,
                evidences: vec![Evidence {
                    page: 2,
                    row: Some(1),
                    y_range: None,
                }],
            },
            proposal_detail_facts: None,
        }
    }

    #[test]
    fn test_normalize_join_key() {
        let h = Heuristics::default();
        assert_eq!(normalize_join_key("3. 암진단비", &h), "암진단비");
        assert_eq!(normalize_join_key("  암 진단비  ", &h), "암진단비");
        assert_eq!(normalize_join_key("(암진단비)", &h), "암진단비");
        assert_eq!(normalize_join_key("Cancer Fee", &h), "cancerfee");
    }

    #[test]
    fn test_writer_routes_fragments() {
        let h = Heuristics::default();
        let dir = tempfile::tempdir().unwrap();
        let main_path = dir.path().join("facts.jsonl");
        let frag_path = dir.path().join("fragments.jsonl");

        let mut writer = FactWriter::create(&main_path, &frag_path).unwrap();
        writer.write(&sample_fact("암진단비", &h)).unwrap();
        writer.write(&sample_fact("최초1회한", &h)).unwrap();
        let (main, fragments) = writer.finish().unwrap();

        assert_eq!(main, 1);
        assert_eq!(fragments, 1);

        let main_lines = std::fs::read_to_string(&main_path).unwrap();
        let frag_lines = std::fs::read_to_string(&frag_path).unwrap();
        assert_eq!(main_lines.lines().count(), 1);
        assert_eq!(frag_lines.lines().count(), 1);
        assert!(main_lines.contains("암진단비"));
        assert!(frag_lines.contains("최초1회한"));

        // Both streams share the schema
        let parsed: ProposalFact = serde_json::from_str(frag_lines.lines().next().unwrap()).unwrap();
        assert!(parsed.is_fragment());
    }

    #[test]
    fn test_records_serialize_deterministically() {
        let h = Heuristics::default();
        let fact = sample_fact("암진단비", &h);
        let a = serde_json::to_string(&fact).unwrap();
        let b = serde_json::to_string(&fact).unwrap();
        assert_eq!(a, b);
    }
}
