//! Profile artifacts: persisted schema-recovery results.
//!
//! A profile records everything the builder inferred about one (insurer,
//! variant) document: detected table signatures, column mappings, row
//! filters, and the document fingerprint the inference was made against.
//! Profiles are read-only to the extractor and are never mutated in place;
//! a new profile supersedes the old one wholesale, subject to the Profile
//! Lock invariant enforced by [`ProfileStore::save`].

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{Error, GateFailure, Result};
use crate::fingerprint::Fingerprint;

/// Current profile artifact version.
pub const PROFILE_VERSION: u32 = 2;

/// Builder version recorded in artifacts.
pub const BUILDER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Which detection pass found a table signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetectionPass {
    /// Keyword-based summary-table detection
    A,
    /// Content-pattern fallback over pages Pass A left unclaimed
    B,
}

/// How the column mapping was inferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingMethod {
    /// Header keyword containment
    Header,
    /// Content-based fallback scoring (no usable header)
    Content,
    /// Pure content-pattern scoring for Pass B signatures
    PatternB,
}

/// Column-to-field mapping for one table signature.
///
/// Invariant: `coverage_name_index` never coincides with
/// `row_number_column_index` or with a detected category column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMap {
    /// True when column 0 holds row numbers
    pub has_row_number_column: bool,
    /// Index of the row-number column, when detected
    pub row_number_column_index: Option<usize>,
    /// Column holding the coverage name
    pub coverage_name_index: Option<usize>,
    /// Column holding the coverage amount
    pub coverage_amount_index: Option<usize>,
    /// Column holding the premium
    pub premium_index: Option<usize>,
    /// Column holding the period/term
    pub period_index: Option<usize>,
    /// Inference method used
    pub mapping_method: MappingMethod,
    /// Fraction of the four fields resolved (1.0 for header mappings)
    pub mapping_confidence: f32,
}

/// Row-rejection rules persisted with a signature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowFilterRules {
    /// Minimum accepted coverage-name length
    pub min_name_len: usize,
    /// Maximum accepted coverage-name length
    pub max_name_len: usize,
    /// Totals/subtotal markers that reject a row
    pub totals_keywords: Vec<String>,
    /// Disclaimer markers that reject a row
    pub disclaimer_keywords: Vec<String>,
}

/// One detected table region and its inferred schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSignature {
    /// 1-based page number
    pub page: usize,
    /// Table index within the page, in source order
    pub table_index: usize,
    /// Data row count observed at build time
    pub row_count: usize,
    /// Column count observed at build time
    pub col_count: usize,
    /// Header row index, when one was identified
    pub header_row_index: Option<usize>,
    /// Inferred column mapping
    pub column_map: ColumnMap,
    /// Row filter rules for this signature
    pub row_filter_rules: RowFilterRules,
    /// Free-text evidence for why this table was detected
    pub detection_evidence: Vec<String>,
    /// Which pass detected it
    pub detection_pass: DetectionPass,
}

/// Signatures split by confidence group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryTable {
    /// High-confidence keyword-detected signatures
    pub primary_signatures: Vec<TableSignature>,
    /// Lower-confidence or pattern-detected signatures
    pub variant_signatures: Vec<TableSignature>,
}

impl SummaryTable {
    /// All signatures, primary first, in declaration order.
    pub fn all_signatures(&self) -> impl Iterator<Item = &TableSignature> {
        self.primary_signatures
            .iter()
            .chain(self.variant_signatures.iter())
    }
}

/// Persisted schema-recovery result for one (insurer, variant) document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    /// Artifact format version
    pub profile_version: u32,
    /// Version of the builder that wrote this artifact
    pub builder_version: String,
    /// Generation timestamp (RFC 3339, UTC)
    pub generated_at: String,
    /// Insurer key
    pub insurer: String,
    /// Variant key
    pub variant: String,
    /// Source document path at build time
    pub source_pdf_path: String,
    /// Fingerprint of the document the schema was inferred from.
    /// Legacy artifacts may lack it; the extractor treats that as fatal.
    #[serde(default)]
    pub pdf_fingerprint: Option<Fingerprint>,
    /// Detected signatures
    pub summary_table: SummaryTable,
    /// Declared detail layout, when the document carries a detail region.
    /// The extractor never infers this at call time.
    #[serde(default)]
    pub detail_structure: Option<crate::detail::DetailStructure>,
    /// Detection settings and counters recorded for audit
    #[serde(default)]
    pub detection_metadata: IndexMap<String, serde_json::Value>,
    /// Free-text anomaly notes from the build
    #[serde(default)]
    pub known_anomalies: Vec<String>,
}

/// Outcome of a [`ProfileStore::save`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// A new or regenerated artifact was written
    Written,
    /// Fingerprint and primary mappings already match; nothing written
    Unchanged,
}

/// Directory-rooted profile persistence keyed by (insurer, variant).
#[derive(Debug, Clone)]
pub struct ProfileStore {
    root: PathBuf,
}

impl ProfileStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Artifact path for a profile key.
    pub fn path_for(&self, insurer: &str, variant: &str) -> PathBuf {
        self.root
            .join(format!("{}__{}.profile.json", insurer, variant))
    }

    /// Load a profile, failing if it does not exist.
    pub fn load(&self, insurer: &str, variant: &str) -> Result<Profile> {
        self.try_load(insurer, variant)?
            .ok_or_else(|| Error::NotFound(self.path_for(insurer, variant).display().to_string()))
    }

    /// Load a profile if one is persisted.
    pub fn try_load(&self, insurer: &str, variant: &str) -> Result<Option<Profile>> {
        let path = self.path_for(insurer, variant);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = std::fs::read(&path)?;
        let profile: Profile =
            serde_json::from_slice(&bytes).map_err(|e| Error::InvalidArtifact {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        if profile.profile_version > PROFILE_VERSION {
            return Err(Error::UnsupportedProfileVersion {
                found: profile.profile_version,
                supported: PROFILE_VERSION,
            });
        }
        Ok(Some(profile))
    }

    /// Persist a profile, enforcing the Profile Lock invariant.
    ///
    /// Same fingerprint with drifted primary column mappings is a hard
    /// failure: byte-identical input producing a different schema means the
    /// detection logic regressed, and silently overwriting would hide it.
    /// Same fingerprint with identical mappings is a silent no-op; a
    /// different fingerprint regenerates freely.
    pub fn save(&self, profile: &Profile) -> Result<SaveOutcome> {
        if let Some(existing) = self.try_load(&profile.insurer, &profile.variant)? {
            let fingerprints_match = match (&existing.pdf_fingerprint, &profile.pdf_fingerprint) {
                (Some(old), Some(new)) => old.matches(new),
                _ => false,
            };
            if fingerprints_match {
                if let Some(details) = primary_mapping_diff(
                    &existing.summary_table.primary_signatures,
                    &profile.summary_table.primary_signatures,
                ) {
                    return Err(GateFailure::ProfileLockViolation {
                        insurer: profile.insurer.clone(),
                        variant: profile.variant.clone(),
                        details,
                    }
                    .into());
                }
                log::debug!(
                    "profile {}/{} unchanged under matching fingerprint",
                    profile.insurer,
                    profile.variant
                );
                return Ok(SaveOutcome::Unchanged);
            }
        }

        let path = self.path_for(&profile.insurer, &profile.variant);
        let json = serde_json::to_string_pretty(profile)?;
        std::fs::write(&path, json)?;
        log::info!("wrote profile {}", path.display());
        Ok(SaveOutcome::Written)
    }
}

/// Itemized description of primary column-map drift, `None` when identical.
fn primary_mapping_diff(old: &[TableSignature], new: &[TableSignature]) -> Option<String> {
    if old.len() != new.len() {
        return Some(format!(
            "primary signature count {} -> {}",
            old.len(),
            new.len()
        ));
    }
    let mut lines = Vec::new();
    for (o, n) in old.iter().zip(new.iter()) {
        if o.column_map != n.column_map {
            lines.push(format!(
                "page {} table {}: {}",
                o.page,
                o.table_index,
                describe_map_change(&o.column_map, &n.column_map)
            ));
        }
    }
    if lines.is_empty() {
        None
    } else {
        Some(lines.join("; "))
    }
}

fn describe_map_change(old: &ColumnMap, new: &ColumnMap) -> String {
    let mut changes = Vec::new();
    let fields: [(&str, Option<usize>, Option<usize>); 5] = [
        ("coverage_name_index", old.coverage_name_index, new.coverage_name_index),
        ("coverage_amount_index", old.coverage_amount_index, new.coverage_amount_index),
        ("premium_index", old.premium_index, new.premium_index),
        ("period_index", old.period_index, new.period_index),
        (
            "row_number_column_index",
            old.row_number_column_index,
            new.row_number_column_index,
        ),
    ];
    for (name, o, n) in fields {
        if o != n {
            changes.push(format!("{} {:?} -> {:?}", name, o, n));
        }
    }
    if old.mapping_method != new.mapping_method {
        changes.push(format!(
            "mapping_method {:?} -> {:?}",
            old.mapping_method, new.mapping_method
        ));
    }
    if changes.is_empty() {
        // PartialEq said the maps differ, so confidence must have moved
        changes.push(format!(
            "mapping_confidence {} -> {}",
            old.mapping_confidence, new.mapping_confidence
        ));
    }
    changes.join(", ")
}
