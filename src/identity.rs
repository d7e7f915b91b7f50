//! Product and variant identity extraction.
//!
//! Identity comes strictly from page-1 text — never from file or folder
//! names. A caller-supplied variant hint is only cross-checked and logged,
//! never allowed to override what the page says.

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::document::DocumentSource;
use crate::error::{GateFailure, Result};
use crate::heuristics::Heuristics;

/// Product identity extracted from page 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductIdentity {
    /// Product name line as written on page 1
    pub product_name_raw: String,
    /// Whitespace-collapsed display form
    pub product_name_normalized: String,
    /// Stable join key: normalized form with punctuation removed
    pub product_key: String,
}

/// Demographic variant context extracted from page 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantContext {
    /// Stable variant key ("m_40", "f_20-60", "default")
    pub variant_key: String,
    /// Axes that contributed to the key, in extraction order
    pub variant_axis: Vec<String>,
    /// Axis name to extracted value
    pub variant_values: IndexMap<String, String>,
}

impl VariantContext {
    /// The variant used when page 1 carries no demographic markers.
    pub fn default_variant() -> Self {
        Self {
            variant_key: "default".to_string(),
            variant_axis: Vec::new(),
            variant_values: IndexMap::new(),
        }
    }
}

/// Page-1 identity extractor.
pub struct IdentityExtractor<'h> {
    heuristics: &'h Heuristics,
    issuer_patterns: Vec<Regex>,
}

impl<'h> IdentityExtractor<'h> {
    /// Build an extractor with the default issuer pattern list.
    pub fn new(heuristics: &'h Heuristics) -> Self {
        // Issuer-specific product line shapes observed in the corpus.
        let issuer_patterns = [
            r"무배당\s*[가-힣A-Za-z0-9·&()\s]*보험[가-힣0-9.\s]*",
            r"\(무\)\s*[가-힣A-Za-z0-9·&()\s]*보험[가-힣0-9.\s]*",
            r"[가-힣A-Za-z0-9·&\s]*종합보험[가-힣0-9.\s]*",
        ]
        .iter()
        .map(|p| Regex::new(p).unwrap())
        .collect();
        Self {
            heuristics,
            issuer_patterns,
        }
    }

    /// Build an extractor with caller-supplied issuer patterns.
    pub fn with_patterns(heuristics: &'h Heuristics, patterns: Vec<Regex>) -> Self {
        Self {
            heuristics,
            issuer_patterns: patterns,
        }
    }

    /// Extract identity and variant from page 1.
    ///
    /// Failure to resolve a product name is a [`GateFailure`]: the issuer's
    /// page-1 layout is unrecognized and the document must be re-profiled.
    pub fn extract(
        &self,
        doc: &dyn DocumentSource,
        variant_hint: Option<&str>,
    ) -> Result<(ProductIdentity, VariantContext)> {
        let source = doc
            .source_path()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let page1 = match doc.page_text(1) {
            Ok(text) => text,
            Err(_) => {
                return Err(GateFailure::MissingProductIdentity { document: source }.into());
            },
        };

        let (product_line_idx, product_name_raw) = self
            .find_product_line(page1)
            .ok_or(GateFailure::MissingProductIdentity {
                document: source.clone(),
            })?;

        let identity = build_identity(&product_name_raw);
        if identity.product_key.is_empty() {
            return Err(GateFailure::MissingProductIdentity { document: source }.into());
        }

        let variant = self.extract_variant(page1, product_line_idx);
        if let Some(hint) = variant_hint {
            if hint != variant.variant_key {
                log::warn!(
                    "variant hint '{}' disagrees with extracted '{}' for {}",
                    hint,
                    variant.variant_key,
                    source
                );
            }
        }

        Ok((identity, variant))
    }

    /// Issuer regex list first, then the generic keyword fallback.
    fn find_product_line(&self, page1: &str) -> Option<(usize, String)> {
        let lines: Vec<&str> = page1.lines().collect();

        for (idx, line) in lines.iter().enumerate() {
            for pattern in &self.issuer_patterns {
                if let Some(m) = pattern.find(line) {
                    let name = m.as_str().trim();
                    if !name.is_empty() {
                        return Some((idx, name.to_string()));
                    }
                }
            }
        }

        // Fallback: first bounded-length line mentioning a product type.
        let max_len = self.heuristics.thresholds.product_line_max_len;
        for (idx, line) in lines.iter().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.chars().count() > max_len {
                continue;
            }
            if self
                .heuristics
                .lexicon
                .product_type_keywords
                .iter()
                .any(|k| trimmed.contains(k.as_str()))
            {
                return Some((idx, trimmed.to_string()));
            }
        }

        None
    }

    /// Scan the lines after the product line (or the page prefix) for
    /// demographic markers.
    fn extract_variant(&self, page1: &str, product_line_idx: usize) -> VariantContext {
        let window = self.variant_window(page1, product_line_idx);

        let mut axis = Vec::new();
        let mut values = IndexMap::new();
        let mut parts = Vec::new();

        if let Some((low, high)) = self.heuristics.age_range(&window) {
            axis.push("age".to_string());
            values.insert("age".to_string(), format!("{}-{}", low, high));
            parts.push(format!("{}-{}", low, high));
        } else if let Some(age) = self.heuristics.age_bound(&window) {
            axis.push("age".to_string());
            values.insert("age".to_string(), age.to_string());
            parts.push(age.to_string());
        }

        if let Some(sex) = self.heuristics.sex_marker(&window) {
            let value = sex.to_ascii_lowercase().to_string();
            axis.push("sex".to_string());
            values.insert("sex".to_string(), value.clone());
            // Sex leads the key so "m_40" reads naturally
            parts.insert(0, value);
        }

        if parts.is_empty() {
            return VariantContext::default_variant();
        }

        VariantContext {
            variant_key: parts.join("_"),
            variant_axis: axis,
            variant_values: values,
        }
    }

    fn variant_window(&self, page1: &str, product_line_idx: usize) -> String {
        let after: Vec<&str> = page1
            .lines()
            .skip(product_line_idx + 1)
            .filter(|l| !l.trim().is_empty())
            .take(self.heuristics.thresholds.variant_window_lines)
            .collect();
        if !after.is_empty() {
            return after.join("\n");
        }
        page1
            .chars()
            .take(self.heuristics.thresholds.variant_window_chars)
            .collect()
    }
}

fn build_identity(raw: &str) -> ProductIdentity {
    let normalized = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    let product_key: String = normalized
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect();
    ProductIdentity {
        product_name_raw: raw.to_string(),
        product_name_normalized: normalized,
        product_key,
    }
}
