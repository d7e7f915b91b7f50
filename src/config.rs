//! Named threshold configuration for the detection heuristics.
//!
//! Every cutoff the engine applies lives here under a name, with defaults
//! tuned against the original proposal corpus. They are configuration
//! values, not derived constants: deployments against a different document
//! population are expected to recalibrate them.

/// Numeric cutoffs used by detection, column mapping and extraction.
#[derive(Debug, Clone)]
pub struct Thresholds {
    /// Minimum data rows for a primary (Pass A) summary-table candidate
    pub min_rows_primary: usize,
    /// Minimum data rows for a variant candidate
    pub min_rows_variant: usize,
    /// Rescue check: max fraction of sampled rows with clause-like text
    pub rescue_long_text_max_ratio: f32,
    /// Rescue check: min fraction of sampled rows with amount + premium/period
    pub rescue_value_min_ratio: f32,
    /// Character length past which a cell counts as clause-like
    pub clause_text_min_chars: usize,

    /// Rows sampled per table in Pass B
    pub pass_b_sample_rows: usize,
    /// Pass B: min amount-pattern row frequency
    pub pass_b_amount_min_ratio: f32,
    /// Pass B: min premium/period-pattern row frequency
    pub pass_b_value_min_ratio: f32,
    /// Pass B: min Korean-text frequency over the first two columns
    pub pass_b_korean_min_ratio: f32,
    /// Pass B: max clause-keyword row frequency
    pub pass_b_clause_max_ratio: f32,

    /// Rows sampled for column-mapping inference
    pub mapping_sample_rows: usize,
    /// Fraction of pure-integer first-column values marking a row-number column
    pub row_number_min_ratio: f32,
    /// Category column: min empty-cell ratio
    pub category_empty_min_ratio: f32,
    /// Category column: max unique-value ratio (over all sampled rows)
    pub category_unique_max_ratio: f32,
    /// Category column: max average non-empty text length
    pub category_avg_len_max: f32,
    /// Category column: min category-keyword match ratio over non-empty values
    pub category_keyword_min_ratio: f32,
    /// Content fallback: Korean ratio above which the Korean weight applies
    pub content_korean_min_ratio: f32,
    /// Content fallback: minimum aggregate score to accept a name column
    pub content_score_min: f32,

    /// Raw-grid empty coverage-cell ratio that triggers hybrid re-extraction
    pub hybrid_trigger_empty_ratio: f32,
    /// Row filter: minimum accepted coverage-name length
    pub name_min_len: usize,
    /// Row filter: maximum accepted coverage-name length
    pub name_max_len: usize,

    /// Vertical tolerance for clustering fragments into one row band
    pub band_tolerance: f32,
    /// Reconstructed names shorter than this are fragment-checked
    pub hybrid_name_min_len: usize,

    /// Maximum detail description length in characters
    pub detail_max_chars: usize,

    /// Non-blank lines scanned after the product line for variant markers
    pub variant_window_lines: usize,
    /// Page-1 prefix scanned when the product line cannot be located
    pub variant_window_chars: usize,
    /// Maximum length of a line eligible as a product-name fallback
    pub product_line_max_len: usize,

    /// Parity report: |delta| at or below this is a pass
    pub parity_warn_delta: f32,
    /// Parity report: |delta| above this is a fail
    pub parity_fail_delta: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            min_rows_primary: 10,
            min_rows_variant: 5,
            rescue_long_text_max_ratio: 0.30,
            rescue_value_min_ratio: 0.50,
            clause_text_min_chars: 200,

            pass_b_sample_rows: 20,
            pass_b_amount_min_ratio: 0.25,
            pass_b_value_min_ratio: 0.20,
            pass_b_korean_min_ratio: 0.20,
            pass_b_clause_max_ratio: 0.35,

            mapping_sample_rows: 10,
            row_number_min_ratio: 0.50,
            category_empty_min_ratio: 0.50,
            category_unique_max_ratio: 0.30,
            category_avg_len_max: 6.0,
            category_keyword_min_ratio: 0.30,
            content_korean_min_ratio: 0.50,
            content_score_min: 0.40,

            hybrid_trigger_empty_ratio: 0.30,
            name_min_len: 2,
            name_max_len: 60,

            band_tolerance: 3.0,
            hybrid_name_min_len: 10,

            detail_max_chars: 800,

            variant_window_lines: 5,
            variant_window_chars: 500,
            product_line_max_len: 80,

            parity_warn_delta: 0.05,
            parity_fail_delta: 0.20,
        }
    }
}

impl Thresholds {
    /// Create the corpus-tuned defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the hybrid auto-trigger ratio.
    pub fn with_hybrid_trigger(mut self, ratio: f32) -> Self {
        self.hybrid_trigger_empty_ratio = ratio;
        self
    }

    /// Override the detail description cap.
    pub fn with_detail_max_chars(mut self, max: usize) -> Self {
        self.detail_max_chars = max;
        self
    }

    /// Override the parity tiers.
    pub fn with_parity_tiers(mut self, warn: f32, fail: f32) -> Self {
        self.parity_warn_delta = warn;
        self.parity_fail_delta = fail;
        self
    }
}
