#![allow(clippy::type_complexity)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::match_like_matches_macro)]

//! # Proposal Oxide
//!
//! Profile-driven table schema recovery and coverage fact extraction for
//! insurance proposal documents.
//!
//! Proposal PDFs carry their authoritative coverage listing in a table
//! whose layout differs per issuer: headers go missing, merge, or shift;
//! row text sometimes renders outside the cell grid entirely. This crate
//! recovers that structure with deterministic rules and replays it
//! reproducibly:
//!
//! - **Profile building**: two-pass table discovery (keyword pass, then a
//!   content-pattern fallback over unclaimed pages) plus column-mapping
//!   inference, persisted as a versioned, fingerprint-locked profile.
//! - **Extraction**: a profile applied back to the same document, choosing
//!   per table region between direct cell extraction and hybrid layout
//!   reconstruction from positioned text fragments, decomposing every
//!   coverage name, joining benefit descriptions, and emitting JSONL fact
//!   streams.
//! - **Reproducibility**: the same document fingerprint must always yield
//!   the same column mapping (the Profile Lock), and extraction against a
//!   stale profile refuses to run.
//!
//! Document content (page text, table grids, positioned fragments) comes
//! from an upstream extractor behind the [`document::DocumentSource`]
//! trait; this crate never parses PDF internals itself.
//!
//! ## Quick Start
//!
//! ```ignore
//! use proposal_oxide::builder::ProfileBuilder;
//! use proposal_oxide::document::JsonDocument;
//! use proposal_oxide::extractor::{ExtractionOptions, Extractor};
//! use proposal_oxide::heuristics::Heuristics;
//! use proposal_oxide::profile::ProfileStore;
//!
//! # fn main() -> proposal_oxide::error::Result<()> {
//! let heuristics = Heuristics::default();
//! let doc = JsonDocument::open("proposals/samsung.json")?;
//! let store = ProfileStore::open("profiles")?;
//!
//! // Build (or lock-check) the profile
//! let (profile, _) =
//!     ProfileBuilder::new(&heuristics).build_and_save(&doc, "samsung", "m_40", &store)?;
//!
//! // Extract the fact streams
//! let report = Extractor::new(&heuristics).run_to_files(
//!     &doc,
//!     &profile,
//!     &ExtractionOptions::default(),
//!     "out/facts.jsonl",
//!     "out/fragments.jsonl",
//! )?;
//! println!("extracted {} facts ({:?})", report.extracted, report.status);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

// Error handling
pub mod error;

// Configuration and heuristics
pub mod config;
pub mod heuristics;

// Document model and source seam
pub mod document;
pub mod geometry;

// Content identity
pub mod fingerprint;

// Schema recovery
pub mod builder;
pub mod profile;

// Extraction
pub mod detail;
pub mod extractor;
pub mod facts;
pub mod hybrid;
pub mod identity;
pub mod semantics;

// Re-exports
pub use config::Thresholds;
pub use document::{DocumentSource, JsonDocument, MemoryDocument};
pub use error::{Error, GateFailure, Result};
pub use extractor::{ExtractionOptions, Extractor, ParityReport, ParityStatus};
pub use fingerprint::Fingerprint;
pub use heuristics::Heuristics;
pub use profile::{Profile, ProfileStore, SaveOutcome};

// Internal utilities
pub(crate) mod utils {
    //! Internal utility functions.

    use std::cmp::Ordering;

    /// Safely compare two floating point numbers, handling NaN cases.
    ///
    /// NaN values are treated as equal to each other and greater than all
    /// other values, so sorting never panics on NaN.
    #[inline]
    pub fn safe_float_cmp(a: f32, b: f32) -> Ordering {
        match (a.is_nan(), b.is_nan()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => a.partial_cmp(&b).unwrap(),
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_safe_float_cmp_normal() {
            assert_eq!(safe_float_cmp(1.0, 2.0), Ordering::Less);
            assert_eq!(safe_float_cmp(2.0, 1.0), Ordering::Greater);
            assert_eq!(safe_float_cmp(1.5, 1.5), Ordering::Equal);
        }

        #[test]
        fn test_safe_float_cmp_nan() {
            assert_eq!(safe_float_cmp(f32::NAN, f32::NAN), Ordering::Equal);
            assert_eq!(safe_float_cmp(f32::NAN, 0.0), Ordering::Greater);
            assert_eq!(safe_float_cmp(0.0, f32::NAN), Ordering::Less);
        }
    }
}

// Version info
/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name() {
        assert_eq!(NAME, "proposal_oxide");
    }

    #[test]
    fn test_version() {
        assert!(VERSION.starts_with("0."));
    }
}
