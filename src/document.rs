//! Document data model and the source seam.
//!
//! The engine never parses PDF internals itself: page text, table grids and
//! positioned text fragments come from an upstream extraction collaborator
//! behind the [`DocumentSource`] trait. The shipping backend is
//! [`JsonDocument`], a pre-extracted page dump on disk; tests build the same
//! data model in memory with [`MemoryDocument`].
//!
//! Pages are numbered from 1, matching the page numbers recorded in profile
//! signatures and evidence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, GateFailure, Result};
use crate::geometry::Rect;

/// A positioned text fragment: the smallest unit the layout reconstructor
/// works with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextFragment {
    /// Fragment text as extracted
    pub text: String,
    /// Bounding box in document space (top-left origin)
    pub bbox: Rect,
}

/// One extracted table: a row-major grid of optional cell strings.
///
/// Upstream extractors report unreadable or merged-away cells as `null`,
/// which deserializes to `None` here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableGrid {
    /// Bounding box of the table region, when the extractor reports one
    #[serde(default)]
    pub bbox: Option<Rect>,
    /// Cell grid, row-major
    pub rows: Vec<Vec<Option<String>>>,
}

impl TableGrid {
    /// Number of rows in the grid.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Number of columns, taken as the widest row.
    pub fn col_count(&self) -> usize {
        self.rows.iter().map(|r| r.len()).max().unwrap_or(0)
    }

    /// Cell text at (row, col), empty string for missing or null cells.
    pub fn cell_text(&self, row: usize, col: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .and_then(|c| c.as_deref())
            .unwrap_or("")
    }

    /// True if the cell is absent, null, blank, or a literal none/null token.
    pub fn is_blank_cell(&self, row: usize, col: usize) -> bool {
        let text = self.cell_text(row, col).trim();
        text.is_empty() || text.eq_ignore_ascii_case("none") || text.eq_ignore_ascii_case("null")
    }
}

/// One page of pre-extracted content.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageContent {
    /// Raw page text in reading order
    #[serde(default)]
    pub text: String,
    /// Tables detected on the page, in source order
    #[serde(default)]
    pub tables: Vec<TableGrid>,
    /// Positioned text fragments on the page
    #[serde(default)]
    pub fragments: Vec<TextFragment>,
}

/// Access to one source document's extracted content.
///
/// All methods take 1-based page numbers.
pub trait DocumentSource {
    /// Path of the backing file (used for fingerprints and evidence).
    fn source_path(&self) -> &Path;

    /// Total number of pages.
    fn page_count(&self) -> usize;

    /// Raw text of a page.
    fn page_text(&self, page: usize) -> Result<&str>;

    /// Tables on a page, in source order.
    fn page_tables(&self, page: usize) -> Result<&[TableGrid]>;

    /// Positioned fragments on a page whose bounding box intersects `region`.
    fn text_fragments(&self, page: usize, region: &Rect) -> Result<Vec<TextFragment>>;
}

/// On-disk document dump: the JSON file an upstream PDF extractor writes.
#[derive(Debug, Serialize, Deserialize)]
struct DocumentDump {
    pages: Vec<PageContent>,
}

/// File-backed document source reading a pre-extracted page dump.
#[derive(Debug)]
pub struct JsonDocument {
    path: PathBuf,
    pages: Vec<PageContent>,
}

impl JsonDocument {
    /// Open a document dump from disk.
    ///
    /// Returns [`Error::NotFound`] when the path does not exist and a
    /// [`GateFailure::UnreadableDocument`] when the dump cannot be parsed
    /// far enough to yield a page count.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::NotFound(path.display().to_string()));
        }
        let bytes = std::fs::read(path)?;
        let dump: DocumentDump =
            serde_json::from_slice(&bytes).map_err(|e| GateFailure::UnreadableDocument {
                document: path.display().to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            path: path.to_path_buf(),
            pages: dump.pages,
        })
    }

    fn page(&self, page: usize) -> Result<&PageContent> {
        page.checked_sub(1)
            .and_then(|i| self.pages.get(i))
            .ok_or(Error::SignatureOutOfRange {
                page,
                table_index: 0,
            })
    }
}

impl DocumentSource for JsonDocument {
    fn source_path(&self) -> &Path {
        &self.path
    }

    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page_text(&self, page: usize) -> Result<&str> {
        Ok(&self.page(page)?.text)
    }

    fn page_tables(&self, page: usize) -> Result<&[TableGrid]> {
        Ok(&self.page(page)?.tables)
    }

    fn text_fragments(&self, page: usize, region: &Rect) -> Result<Vec<TextFragment>> {
        Ok(self
            .page(page)?
            .fragments
            .iter()
            .filter(|f| f.bbox.intersects(region))
            .cloned()
            .collect())
    }
}

/// In-memory document source for tests and fixtures.
#[derive(Debug, Default)]
pub struct MemoryDocument {
    path: PathBuf,
    pages: Vec<PageContent>,
}

impl MemoryDocument {
    /// Build a document from page contents under a synthetic path.
    pub fn new<P: AsRef<Path>>(path: P, pages: Vec<PageContent>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            pages,
        }
    }

    fn page(&self, page: usize) -> Result<&PageContent> {
        page.checked_sub(1)
            .and_then(|i| self.pages.get(i))
            .ok_or(Error::SignatureOutOfRange {
                page,
                table_index: 0,
            })
    }
}

impl DocumentSource for MemoryDocument {
    fn source_path(&self) -> &Path {
        &self.path
    }

    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page_text(&self, page: usize) -> Result<&str> {
        Ok(&self.page(page)?.text)
    }

    fn page_tables(&self, page: usize) -> Result<&[TableGrid]> {
        Ok(&self.page(page)?.tables)
    }

    fn text_fragments(&self, page: usize, region: &Rect) -> Result<Vec<TextFragment>> {
        Ok(self
            .page(page)?
            .fragments
            .iter()
            .filter(|f| f.bbox.intersects(region))
            .cloned()
            .collect())
    }
}

/// Convenience constructor for a grid of owned cells.
///
/// `None` cells stay `None`; everything else becomes `Some(String)`.
pub fn grid_from_rows(rows: Vec<Vec<Option<&str>>>) -> TableGrid {
    TableGrid {
        bbox: None,
        rows: rows
            .into_iter()
            .map(|r| r.into_iter().map(|c| c.map(|s| s.to_string())).collect())
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_counts_widest_row() {
        let grid = grid_from_rows(vec![
            vec![Some("a"), Some("b")],
            vec![Some("c"), Some("d"), Some("e")],
        ]);
        assert_eq!(grid.row_count(), 2);
        assert_eq!(grid.col_count(), 3);
    }

    #[test]
    fn test_blank_cell_detection() {
        let grid = grid_from_rows(vec![vec![
            Some("암진단비"),
            None,
            Some("  "),
            Some("None"),
            Some("null"),
        ]]);
        assert!(!grid.is_blank_cell(0, 0));
        assert!(grid.is_blank_cell(0, 1));
        assert!(grid.is_blank_cell(0, 2));
        assert!(grid.is_blank_cell(0, 3));
        assert!(grid.is_blank_cell(0, 4));
        // Out-of-range cells read as blank
        assert!(grid.is_blank_cell(5, 5));
    }

    #[test]
    fn test_memory_document_pages_are_one_based() {
        let doc = MemoryDocument::new(
            "fixture.json",
            vec![PageContent {
                text: "page one".to_string(),
                ..Default::default()
            }],
        );
        assert_eq!(doc.page_count(), 1);
        assert_eq!(doc.page_text(1).unwrap(), "page one");
        assert!(doc.page_text(0).is_err());
        assert!(doc.page_text(2).is_err());
    }

    #[test]
    fn test_fragments_filtered_by_region() {
        let doc = MemoryDocument::new(
            "fixture.json",
            vec![PageContent {
                fragments: vec![
                    TextFragment {
                        text: "inside".to_string(),
                        bbox: Rect::new(10.0, 10.0, 20.0, 10.0),
                    },
                    TextFragment {
                        text: "outside".to_string(),
                        bbox: Rect::new(500.0, 500.0, 20.0, 10.0),
                    },
                ],
                ..Default::default()
            }],
        );
        let region = Rect::new(0.0, 0.0, 100.0, 100.0);
        let found = doc.text_fragments(1, &region).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].text, "inside");
    }
}
