//! Deterministic content identity of a source document.
//!
//! A fingerprint is an equality key, nothing more: two fingerprints match
//! iff all four fields are equal. No partial or fuzzy matching.

use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Maximum number of leading bytes hashed into `content_hash`.
pub const HASH_PREFIX_BYTES: usize = 2 * 1024 * 1024;

/// Content identity of a source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    /// Size of the backing file in bytes
    pub file_size_bytes: u64,
    /// Number of pages in the document
    pub page_count: usize,
    /// Lowercase hex SHA-256 of the first [`HASH_PREFIX_BYTES`] bytes
    /// (or the whole file if smaller)
    pub content_hash: String,
    /// Basename of the source path
    pub source_basename: String,
}

impl Fingerprint {
    /// Compute the fingerprint of the file at `path`.
    ///
    /// The page count comes from the already-opened document; the file
    /// itself supplies size and hash bytes. Identical bytes always yield an
    /// identical fingerprint.
    pub fn compute<P: AsRef<Path>>(path: P, page_count: usize) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::NotFound(path.display().to_string()));
        }
        let bytes = std::fs::read(path)?;
        let prefix = &bytes[..bytes.len().min(HASH_PREFIX_BYTES)];

        let mut hasher = Sha256::new();
        hasher.update(prefix);
        let content_hash = format!("{:x}", hasher.finalize());

        let source_basename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Self {
            file_size_bytes: bytes.len() as u64,
            page_count,
            content_hash,
            source_basename,
        })
    }

    /// Full four-field equality.
    pub fn matches(&self, other: &Fingerprint) -> bool {
        self == other
    }

    /// Names of the fields that differ from `other`, for gate diagnostics.
    pub fn changed_fields(&self, other: &Fingerprint) -> Vec<&'static str> {
        let mut changed = Vec::new();
        if self.file_size_bytes != other.file_size_bytes {
            changed.push("file_size_bytes");
        }
        if self.page_count != other.page_count {
            changed.push("page_count");
        }
        if self.content_hash != other.content_hash {
            changed.push("content_hash");
        }
        if self.source_basename != other.source_basename {
            changed.push("source_basename");
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(contents: &[u8]) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn test_fingerprint_is_deterministic() {
        let f = write_temp(b"identical bytes");
        let a = Fingerprint::compute(f.path(), 3).unwrap();
        let b = Fingerprint::compute(f.path(), 3).unwrap();
        assert!(a.matches(&b));
        assert!(a.matches(&a));
    }

    #[test]
    fn test_single_byte_change_breaks_match() {
        let f1 = write_temp(b"proposal contents v1");
        let f2 = write_temp(b"proposal contents v2");
        let mut a = Fingerprint::compute(f1.path(), 3).unwrap();
        let mut b = Fingerprint::compute(f2.path(), 3).unwrap();
        // Pin the basename so only the hashed bytes differ
        a.source_basename = "same.json".to_string();
        b.source_basename = "same.json".to_string();
        b.file_size_bytes = a.file_size_bytes;
        assert_ne!(a.content_hash, b.content_hash);
        assert!(!a.matches(&b));
        assert_eq!(a.changed_fields(&b), vec!["content_hash"]);
    }

    #[test]
    fn test_page_count_participates_in_equality() {
        let f = write_temp(b"same bytes");
        let a = Fingerprint::compute(f.path(), 3).unwrap();
        let b = Fingerprint::compute(f.path(), 4).unwrap();
        assert!(!a.matches(&b));
        assert_eq!(a.changed_fields(&b), vec!["page_count"]);
    }

    #[test]
    fn test_missing_path_is_not_found() {
        let err = Fingerprint::compute("/no/such/file.json", 1).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_hash_covers_at_most_prefix() {
        // Identical first 2 MiB, different tail: hashes agree, sizes differ.
        let prefix = vec![0xabu8; HASH_PREFIX_BYTES];
        let mut long = prefix.clone();
        long.extend_from_slice(b"tail that is never hashed");
        let f1 = write_temp(&prefix);
        let f2 = write_temp(&long);
        let a = Fingerprint::compute(f1.path(), 1).unwrap();
        let b = Fingerprint::compute(f2.path(), 1).unwrap();
        assert_eq!(a.content_hash, b.content_hash);
        assert_ne!(a.file_size_bytes, b.file_size_bytes);
        assert!(!a.matches(&b));
    }
}
