//! Error types for the extraction engine.
//!
//! Gate failures get their own enum so callers can branch on them without
//! string matching: they map to exit code 2 and must never be retried
//! against the same profile, unlike ordinary runtime errors (exit code 1).

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during profile building and fact extraction.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Source document path does not exist
    #[error("Document not found: {0}")]
    NotFound(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed document dump or profile artifact
    #[error("Invalid artifact {path}: {reason}")]
    InvalidArtifact {
        /// Path of the offending file
        path: String,
        /// Reason the artifact was rejected
        reason: String,
    },

    /// Profile artifact written by a newer builder than this library
    #[error("Profile version {found} is newer than supported version {supported}")]
    UnsupportedProfileVersion {
        /// Version recorded in the artifact
        found: u32,
        /// Highest version this library reads
        supported: u32,
    },

    /// A signature referenced a page or table the document does not have
    #[error("Signature out of range: page {page}, table {table_index}")]
    SignatureOutOfRange {
        /// Page number from the signature
        page: usize,
        /// Table index from the signature
        table_index: usize,
    },

    /// JSON serialization error
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// A hard gate failure (exit code 2, never retried automatically)
    #[error(transparent)]
    Gate(#[from] GateFailure),
}

/// Fatal gate failures.
///
/// Downstream automation treats these as "do not retry, re-profile first".
/// Every variant carries enough detail for a human to decide whether the
/// document changed or the detection logic regressed.
#[derive(Debug, thiserror::Error)]
pub enum GateFailure {
    /// Recomputed document fingerprint differs from the profile's
    #[error("Fingerprint mismatch for {document}: changed fields [{changed_fields}]")]
    FingerprintMismatch {
        /// Document basename
        document: String,
        /// Comma-separated names of the fields that differ
        changed_fields: String,
    },

    /// Profile predates fingerprint recording
    #[error("Profile for {insurer}/{variant} carries no fingerprint; re-profile before extracting")]
    MissingFingerprint {
        /// Insurer key
        insurer: String,
        /// Variant key
        variant: String,
    },

    /// Same fingerprint produced a different primary column mapping
    #[error("Profile lock violation for {insurer}/{variant}: {details}")]
    ProfileLockViolation {
        /// Insurer key
        insurer: String,
        /// Variant key
        variant: String,
        /// Itemized description of the column-map drift
        details: String,
    },

    /// Page 1 yielded no resolvable product name or key
    #[error("No product identity resolvable from page 1 of {document}")]
    MissingProductIdentity {
        /// Document basename
        document: String,
    },

    /// Document exists but cannot be opened for a page count
    #[error("Unreadable document {document}: {reason}")]
    UnreadableDocument {
        /// Document path
        document: String,
        /// Reason the open failed
        reason: String,
    },
}

impl Error {
    /// Process exit code for this error: 2 for gate failures, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Gate(_) => 2,
            _ => 1,
        }
    }

    /// True if this error is a hard gate failure.
    pub fn is_gate_failure(&self) -> bool {
        matches!(self, Error::Gate(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_mismatch_message_itemizes_fields() {
        let err = Error::from(GateFailure::FingerprintMismatch {
            document: "samsung_proposal.json".to_string(),
            changed_fields: "file_size_bytes, content_hash".to_string(),
        });
        let msg = format!("{}", err);
        assert!(msg.contains("samsung_proposal.json"));
        assert!(msg.contains("file_size_bytes"));
        assert!(msg.contains("content_hash"));
    }

    #[test]
    fn test_gate_failures_exit_with_code_2() {
        let err = Error::from(GateFailure::MissingFingerprint {
            insurer: "samsung".to_string(),
            variant: "default".to_string(),
        });
        assert_eq!(err.exit_code(), 2);
        assert!(err.is_gate_failure());
    }

    #[test]
    fn test_runtime_errors_exit_with_code_1() {
        let err = Error::NotFound("missing.json".to_string());
        assert_eq!(err.exit_code(), 1);
        assert!(!err.is_gate_failure());
    }

    #[test]
    fn test_lock_violation_carries_details() {
        let err = GateFailure::ProfileLockViolation {
            insurer: "kb".to_string(),
            variant: "m40".to_string(),
            details: "coverage_name_index 1 -> 2".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("kb/m40"));
        assert!(msg.contains("1 -> 2"));
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Error>();
    }
}
