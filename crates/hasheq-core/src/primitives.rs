//! # Ledger Primitives
//!
//! Hardcoded runtime constants for the hasheq core.
//!
//! These are compiled into the binary and are immutable at runtime.

/// Maximum number of artifact patterns in a HashEqual query filter.
///
/// The relation is strictly pairwise; a third pattern can never match.
pub const MAX_FILTER_ARTIFACTS: usize = 2;

/// Prefix of every deterministic edge key.
pub const EDGE_COLLECTION: &str = "hashEqualsEdges";

// =============================================================================
// INPUT VALIDATION LIMITS
// =============================================================================

/// Maximum length for a hash algorithm name.
pub const MAX_ALGORITHM_LENGTH: usize = 64;

/// Maximum length for a digest string.
///
/// Large enough for hex-encoded 4096-bit digests.
pub const MAX_DIGEST_LENGTH: usize = 1024;

/// Maximum length for justification, collector and origin strings.
pub const MAX_PROVENANCE_LENGTH: usize = 4096;

/// Maximum number of claims in a single bulk ingestion.
pub const MAX_BULK_INGEST: usize = 10000;

// =============================================================================
// RETRY DEFAULTS
// =============================================================================

/// Default number of attempts for a whole operation (first try included).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default delay before the first retry, in milliseconds.
pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 25;

/// Default cap on the delay between retries, in milliseconds.
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 1000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_is_pairwise() {
        assert_eq!(MAX_FILTER_ARTIFACTS, 2);
    }

    #[test]
    fn backoff_defaults_are_ordered() {
        assert!(DEFAULT_INITIAL_BACKOFF_MS <= DEFAULT_MAX_BACKOFF_MS);
        assert!(DEFAULT_MAX_ATTEMPTS >= 1);
    }
}
