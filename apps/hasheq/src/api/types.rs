//! # API Request/Response Types
//!
//! This module defines the JSON structures for the HTTP API.
//!
//! Every response carries `success` plus an optional `error` message, so
//! clients can branch on one field regardless of the endpoint.

use hasheq_core::{Artifact, ArtifactSpec, HashEqual, HashEqualFilter, HashEqualInput};
use serde::{Deserialize, Serialize};

// =============================================================================
// HEALTH RESPONSE
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

// =============================================================================
// STATUS RESPONSE
// =============================================================================

/// Ledger status response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusResponse {
    pub success: bool,
    pub backend: String,
    pub artifacts: usize,
    pub hash_equals: usize,
    pub edges: usize,
    pub error: Option<String>,
}

impl StatusResponse {
    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            error: Some(msg.into()),
            ..Self::default()
        }
    }
}

// =============================================================================
// ARTIFACT REQUEST/RESPONSE
// =============================================================================

/// Artifact registration request.
pub type ArtifactRequest = ArtifactSpec;

/// Artifact registration response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactResponse {
    pub success: bool,
    pub artifact: Option<Artifact>,
    pub error: Option<String>,
}

impl ArtifactResponse {
    pub fn success(artifact: Artifact) -> Self {
        Self {
            success: true,
            artifact: Some(artifact),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            artifact: None,
            error: Some(msg.into()),
        }
    }
}

// =============================================================================
// INGEST REQUEST/RESPONSE
// =============================================================================

/// Single HashEqual ingest request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestRequest {
    pub artifact: ArtifactSpec,
    pub equal_artifact: ArtifactSpec,
    #[serde(default)]
    pub hash_equal: HashEqualInput,
}

/// Single HashEqual ingest response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestResponse {
    pub success: bool,
    pub hash_equal: Option<HashEqual>,
    pub error: Option<String>,
}

impl IngestResponse {
    pub fn success(hash_equal: HashEqual) -> Self {
        Self {
            success: true,
            hash_equal: Some(hash_equal),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            hash_equal: None,
            error: Some(msg.into()),
        }
    }
}

/// Bulk ingest request: three parallel lists of equal length.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BulkIngestRequest {
    pub artifacts: Vec<ArtifactSpec>,
    pub equal_artifacts: Vec<ArtifactSpec>,
    pub hash_equals: Vec<HashEqualInput>,
}

// =============================================================================
// QUERY REQUEST/RESPONSE
// =============================================================================

/// HashEqual query request.
pub type QueryRequest = HashEqualFilter;

/// Response listing HashEqual records (query and bulk ingest).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashEqualsResponse {
    pub success: bool,
    pub hash_equals: Vec<HashEqual>,
    pub error: Option<String>,
}

impl HashEqualsResponse {
    pub fn success(hash_equals: Vec<HashEqual>) -> Self {
        Self {
            success: true,
            hash_equals,
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            hash_equals: Vec::new(),
            error: Some(msg.into()),
        }
    }
}
