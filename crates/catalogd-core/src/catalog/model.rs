//! Catalog row types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::spec::ContainerSpec;

/// A catalog entry keyed by the SHA-256 hash of its canonical spec (or of
/// its uploaded tarball, for advanced builds).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Container {
    /// Content hash; the catalog's primary key.
    pub id: String,
    /// Last time a build referenced this container, for LRU eviction.
    pub last_used: DateTime<Utc>,
    /// The spec this container was built from, if it came from `/build`
    /// rather than `/build_advanced`.
    pub specification: Option<ContainerSpec>,
    /// Object-store key of the uploaded tarball, if this came from
    /// `/build_advanced`.
    pub tarball: Option<String>,
    /// Presigned URL of the built Docker image, once the build succeeds.
    pub docker_url: Option<String>,
    /// Object-store URL of the Docker build log.
    pub docker_log: Option<String>,
    /// Size in bytes of the built Docker image.
    pub docker_size: Option<u64>,
    /// Presigned URL of the converted Singularity image, once built.
    pub singularity_url: Option<String>,
    /// Object-store URL of the Singularity build log.
    pub singularity_log: Option<String>,
    /// Size in bytes of the converted Singularity image.
    pub singularity_size: Option<u64>,
    /// Owner tag of the process currently building this container, or
    /// `None` if no build is in flight.
    pub building: Option<String>,
}

impl Container {
    /// A freshly seen container: only the id and last-used timestamp are
    /// known, everything else is unset.
    pub fn new(id: String, last_used: DateTime<Utc>) -> Self {
        Self {
            id,
            last_used,
            specification: None,
            tarball: None,
            docker_url: None,
            docker_log: None,
            docker_size: None,
            singularity_url: None,
            singularity_log: None,
            singularity_size: None,
            building: None,
        }
    }

    /// Combined artifact size counted against the storage budget.
    pub fn artifact_size(&self) -> u64 {
        self.docker_size.unwrap_or(0) + self.singularity_size.unwrap_or(0)
    }

    /// Whether this container holds any artifact eligible for eviction.
    pub fn has_evictable_artifact(&self) -> bool {
        self.docker_size.is_some() || self.singularity_size.is_some()
    }
}

/// A single build request against a [`Container`]. Multiple builds may
/// point at the same container once it has been deduplicated or matched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Build {
    /// Random id handed back to the caller as the build/status handle.
    pub id: String,
    /// The container this build resolved to.
    pub container_hash: String,
}

/// Response body for the `/{build_id}/status` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub id: String,
    pub recipe_checksum: String,
    pub last_used: DateTime<Utc>,
    pub docker_url: Option<String>,
    pub docker_size: Option<u64>,
    pub docker_log: Option<String>,
    pub singularity_url: Option<String>,
    pub singularity_size: Option<u64>,
    pub singularity_log: Option<String>,
}
