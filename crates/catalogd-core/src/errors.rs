//! Error types and handling
//!
//! Domain errors for the catalog, builder and infrastructure collaborators.
//! Variants map directly onto the gateway's status codes so handlers never
//! have to re-derive meaning from an error's shape.

use thiserror::Error;

/// Domain errors for catalogd.
#[derive(Error, Debug)]
pub enum CatalogError {
    /// The requested spec hash or container id has no catalog entry.
    #[error("not found: {message}")]
    NotFound { message: String },

    /// Input failed validation before it ever reached the catalog.
    #[error("bad request: {message}")]
    BadRequest { message: String },

    /// Input was well-formed but unusable as a build input (e.g. a tarball
    /// that extracts to nothing). Recorded as a terminal build failure
    /// rather than rejected outright, since the container row already
    /// exists by the time this is detected.
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    /// A well-formed request referring to a container whose artifacts have
    /// since been evicted.
    #[error("gone: {message}")]
    Gone { message: String },

    /// A request conflicts with the current catalog state (e.g. a build is
    /// already owned by another process and cannot be taken over).
    #[error("conflict: {message}")]
    Conflict { message: String },

    /// The underlying storage backend returned an error.
    #[error("catalog storage error: {source}")]
    Storage {
        #[from]
        source: sqlx::Error,
    },

    /// A transient failure in an infrastructure collaborator (object store,
    /// registry). Callers may retry these through `retry::retry_async`.
    #[error("transient infrastructure error: {message}")]
    TransientInfra { message: String },

    /// The external build tool (docker/repo2docker, singularity) failed.
    #[error("build tool error: {message}")]
    BuildTool { message: String },

    /// Object store read/write failure.
    #[error("object store error: {message}")]
    ObjectStore { message: String },

    /// Spec canonicalization or hashing failure.
    #[error("spec error: {message}")]
    Spec { message: String },

    /// Configuration error at startup.
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// Wrapped I/O error, e.g. from scratch-directory materialization.
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

/// Convenience type alias for Results with CatalogError
pub type Result<T> = std::result::Result<T, CatalogError>;
