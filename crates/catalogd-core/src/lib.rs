//! Core library for catalogd: the content-addressed container-build coordinator.
//!
//! This crate contains the catalog (persistent store + single-flight state
//! machine), the spec hasher, the Jaccard superset matcher, the builder
//! orchestration, the LRU landlord, and the narrow interfaces used to reach
//! external collaborators (object store, build tools, registry).

pub mod builder;
pub mod catalog;
pub mod config;
pub mod dockerfile;
pub mod errors;
pub mod hasher;
pub mod landlord;
pub mod logging;
pub mod matcher;
pub mod object_store;
pub mod owner_tag;
pub mod redaction;
pub mod retry;
pub mod spec;
pub mod tools;

/// Get the version of the core library
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        let version = version();
        assert!(!version.is_empty());
        assert!(version.contains('.'));
    }
}
