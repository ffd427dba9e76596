//! Container specifications and their canonical form.
//!
//! A [`ContainerSpec`] is the user-facing request shape: three package
//! lists naming what should be installed via `apt`, `conda` and `pip`. Two
//! specs that describe the same install set must hash identically
//! regardless of how the caller ordered or formatted their lists, so every
//! spec is first reduced to a [`CanonicalSpec`] before it is hashed or
//! persisted.

use serde::{Deserialize, Serialize};

use crate::errors::{CatalogError, Result};

/// A container build request: the set of packages to install per channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSpec {
    /// `apt` package names.
    #[serde(default)]
    pub apt: Vec<String>,
    /// `conda` package names.
    #[serde(default)]
    pub conda: Vec<String>,
    /// `pip` package names.
    #[serde(default)]
    pub pip: Vec<String>,
}

/// The canonical JSON encoding of a [`ContainerSpec`], guaranteed to be byte
/// identical for any two specs whose package sets are equal.
///
/// Canonicalization rules:
/// - each list is deduplicated and sorted by ascending Unicode codepoint,
/// - an absent and an empty list are indistinguishable (both encode as `[]`),
/// - keys are emitted in a fixed order (`apt`, `conda`, `pip`),
/// - no insignificant whitespace is emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalSpec(String);

impl CanonicalSpec {
    /// Canonicalize a spec. The only failure mode is a package name that
    /// cannot round-trip through UTF-8, which `String` already rules out,
    /// so this only fails if `serde_json` itself errors.
    pub fn new(spec: &ContainerSpec) -> Result<Self> {
        let apt = sorted_unique(&spec.apt);
        let conda = sorted_unique(&spec.conda);
        let pip = sorted_unique(&spec.pip);

        // serde_json's default map/struct serializer already omits
        // insignificant whitespace; the `preserve_order` feature combined
        // with this literal field order keeps the key order fixed.
        let ordered = serde_json::json!({
            "apt": apt,
            "conda": conda,
            "pip": pip,
        });
        let bytes = serde_json::to_string(&ordered).map_err(|e| CatalogError::Spec {
            message: format!("failed to canonicalize spec: {e}"),
        })?;
        Ok(Self(bytes))
    }

    /// The canonical JSON bytes, suitable for hashing or storage.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// The canonical JSON as a `&str`.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn sorted_unique(items: &[String]) -> Vec<String> {
    let mut items: Vec<String> = items.to_vec();
    items.sort();
    items.dedup();
    items
}
