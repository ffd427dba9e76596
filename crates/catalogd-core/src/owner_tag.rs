//! Per-process owner tag used for single-flight build coordination.
//!
//! Every process generates one random tag at startup and never persists it
//! anywhere but memory. A catalog row's `building` column holding a foreign
//! tag is how a freshly started process recognizes a crashed predecessor:
//! nobody alive holds that tag, so the row's claim can be reclaimed.

use uuid::Uuid;

static OWNER_TAG: once_cell::sync::Lazy<Uuid> = once_cell::sync::Lazy::new(Uuid::new_v4);

/// Returns this process's owner tag, generating it on first access.
pub fn current() -> Uuid {
    *OWNER_TAG
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_within_process() {
        assert_eq!(current(), current());
    }
}
