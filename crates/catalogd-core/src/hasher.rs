//! SHA-256 hashing for container specs and uploaded tarballs.
//!
//! Specs are hashed over their canonical JSON form so that two requests
//! describing the same package set collapse to one catalog entry.
//! Tarballs are hashed by streaming their bytes, matching the original
//! `hash_file`'s 64 KiB chunking so large uploads never need to live in
//! memory twice.

use sha2::{Digest, Sha256};
use std::io::Read;

use crate::errors::Result;
use crate::spec::CanonicalSpec;

const CHUNK_SIZE: usize = 64 * 1024;

/// Hex-encoded SHA-256 digest of a spec's canonical form. This is the
/// container id used as the catalog's primary key.
pub fn hash_spec(canonical: &CanonicalSpec) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

/// Hex-encoded SHA-256 digest of everything read from `reader`, read in
/// 64 KiB chunks so the whole tarball never needs to be buffered at once.
pub fn hash_reader<R: Read>(reader: &mut R) -> Result<String> {
    let mut hasher = Sha256::new();
    let mut buf = [0u8; CHUNK_SIZE];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::ContainerSpec;
    use std::io::Cursor;

    #[test]
    fn spec_hash_is_deterministic() {
        let spec = ContainerSpec {
            apt: vec!["curl".into()],
            conda: vec![],
            pip: vec!["numpy".into()],
        };
        let canon = CanonicalSpec::new(&spec).unwrap();
        let h1 = hash_spec(&canon);
        let h2 = hash_spec(&CanonicalSpec::new(&spec).unwrap());
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
    }

    #[test]
    fn reader_hash_matches_known_digest() {
        // sha256("") = e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b85
        let mut cursor = Cursor::new(Vec::<u8>::new());
        let digest = hash_reader(&mut cursor).unwrap();
        assert_eq!(
            digest,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b85"
        );
    }

    #[test]
    fn reader_hash_spans_multiple_chunks() {
        let data = vec![7u8; CHUNK_SIZE * 3 + 17];
        let mut cursor = Cursor::new(data.clone());
        let a = hash_reader(&mut cursor).unwrap();
        let mut cursor2 = Cursor::new(data);
        let b = hash_reader(&mut cursor2).unwrap();
        assert_eq!(a, b);
    }
}
