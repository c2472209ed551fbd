//! Canonical serialization for link keys and deterministic hashing.
//!
//! Base descriptors are turned into link keys by canonical encoding, so two
//! structurally equal descriptors always land on the same store entry.
//!
//! ## Determinism Guarantees
//!
//! - Stable field order: Struct fields serialize in declaration order
//! - Stable Vec order: Vectors serialize in index order
//! - No HashMap allowed: Use BTreeMap for maps in encoded data
//! - Enum variants encode with their tag, so distinct kinds never collide

use serde::Serialize;
use xxhash_rust::xxh64::xxh64;

/// Error raised when a value cannot be canonically encoded.
#[derive(Debug, Clone, thiserror::Error)]
#[error("Canonical encoding failed: {0}")]
pub struct CanonicalError(String);

impl From<serde_json::Error> for CanonicalError {
    fn from(e: serde_json::Error) -> Self {
        Self(e.to_string())
    }
}

/// Serialize a value to canonical JSON bytes.
pub fn to_canonical_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, CanonicalError> {
    Ok(serde_json::to_vec(value)?)
}

/// Serialize a value to a canonical JSON string.
///
/// This is the stable string form used as a link key for base descriptors.
pub fn to_canonical_string<T: Serialize + ?Sized>(value: &T) -> Result<String, CanonicalError> {
    Ok(serde_json::to_string(value)?)
}

/// Compute canonical hash of a serializable value.
pub fn canonical_hash<T: Serialize + ?Sized>(value: &T) -> Result<u64, CanonicalError> {
    let bytes = to_canonical_bytes(value)?;
    Ok(xxh64(&bytes, 0))
}

/// Compute canonical hash and return as hex string.
pub fn canonical_hash_hex<T: Serialize + ?Sized>(value: &T) -> Result<String, CanonicalError> {
    Ok(format!("{:016x}", canonical_hash(value)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    #[serde(tag = "kind", rename_all = "snake_case")]
    enum TestBase {
        Thread { id: u64 },
        Comment { id: u64 },
    }

    #[test]
    fn test_determinism() {
        let b = TestBase::Thread { id: 42 };

        let h1 = canonical_hash(&b).unwrap();
        let h2 = canonical_hash(&b).unwrap();
        assert_eq!(h1, h2);
    }

    #[test]
    fn test_kind_tag_separates_equal_ids() {
        let thread = to_canonical_string(&TestBase::Thread { id: 7 }).unwrap();
        let comment = to_canonical_string(&TestBase::Comment { id: 7 }).unwrap();
        assert_ne!(thread, comment);
        assert_eq!(thread, r#"{"kind":"thread","id":7}"#);
    }

    #[test]
    fn test_unsized_values_hash_like_owned() {
        let ids = vec![1u64, 2, 3];
        assert_eq!(canonical_hash(&ids[..]).unwrap(), canonical_hash(&ids).unwrap());
        assert_eq!(to_canonical_string("thread").unwrap(), r#""thread""#);
    }
}
