//! Hash map aliases and persisted key digests.
//!
//! In-memory maps use [`FxHashMap`] and [`FxHashSet`] from the `rustc-hash`
//! crate. Keys are internal (server URLs, usernames, remote paths), so
//! denial-of-service resistance is not required.
//!
//! Persisted partitions (cache files, scan-log files) are named by
//! [`key_digest`], a blake3 content hash of the key parts.
//!
//! # Examples
//!
//! ```
//! use wm_core::{FxHashMap, fx_hash_map, key_digest};
//!
//! let mut map: FxHashMap<String, i32> = fx_hash_map();
//! map.insert("key".to_owned(), 42);
//!
//! let digest = key_digest(&["https://dav.example.com", "alice", "/photos"]);
//! assert_eq!(digest.len(), 64);
//! ```

/// A [`HashMap`](std::collections::HashMap) using the Fx hash algorithm.
pub type FxHashMap<K, V> = rustc_hash::FxHashMap<K, V>;

/// A [`HashSet`](std::collections::HashSet) using the Fx hash algorithm.
pub type FxHashSet<V> = rustc_hash::FxHashSet<V>;

/// Creates a new empty [`FxHashMap`].
#[inline]
#[must_use]
pub fn fx_hash_map<K, V>() -> FxHashMap<K, V> {
    FxHashMap::default()
}

/// Creates a new empty [`FxHashSet`].
#[inline]
#[must_use]
pub fn fx_hash_set<V>() -> FxHashSet<V> {
    FxHashSet::default()
}

/// Returns the hex-encoded blake3 digest of the given key parts.
///
/// Each part is length-prefixed before hashing, so `["ab", "c"]` and
/// `["a", "bc"]` produce different digests.
///
/// # Examples
///
/// ```
/// use wm_core::key_digest;
///
/// let a = key_digest(&["https://x", "a", "/p"]);
/// let b = key_digest(&["https://x", "a", "/p"]);
/// assert_eq!(a, b);
/// assert_ne!(a, key_digest(&["https://x", "a", "/q"]));
/// ```
#[must_use]
pub fn key_digest(parts: &[&str]) -> String {
    let mut hasher = blake3::Hasher::new();
    for part in parts {
        hasher.update(&(part.len() as u64).to_le_bytes());
        hasher.update(part.as_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fx_hash_map_operations() {
        let mut map: FxHashMap<&str, i32> = fx_hash_map();
        map.insert("one", 1);
        map.insert("two", 2);
        assert_eq!(map.get("one"), Some(&1));
        assert_eq!(map.get("three"), None);
    }

    #[test]
    fn test_fx_hash_set_operations() {
        let mut set: FxHashSet<&str> = fx_hash_set();
        set.insert("one");
        assert!(set.contains("one"));
        assert!(!set.contains("two"));
    }

    #[test]
    fn test_key_digest_is_stable_hex() {
        let digest = key_digest(&["https://dav.example.com", "alice", "/photos"]);
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(
            digest,
            key_digest(&["https://dav.example.com", "alice", "/photos"])
        );
    }

    #[test]
    fn test_key_digest_part_boundaries() {
        assert_ne!(key_digest(&["ab", "c"]), key_digest(&["a", "bc"]));
        assert_ne!(key_digest(&["a", ""]), key_digest(&["a"]));
    }
}
