//! Debug dumps of a cache tree.

use serde::{Serialize, Serializer};

use crate::keys::CacheKey;

/// One record of a recursive cache dump.
///
/// Serializes to `{"key", "value"}` for cached entries and to
/// `{"subcache_key", "subcache": [...]}` for nested scopes. Keys are written
/// as their content fingerprint.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum DumpEntry<'a, V> {
    /// A cached output.
    Value {
        /// The entry's data key.
        #[serde(serialize_with = "fingerprint")]
        key: &'a CacheKey,
        /// The cached output.
        value: &'a V,
    },
    /// A nested scope and its contents.
    Subcache {
        /// The scope's subcache key.
        #[serde(serialize_with = "fingerprint")]
        subcache_key: &'a CacheKey,
        /// The scope's records.
        subcache: Vec<DumpEntry<'a, V>>,
    },
}

impl<V> DumpEntry<'_, V> {
    /// Counts cached outputs in this record and everything nested under it.
    pub fn value_count(&self) -> usize {
        match self {
            DumpEntry::Value { .. } => 1,
            DumpEntry::Subcache { subcache, .. } => subcache.iter().map(Self::value_count).sum(),
        }
    }
}

fn fingerprint<S: Serializer>(key: &&CacheKey, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(*key)
}
