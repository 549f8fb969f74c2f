//! Configuration types deserialized from `kiln.toml`.

use serde::Deserialize;

/// Default entry cap for the generational cache.
pub const DEFAULT_LRU_CAPACITY: usize = 100;

/// The top-level configuration parsed from `kiln.toml`.
///
/// Every section is optional; an empty file yields the defaults.
#[derive(Debug, Default, Deserialize)]
pub struct KilnConfig {
    /// Cache selection and sizing.
    #[serde(default)]
    pub cache: CacheSettings,
    /// Log filtering handed to the host's subscriber.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// How the execution cache is built.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct CacheSettings {
    /// Which eviction policy the cache uses.
    #[serde(default)]
    pub mode: CacheMode,
    /// How data keys are derived.
    #[serde(default)]
    pub key: KeyKind,
    /// Fold every node's id into its input signature.
    ///
    /// Only meaningful for [`KeyKind::InputSignature`].
    #[serde(default)]
    pub include_node_id: bool,
    /// Entry cap for [`CacheMode::Lru`].
    #[serde(default = "default_lru_capacity")]
    pub lru_capacity: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            mode: CacheMode::default(),
            key: KeyKind::default(),
            include_node_id: false,
            lru_capacity: DEFAULT_LRU_CAPACITY,
        }
    }
}

fn default_lru_capacity() -> usize {
    DEFAULT_LRU_CAPACITY
}

/// Eviction policy of the execution cache.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CacheMode {
    /// Exact reachability: keep only what the current prompt uses (default).
    #[default]
    Hierarchical,
    /// Generational approximation of least-recently-used, capped by entry count.
    Lru,
}

/// Data key derivation strategy.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum KeyKind {
    /// Structural signature over the node and its ancestry (default).
    #[default]
    InputSignature,
    /// Node id and class only.
    Identity,
}

/// Logging configuration.
#[derive(Debug, Default, Deserialize)]
pub struct LoggingConfig {
    /// A `tracing` filter directive such as `"kiln_cache=debug"`.
    #[serde(default)]
    pub filter: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let settings = CacheSettings::default();
        assert_eq!(settings.mode, CacheMode::Hierarchical);
        assert_eq!(settings.key, KeyKind::InputSignature);
        assert!(!settings.include_node_id);
        assert_eq!(settings.lru_capacity, DEFAULT_LRU_CAPACITY);
    }

    #[test]
    fn snake_case_variants() {
        let mode: CacheMode = toml::from_str::<CacheSettings>("mode = \"lru\"")
            .unwrap()
            .mode;
        assert_eq!(mode, CacheMode::Lru);
        let key = toml::from_str::<CacheSettings>("key = \"input_signature\"")
            .unwrap()
            .key;
        assert_eq!(key, KeyKind::InputSignature);
    }

    #[test]
    fn unknown_mode_rejected() {
        assert!(toml::from_str::<CacheSettings>("mode = \"fifo\"").is_err());
    }
}
