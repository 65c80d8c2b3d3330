//! Request fingerprinting.
//!
//! A search request is reduced to a canonical tuple and hashed, so that
//! semantically equivalent requests (reordered lists, empty entries, case
//! or whitespace differences, an explicit full plugin set) share one cache
//! entry.

use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

use crate::source::SourceType;

/// Sentinel for "every source of this kind".
const ALL: &str = "all";
/// Sentinel for "plugins are irrelevant to this request".
const NONE: &str = "none";

/// Joined lists longer than this are replaced by their digest so huge
/// channel/plugin sets keep the key short; the digest is memoised per list.
const INLINE_LIST_MAX: usize = 96;

/// Digest a keyword alone. Used by the async-plugin cache, which namespaces
/// per plugin and therefore only needs the keyword part of the fingerprint.
pub fn keyword_digest(keyword: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(keyword.trim().to_lowercase().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Computes deterministic fingerprints for normalised search requests.
pub struct CacheKeyBuilder {
    /// Sorted names of every registered plugin.
    plugin_names: Vec<String>,
    channel_field_cache: DashMap<String, String>,
    plugin_field_cache: DashMap<String, String>,
}

impl CacheKeyBuilder {
    pub fn new(mut plugin_names: Vec<String>) -> Self {
        plugin_names.sort();
        Self {
            plugin_names,
            channel_field_cache: DashMap::new(),
            plugin_field_cache: DashMap::new(),
        }
    }

    /// Fingerprint a request. The output is a fixed-width hex digest that is
    /// identical for all inputs equivalent under the normalisation rules.
    pub fn generate(
        &self,
        keyword: &str,
        channels: &[String],
        result_type: &str,
        source_type: SourceType,
        plugins: &[String],
    ) -> String {
        let keyword = keyword.trim().to_lowercase();
        let channels_field = self.channels_field(channels);
        let result_type = if result_type.is_empty() {
            ALL
        } else {
            result_type
        };
        let source_field = match source_type {
            SourceType::All => "all",
            SourceType::Tg => "tg",
            SourceType::Plugin => "plugin",
        };
        let plugins_field = self.plugins_field(source_type, plugins);

        let mut hasher = Sha256::new();
        hasher.update(
            format!(
                "{}:{}:{}:{}:{}",
                keyword, channels_field, result_type, source_field, plugins_field
            )
            .as_bytes(),
        );
        format!("{:x}", hasher.finalize())
    }

    fn channels_field(&self, channels: &[String]) -> String {
        let sorted = sorted_nonempty(channels);
        if sorted.is_empty() {
            return ALL.to_string();
        }
        self.list_field(&self.channel_field_cache, sorted)
    }

    fn plugins_field(&self, source_type: SourceType, plugins: &[String]) -> String {
        // Telegram-only requests never reach plugins, so any plugin list
        // collapses to one sentinel.
        if source_type == SourceType::Tg {
            return NONE.to_string();
        }

        let sorted = sorted_nonempty(plugins);
        if sorted.is_empty() || self.is_full_plugin_set(&sorted) {
            return ALL.to_string();
        }
        self.list_field(&self.plugin_field_cache, sorted)
    }

    fn is_full_plugin_set(&self, sorted: &[String]) -> bool {
        !self.plugin_names.is_empty() && sorted == self.plugin_names.as_slice()
    }

    /// Inline short lists, memoised digest for long ones.
    fn list_field(&self, memo: &DashMap<String, String>, sorted: Vec<String>) -> String {
        let joined = sorted.join(",");
        if joined.len() <= INLINE_LIST_MAX {
            return joined;
        }
        if let Some(cached) = memo.get(&joined) {
            return cached.clone();
        }
        let mut hasher = Sha256::new();
        hasher.update(joined.as_bytes());
        let digest = format!("{:x}", hasher.finalize());
        memo.insert(joined, digest.clone());
        digest
    }
}

/// Drop empty entries, deduplicate, sort.
fn sorted_nonempty(list: &[String]) -> Vec<String> {
    list.iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> CacheKeyBuilder {
        CacheKeyBuilder::new(vec!["pan666".to_string(), "panta".to_string()])
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_key_is_deterministic() {
        let keys = builder();
        let a = keys.generate("movie", &[], "all", SourceType::All, &[]);
        let b = keys.generate("movie", &[], "all", SourceType::All, &[]);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_key_order_independence() {
        let keys = builder();
        let a = keys.generate(
            "movie",
            &strings(&["channel1", "channel2"]),
            "all",
            SourceType::All,
            &strings(&["pan666", "panta"]),
        );
        let b = keys.generate(
            "movie",
            &strings(&["channel2", "channel1"]),
            "all",
            SourceType::All,
            &strings(&["panta", "pan666"]),
        );
        assert_eq!(a, b);
    }

    #[test]
    fn test_key_empty_entries_ignored() {
        let keys = builder();
        let a = keys.generate(
            "movie",
            &strings(&["channel1", "", "  "]),
            "all",
            SourceType::All,
            &strings(&[""]),
        );
        let b = keys.generate(
            "movie",
            &strings(&["channel1"]),
            "all",
            SourceType::All,
            &[],
        );
        assert_eq!(a, b);
    }

    #[test]
    fn test_key_keyword_normalization() {
        let keys = builder();
        let a = keys.generate("Movie", &[], "all", SourceType::All, &[]);
        let b = keys.generate(" movie ", &[], "all", SourceType::All, &[]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_key_empty_result_type_defaults() {
        let keys = builder();
        let a = keys.generate("movie", &[], "", SourceType::All, &[]);
        let b = keys.generate("movie", &[], "all", SourceType::All, &[]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_key_full_plugin_set_equals_unspecified() {
        let keys = builder();
        let explicit = keys.generate(
            "movie",
            &[],
            "all",
            SourceType::All,
            &strings(&["panta", "pan666"]),
        );
        let unspecified = keys.generate("movie", &[], "all", SourceType::All, &[]);
        assert_eq!(explicit, unspecified);

        // A strict subset is a different key
        let subset = keys.generate(
            "movie",
            &[],
            "all",
            SourceType::All,
            &strings(&["pan666"]),
        );
        assert_ne!(subset, unspecified);
    }

    #[test]
    fn test_key_tg_ignores_plugins() {
        let keys = builder();
        let a = keys.generate("movie", &[], "all", SourceType::Tg, &[]);
        let b = keys.generate(
            "movie",
            &[],
            "all",
            SourceType::Tg,
            &strings(&["pan666", "panta"]),
        );
        assert_eq!(a, b);

        // But tg and all are distinct fingerprints
        let all = keys.generate("movie", &[], "all", SourceType::All, &[]);
        assert_ne!(a, all);
    }

    #[test]
    fn test_key_large_lists_consistent() {
        let keys = builder();
        let channels: Vec<String> = (0..100).map(|i| format!("channel{:03}", i)).collect();
        let mut reversed = channels.clone();
        reversed.reverse();

        let a = keys.generate("movie", &channels, "all", SourceType::All, &[]);
        let b = keys.generate("movie", &reversed, "all", SourceType::All, &[]);
        assert_eq!(a, b);

        // Second call exercises the memoised digest path
        let c = keys.generate("movie", &channels, "all", SourceType::All, &[]);
        assert_eq!(a, c);
    }

    #[test]
    fn test_keyword_digest_normalizes() {
        assert_eq!(keyword_digest(" Movie "), keyword_digest("movie"));
        assert_ne!(keyword_digest("movie"), keyword_digest("series"));
    }
}
