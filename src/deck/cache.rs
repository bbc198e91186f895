//! Parsed-deck cache keyed by source content.

use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;

use super::Deck;

/// Hash a byte slice for content comparison.
pub fn hash_bytes(bytes: &[u8]) -> u64 {
    let mut hasher = DefaultHasher::new();
    bytes.hash(&mut hasher);
    hasher.finish()
}

/// Holds the most recent parse result and the hash of the text it came from.
///
/// The parser itself keeps no state; whoever owns the cache decides when it is
/// consulted and when it is dropped. A changed source replaces the cached deck
/// wholesale.
#[derive(Debug, Default)]
pub struct DeckCache {
    entry: Option<(u64, Arc<Deck>)>,
    parses: usize,
}

impl DeckCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached deck for `source`, parsing when the content changed.
    pub fn get_or_parse(&mut self, source: &str) -> Arc<Deck> {
        let key = hash_bytes(source.as_bytes());
        if let Some((cached_key, deck)) = &self.entry {
            if *cached_key == key {
                return Arc::clone(deck);
            }
        }

        tracing::debug!(hash = key, "deck source changed, reparsing");
        let deck = Arc::new(super::parse(source));
        self.entry = Some((key, Arc::clone(&deck)));
        self.parses += 1;
        deck
    }

    /// Drop the cached deck so the next lookup reparses.
    pub fn invalidate(&mut self) {
        self.entry = None;
    }

    pub const fn is_empty(&self) -> bool {
        self.entry.is_none()
    }

    /// Number of parses performed since creation.
    pub const fn parse_count(&self) -> usize {
        self.parses
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = "# T\n---\n## Slide 1: A\nhello\n";

    #[test]
    fn test_same_source_hits_cache() {
        let mut cache = DeckCache::new();
        let first = cache.get_or_parse(SOURCE);
        let second = cache.get_or_parse(SOURCE);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.parse_count(), 1);
    }

    #[test]
    fn test_changed_source_replaces_entry() {
        let mut cache = DeckCache::new();
        let first = cache.get_or_parse(SOURCE);
        let second = cache.get_or_parse("# T\n---\n## Slide 1: B\nbye\n");
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(second.slides[0].title, "B");
        assert_eq!(cache.parse_count(), 2);
    }

    #[test]
    fn test_invalidate_forces_reparse() {
        let mut cache = DeckCache::new();
        cache.get_or_parse(SOURCE);
        cache.invalidate();
        assert!(cache.is_empty());
        cache.get_or_parse(SOURCE);
        assert_eq!(cache.parse_count(), 2);
    }

    #[test]
    fn test_hash_bytes_distinguishes_content() {
        assert_eq!(hash_bytes(b"abc"), hash_bytes(b"abc"));
        assert_ne!(hash_bytes(b"abc"), hash_bytes(b"abd"));
    }
}
