//! Canonical serialisation and token counting.
//!
//! Every item has exactly one string form: compact JSON with a fixed field
//! order and sorted map keys (`serde_json` without `preserve_order`). Token
//! counts are computed on that string only, so two runs over the same file
//! always pack identical chunks.

use crate::model::ContentItem;

/// Counts tokens in a canonical string.
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> usize;
}

/// `ceil(bytes / bytes_per_token)`.
///
/// The default of 4 bytes per token is the usual estimate for English text
/// with GPT-style BPE vocabularies. It overestimates slightly for JSON-heavy
/// content, which only adds headroom.
#[derive(Debug, Clone, Copy)]
pub struct ByteRatioCounter {
    bytes_per_token: usize,
}

impl ByteRatioCounter {
    pub fn new(bytes_per_token: usize) -> Self {
        Self {
            bytes_per_token: bytes_per_token.max(1),
        }
    }
}

impl Default for ByteRatioCounter {
    fn default() -> Self {
        Self::new(4)
    }
}

impl TokenCounter for ByteRatioCounter {
    fn count(&self, text: &str) -> usize {
        text.len().div_ceil(self.bytes_per_token)
    }
}

/// The canonical string form of an item.
pub fn canonical(item: &ContentItem) -> String {
    // ContentItem holds only strings, numbers and nested arrays/maps of them;
    // serialisation cannot fail.
    serde_json::to_string(item).unwrap_or_default()
}

/// Canonical form of a sequence of items, as sent to the reviewer.
pub fn canonical_items(items: &[ContentItem]) -> String {
    serde_json::to_string(items).unwrap_or_default()
}

/// Token count of one item's canonical form.
pub fn item_tokens(item: &ContentItem, counter: &dyn TokenCounter) -> usize {
    counter.count(&canonical(item))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn byte_ratio_rounds_up() {
        let c = ByteRatioCounter::default();
        assert_eq!(c.count(""), 0);
        assert_eq!(c.count("abc"), 1);
        assert_eq!(c.count("abcd"), 1);
        assert_eq!(c.count("abcde"), 2);
    }

    #[test]
    fn zero_ratio_is_clamped() {
        assert_eq!(ByteRatioCounter::new(0).count("abc"), 3);
    }

    #[test]
    fn canonical_form_sorts_map_keys() {
        let a = ContentItem {
            kind: crate::model::ItemKind::Table,
            origin: crate::model::Origin::Page(1),
            payload: json!({"zeta": 1, "alpha": 2}),
        };
        let s = canonical(&a);
        assert!(s.find("alpha").unwrap() < s.find("zeta").unwrap(), "{s}");
    }

    #[test]
    fn counts_are_reproducible() {
        let item = ContentItem::text(3, "Coil leaving air 55.2 F");
        let c = ByteRatioCounter::default();
        assert_eq!(item_tokens(&item, &c), item_tokens(&item.clone(), &c));
    }
}
