//! Token-bounded chunking of extracted items.
//!
//! A single greedy, order-preserving pass: keep a running chunk and its token
//! total; an item that would push the total past the budget closes the
//! running chunk (if it has anything in it) and starts the next one. It is not
//! optimal bin-packing, but it is deterministic, O(n), and never reorders,
//! drops or duplicates an item.
//!
//! An item whose own size exceeds the budget becomes a chunk on its own. That
//! is the only way a chunk can be over budget.

use crate::model::{Chunk, ContentItem};
use crate::tokens::{item_tokens, TokenCounter};
use tracing::{debug, info, warn};

/// Default share of the context window available for report content.
///
/// The remainder is headroom for the prompt scaffolding and the response.
pub const DEFAULT_CHUNK_RATIO: f64 = 0.85;

/// `floor(model_context_size * ratio)`.
pub fn chunk_max_size(model_context_size: usize, ratio: f64) -> usize {
    (model_context_size as f64 * ratio).floor() as usize
}

/// Pack `items` into chunks of at most `max_tokens`, counting with `counter`.
pub fn chunk_items(
    items: Vec<ContentItem>,
    max_tokens: usize,
    counter: &dyn TokenCounter,
) -> Vec<Chunk> {
    let chunks = pack(items, max_tokens, |item| item_tokens(item, counter));

    for chunk in chunks.iter().filter(|c| c.is_oversized(max_tokens)) {
        warn!(
            "Chunk {} holds a single item of {} tokens, above the {}-token budget",
            chunk.index + 1,
            chunk.token_count,
            max_tokens
        );
    }
    info!(
        "Split {} items into {} chunks (budget {} tokens)",
        chunks.iter().map(Chunk::len).sum::<usize>(),
        chunks.len(),
        max_tokens
    );
    chunks
}

/// Greedy pack with an arbitrary cost function.
pub fn pack<F>(items: Vec<ContentItem>, max_tokens: usize, mut cost: F) -> Vec<Chunk>
where
    F: FnMut(&ContentItem) -> usize,
{
    let mut chunks = Vec::new();
    let mut current: Vec<ContentItem> = Vec::new();
    let mut current_tokens = 0usize;

    for item in items {
        let tokens = cost(&item);
        if current_tokens + tokens > max_tokens && !current.is_empty() {
            let index = chunks.len();
            debug!("Chunk {}: {} items, {} tokens", index + 1, current.len(), current_tokens);
            chunks.push(Chunk {
                index,
                items: std::mem::take(&mut current),
                token_count: current_tokens,
            });
            current_tokens = 0;
        }
        current.push(item);
        current_tokens += tokens;
    }

    if !current.is_empty() {
        let index = chunks.len();
        debug!("Chunk {}: {} items, {} tokens", index + 1, current.len(), current_tokens);
        chunks.push(Chunk {
            index,
            items: current,
            token_count: current_tokens,
        });
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokens::ByteRatioCounter;

    /// Items whose cost is encoded in their text length.
    fn sized(costs: &[usize]) -> Vec<ContentItem> {
        costs
            .iter()
            .enumerate()
            .map(|(i, &c)| ContentItem::text(i as u32 + 1, "x".repeat(c)))
            .collect()
    }

    fn text_len(item: &ContentItem) -> usize {
        item.payload.as_str().map(str::len).unwrap_or(0)
    }

    fn costs(chunks: &[Chunk]) -> Vec<Vec<usize>> {
        chunks
            .iter()
            .map(|c| c.items.iter().map(text_len).collect())
            .collect()
    }

    #[test]
    fn max_size_floors() {
        assert_eq!(chunk_max_size(8192, 0.85), 6963);
        assert_eq!(chunk_max_size(128_000, DEFAULT_CHUNK_RATIO), 108_800);
        assert_eq!(chunk_max_size(100, 1.0), 100);
    }

    #[test]
    fn splits_when_next_item_overflows() {
        let chunks = pack(sized(&[50, 60, 30]), 100, text_len);
        assert_eq!(costs(&chunks), vec![vec![50], vec![60, 30]]);
        assert_eq!(chunks[1].token_count, 90);
        assert_eq!(chunks[1].index, 1);
    }

    #[test]
    fn exact_fit_stays_together() {
        let chunks = pack(sized(&[40, 60, 1]), 100, text_len);
        assert_eq!(costs(&chunks), vec![vec![40, 60], vec![1]]);
    }

    #[test]
    fn oversized_item_gets_its_own_chunk() {
        let chunks = pack(sized(&[10, 250, 10]), 100, text_len);
        assert_eq!(costs(&chunks), vec![vec![10], vec![250], vec![10]]);
        assert!(chunks[1].is_oversized(100));
        assert!(!chunks[0].is_oversized(100));
    }

    #[test]
    fn oversized_first_item_is_not_preceded_by_empty_chunk() {
        let chunks = pack(sized(&[300, 5]), 100, text_len);
        assert_eq!(costs(&chunks), vec![vec![300], vec![5]]);
    }

    #[test]
    fn empty_input_yields_no_chunks() {
        assert!(pack(Vec::new(), 100, text_len).is_empty());
    }

    #[test]
    fn budget_and_order_hold_for_many_shapes() {
        let patterns: &[&[usize]] = &[
            &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10],
            &[99, 1, 99, 1, 50, 50, 51],
            &[120, 30, 30, 30, 30, 200, 0, 0, 100],
            &[0, 0, 0],
            &[33; 17],
        ];
        for &pattern in patterns {
            let items = sized(pattern);
            let chunks = pack(items.clone(), 100, text_len);

            for c in &chunks {
                assert!(!c.is_empty());
                assert!(
                    c.token_count <= 100 || c.is_oversized(100),
                    "chunk over budget for {pattern:?}"
                );
            }

            let flattened: Vec<ContentItem> =
                chunks.into_iter().flat_map(|c| c.items).collect();
            assert_eq!(flattened, items, "order not preserved for {pattern:?}");
        }
    }

    #[test]
    fn chunk_items_uses_canonical_counts() {
        let items = vec![
            ContentItem::text(1, "a".repeat(400)),
            ContentItem::text(2, "b".repeat(400)),
        ];
        let counter = ByteRatioCounter::default();
        let per_item = item_tokens(&items[0], &counter);

        let together = chunk_items(items.clone(), per_item * 2, &counter);
        assert_eq!(together.len(), 1);
        assert_eq!(together[0].token_count, per_item * 2);

        let apart = chunk_items(items, per_item * 2 - 1, &counter);
        assert_eq!(apart.len(), 2);
    }
}
