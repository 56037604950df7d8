//! Word-window text chunker.
//!
//! Splits normalized source text into overlapping windows of whole words.
//! A window never splits a word, and consecutive windows share `overlap`
//! words so vocabulary at a boundary appears in both.
//!
//! # Algorithm
//!
//! 1. Tokenize on whitespace.
//! 2. If the trimmed text fits in `chunk_size` characters, return it as-is.
//! 3. Otherwise accumulate whole words (joined by single spaces) until the
//!    next word would push the window past `chunk_size` characters.
//! 4. Emit the window, then start the next one `overlap` words before the
//!    end of the previous window (always advancing by at least one word).
//! 5. A word longer than `chunk_size` is emitted on its own.
//!
//! # Example
//!
//! ```rust
//! use lore_index_core::chunk::chunk_text;
//!
//! let chunks = chunk_text("one two three four five", 9, 1);
//! assert_eq!(chunks, vec!["one two", "two three", "three", "four five"]);
//! ```

use sha2::{Digest, Sha256};

use crate::models::Chunk;

/// Split `text` into word-aligned windows of at most `chunk_size` characters.
///
/// `overlap` is measured in words. Output is deterministic for identical
/// input and parameters.
///
/// # Guarantees
///
/// - Empty or whitespace-only text yields no chunks.
/// - Text that fits in `chunk_size` yields exactly one chunk, the trimmed input.
/// - Every chunk's whitespace tokens are a contiguous run of the input's tokens.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    if trimmed.chars().count() <= chunk_size {
        return vec![trimmed.to_string()];
    }

    let words: Vec<&str> = trimmed.split_whitespace().collect();
    let lengths: Vec<usize> = words.iter().map(|w| w.chars().count()).collect();
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < words.len() {
        let mut end = start + 1;
        let mut len = lengths[start];
        while end < words.len() && len + 1 + lengths[end] <= chunk_size {
            len += 1 + lengths[end];
            end += 1;
        }
        chunks.push(words[start..end].join(" "));

        if end == words.len() {
            break;
        }
        start = end.saturating_sub(overlap).max(start + 1);
    }

    chunks
}

/// Build [`Chunk`]s for one source from its chunked text.
///
/// Chunk ids are SHA-256 digests of the owning pack, source, position, and
/// text, so re-indexing identical content yields identical ids.
pub fn make_chunks(
    pack_id: &str,
    game_profile_id: &str,
    source_id: &str,
    texts: Vec<String>,
) -> Vec<Chunk> {
    texts
        .into_iter()
        .enumerate()
        .map(|(index, text)| Chunk {
            id: chunk_id(pack_id, source_id, index, &text),
            text,
            source_id: source_id.to_string(),
            pack_id: pack_id.to_string(),
            game_profile_id: game_profile_id.to_string(),
        })
        .collect()
}

fn chunk_id(pack_id: &str, source_id: &str, index: usize, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(pack_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(source_id.as_bytes());
    hasher.update([0u8]);
    hasher.update((index as u64).to_le_bytes());
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOREM: &str = "Ranni the Witch asks you to find the Fingerslayer Blade \
        hidden beneath Nokron, Eternal City. Bring it back to her rise in Liurnia \
        and she will reward you with the Dark Moon Greatsword, a weapon that \
        scales with Intelligence and casts frost.";

    fn is_contiguous_run(haystack: &[&str], needle: &[&str]) -> bool {
        haystack.windows(needle.len()).any(|w| w == needle)
    }

    #[test]
    fn test_empty_text() {
        assert!(chunk_text("", 100, 5).is_empty());
        assert!(chunk_text("   \n\t  ", 100, 5).is_empty());
    }

    #[test]
    fn test_short_text_single_trimmed_chunk() {
        let chunks = chunk_text("  Hello,\n  world!  ", 100, 5);
        assert_eq!(chunks, vec!["Hello,\n  world!".to_string()]);
    }

    #[test]
    fn test_no_split_words() {
        let source: Vec<&str> = LOREM.split_whitespace().collect();
        for chunk_size in [1, 5, 12, 30, 64, 200] {
            for overlap in [0, 1, 3, 10] {
                for chunk in chunk_text(LOREM, chunk_size, overlap) {
                    let tokens: Vec<&str> = chunk.split_whitespace().collect();
                    assert!(
                        is_contiguous_run(&source, &tokens),
                        "chunk {:?} (size={}, overlap={}) is not a run of source words",
                        chunk,
                        chunk_size,
                        overlap
                    );
                }
            }
        }
    }

    #[test]
    fn test_chunks_respect_size_except_long_words() {
        for chunk in chunk_text(LOREM, 30, 2) {
            let words = chunk.split_whitespace().count();
            assert!(chunk.chars().count() <= 30 || words == 1, "{:?}", chunk);
        }
    }

    #[test]
    fn test_overlap_shares_words() {
        let chunks = chunk_text(LOREM, 40, 2);
        assert!(chunks.len() > 2);
        for pair in chunks.windows(2) {
            let prev: Vec<&str> = pair[0].split_whitespace().collect();
            let next: Vec<&str> = pair[1].split_whitespace().collect();
            let tail = &prev[prev.len().saturating_sub(2)..];
            assert!(
                next.starts_with(tail) || tail.len() > next.len(),
                "{:?} does not continue {:?}",
                pair[1],
                pair[0]
            );
        }
    }

    #[test]
    fn test_long_word_emitted_alone() {
        let chunks = chunk_text("a Supercalifragilisticexpialidocious b", 10, 0);
        assert_eq!(chunks, vec!["a", "Supercalifragilisticexpialidocious", "b"]);
    }

    #[test]
    fn test_overlap_larger_than_window_still_progresses() {
        let chunks = chunk_text("aa bb cc dd ee ff", 5, 10);
        assert_eq!(chunks.last().map(String::as_str), Some("ee ff"));
        assert!(chunks.len() <= 6);
    }

    #[test]
    fn test_multibyte_words() {
        let text = "ルーン の 王 エルデン リング 褪せ人 よ";
        for chunk in chunk_text(text, 6, 1) {
            assert!(!chunk.is_empty());
            assert!(text.contains(chunk.as_str()));
        }
    }

    #[test]
    fn test_deterministic() {
        let c1 = chunk_text(LOREM, 25, 3);
        let c2 = chunk_text(LOREM, 25, 3);
        assert_eq!(c1, c2);

        let m1 = make_chunks("p1", "elden_ring", "s1", c1);
        let m2 = make_chunks("p1", "elden_ring", "s1", c2);
        assert_eq!(m1, m2);
    }

    #[test]
    fn test_chunk_ids_distinct_per_position() {
        let chunks = make_chunks(
            "p1",
            "elden_ring",
            "s1",
            vec!["same".to_string(), "same".to_string()],
        );
        assert_ne!(chunks[0].id, chunks[1].id);
        assert_eq!(chunks[0].game_profile_id, "elden_ring");
    }
}
