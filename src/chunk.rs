//! Word-window text chunker.
//!
//! Splits document text into overlapping windows of at most `max_words`
//! words. Consecutive windows share `overlap_words` words so that a passage
//! straddling a boundary is still embedded whole in at least one chunk.
//!
//! Chunking is a pure function of its input: the same text and settings
//! always produce the same chunk list, which is what keeps re-ingestion
//! idempotent.

/// Split text into overlapping word windows.
///
/// Whitespace is normalised to single spaces. Text with no words yields no
/// chunks; text of at most `max_words` words yields exactly one. Otherwise
/// the window advances by `max_words - overlap` words per step, with
/// `overlap` clamped to `[0, max_words - 1]`, and the last window ends on
/// the last word.
pub fn chunk_words(text: &str, max_words: usize, overlap_words: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return Vec::new();
    }

    let max_words = max_words.max(1);
    if words.len() <= max_words {
        return vec![words.join(" ")];
    }

    let overlap = overlap_words.min(max_words - 1);
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < words.len() {
        let end = (start + max_words).min(words.len());
        chunks.push(words[start..end].join(" "));
        if end >= words.len() {
            break;
        }
        start = end - overlap;
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered_words(n: usize) -> String {
        (0..n).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = chunk_words("Engine coolant temperature high", 280, 40);
        assert_eq!(chunks, vec!["Engine coolant temperature high".to_string()]);
    }

    #[test]
    fn test_exactly_max_words_single_chunk() {
        let text = numbered_words(10);
        let chunks = chunk_words(&text, 10, 3);
        assert_eq!(chunks, vec![text]);
    }

    #[test]
    fn test_empty_text() {
        assert!(chunk_words("", 280, 40).is_empty());
        assert!(chunk_words("  \n\t ", 280, 40).is_empty());
    }

    #[test]
    fn test_whitespace_normalised() {
        let chunks = chunk_words("bilge\n\npump   alarm", 10, 2);
        assert_eq!(chunks, vec!["bilge pump alarm".to_string()]);
    }

    #[test]
    fn test_windows_overlap() {
        let text = numbered_words(10);
        let chunks = chunk_words(&text, 4, 1);
        assert_eq!(
            chunks,
            vec![
                "w0 w1 w2 w3".to_string(),
                "w3 w4 w5 w6".to_string(),
                "w6 w7 w8 w9".to_string(),
            ]
        );
    }

    #[test]
    fn test_last_window_is_not_repeated() {
        // 9 words, window 4, step 3: [0..4], [3..7], [6..9]
        let text = numbered_words(9);
        let chunks = chunk_words(&text, 4, 1);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2], "w6 w7 w8");
    }

    #[test]
    fn test_overlap_is_clamped() {
        // overlap >= max_words would never advance; it is clamped to max_words - 1
        let text = numbered_words(5);
        let chunks = chunk_words(&text, 3, 10);
        assert_eq!(
            chunks,
            vec![
                "w0 w1 w2".to_string(),
                "w1 w2 w3".to_string(),
                "w2 w3 w4".to_string(),
            ]
        );
    }

    #[test]
    fn test_zero_overlap_partitions() {
        let text = numbered_words(7);
        let chunks = chunk_words(&text, 3, 0);
        assert_eq!(chunks, vec!["w0 w1 w2", "w3 w4 w5", "w6"]);
    }

    #[test]
    fn test_coverage_and_monotonic_boundaries() {
        for total in [11usize, 50, 281, 600] {
            for (max, overlap) in [(10usize, 0usize), (10, 3), (10, 9), (280, 40)] {
                if total <= max {
                    continue;
                }
                let text = numbered_words(total);
                let chunks = chunk_words(&text, max, overlap);

                let mut seen = vec![false; total];
                let mut last_start: Option<usize> = None;
                for chunk in &chunks {
                    let idx: Vec<usize> = chunk
                        .split(' ')
                        .map(|w| w[1..].parse::<usize>().unwrap())
                        .collect();
                    assert!(idx.len() <= max);
                    if let Some(prev) = last_start {
                        assert!(idx[0] > prev, "boundaries must advance");
                    }
                    last_start = Some(idx[0]);
                    for i in idx {
                        seen[i] = true;
                    }
                }

                assert!(seen.iter().all(|s| *s), "every word covered");
                let last = chunks.last().unwrap();
                assert!(last.ends_with(&format!("w{}", total - 1)));
                let last_word_count = chunks
                    .iter()
                    .filter(|c| c.split(' ').any(|w| w == format!("w{}", total - 1)))
                    .count();
                assert_eq!(last_word_count, 1, "last word appears in exactly one chunk");
            }
        }
    }

    #[test]
    fn test_deterministic() {
        let text = numbered_words(700);
        assert_eq!(chunk_words(&text, 280, 40), chunk_words(&text, 280, 40));
    }
}
