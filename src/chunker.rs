//! Fixed-size overlapping text windows for embedding.

/// Splits page text into overlapping character windows. Window boundaries
/// prefer a nearby newline or space but are otherwise naive; no sentence
/// awareness.
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    target: usize,
    overlap: usize,
}

impl Chunker {
    /// Builds a chunker with a target window size and tail overlap, both in
    /// characters. Overlap is clamped below the target so windows always
    /// advance.
    pub fn new(target: usize, overlap: usize) -> Self {
        let target = target.max(1);
        Self {
            target,
            overlap: overlap.min(target.saturating_sub(1)),
        }
    }

    /// Target window size in characters.
    pub fn target(&self) -> usize {
        self.target
    }

    /// Splits text into windows. Whitespace-only input yields no chunks.
    pub fn split(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        if chars.iter().all(|ch| ch.is_whitespace()) {
            return Vec::new();
        }

        let mut chunks = Vec::new();
        let mut start = 0usize;
        while start < chars.len() {
            let hard_end = (start + self.target).min(chars.len());
            let end = if hard_end < chars.len() {
                self.break_point(&chars, start, hard_end)
            } else {
                hard_end
            };

            let window: String = chars[start..end].iter().collect();
            let trimmed = window.trim();
            if !trimmed.is_empty() {
                chunks.push(trimmed.to_string());
            }

            if end >= chars.len() {
                break;
            }
            // Tail overlap, but never stand still.
            start = end.saturating_sub(self.overlap).max(start + 1);
        }
        chunks
    }

    /// Picks a boundary at or before `hard_end`, preferring a newline, then a
    /// space, in the back half of the window.
    fn break_point(&self, chars: &[char], start: usize, hard_end: usize) -> usize {
        let floor = start + (hard_end - start) / 2;
        let back_half = &chars[floor..hard_end];
        let newline = back_half.iter().rposition(|&ch| ch == '\n');
        let space = back_half.iter().rposition(|&ch| ch == ' ');
        match newline.or(space) {
            Some(offset) => floor + offset + 1,
            None => hard_end,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_one_chunk() {
        let chunker = Chunker::new(1000, 150);
        let chunks = chunker.split("a single short paragraph");
        assert_eq!(chunks, vec!["a single short paragraph".to_string()]);
    }

    #[test]
    fn whitespace_yields_nothing() {
        let chunker = Chunker::new(1000, 150);
        assert!(chunker.split("   \n\n  ").is_empty());
    }

    #[test]
    fn long_text_produces_overlapping_windows() {
        let chunker = Chunker::new(50, 10);
        let text = "lorem ipsum dolor sit amet ".repeat(20);
        let chunks = chunker.split(&text);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 50);
        }
        // Adjacent windows share tail text.
        let tail: String = chunks[0].chars().rev().take(5).collect();
        let tail: String = tail.chars().rev().collect();
        assert!(chunks[1].contains(tail.trim()));
    }

    #[test]
    fn windows_prefer_newline_boundaries() {
        let chunker = Chunker::new(30, 0);
        let text = "first paragraph line\nsecond paragraph line\nthird line";
        let chunks = chunker.split(text);
        assert!(chunks[0].ends_with("line"));
    }

    #[test]
    fn unbroken_text_still_advances() {
        let chunker = Chunker::new(10, 3);
        let text = "x".repeat(35);
        let chunks = chunker.split(&text);
        assert!(!chunks.is_empty());
        let covered: usize = chunks.iter().map(|c| c.len()).sum();
        assert!(covered >= 35);
    }
}
