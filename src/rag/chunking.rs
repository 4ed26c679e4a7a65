//! Boundary-aware text chunking
//!
//! Splits a document into chunks of at most `size` characters, preferring
//! paragraph breaks, then line breaks, then sentence ends, then whitespace,
//! and only cutting mid-word when a single word is longer than a chunk.
//! Neighbouring chunks share up to `overlap` characters of trailing context.

/// Boundary a segment was split on, from coarsest to finest
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SplitLevel {
    Paragraph,
    Line,
    Sentence,
    Word,
    Char,
}

impl SplitLevel {
    const fn finer(self) -> Self {
        match self {
            Self::Paragraph => Self::Line,
            Self::Line => Self::Sentence,
            Self::Sentence => Self::Word,
            Self::Word | Self::Char => Self::Char,
        }
    }

    /// Separator used when gluing segments of this level back together
    const fn joiner(self) -> &'static str {
        match self {
            Self::Paragraph => "\n\n",
            Self::Line => "\n",
            Self::Sentence | Self::Word => " ",
            Self::Char => "",
        }
    }

    fn segments(self, text: &str) -> Vec<&str> {
        match self {
            Self::Paragraph => text.split("\n\n").collect(),
            Self::Line => text.split('\n').collect(),
            Self::Sentence => split_on_sentences(text),
            Self::Word => text.split_whitespace().collect(),
            Self::Char => vec![text],
        }
    }
}

/// Deterministic recursive splitter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    size: usize,
    overlap: usize,
}

impl Chunker {
    /// Chunks of at most `size` characters sharing up to `overlap`
    ///
    /// `size` is at least 1 and `overlap` is kept below `size`.
    #[must_use]
    pub fn new(size: usize, overlap: usize) -> Self {
        let size = size.max(1);
        Self {
            size,
            overlap: overlap.min(size - 1),
        }
    }

    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    #[must_use]
    pub const fn overlap(&self) -> usize {
        self.overlap
    }

    /// Split `text` into trimmed, non-empty chunks in document order
    #[must_use]
    pub fn split(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        self.split_level(text, SplitLevel::Paragraph)
    }

    fn split_level(&self, text: &str, level: SplitLevel) -> Vec<String> {
        if level == SplitLevel::Char {
            return self.hard_split(text);
        }

        let joiner = level.joiner();
        let joiner_len = joiner.chars().count();
        let mut chunks = Vec::new();
        let mut window: Vec<&str> = Vec::new();

        for segment in level.segments(text) {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }
            let segment_len = char_len(segment);

            if segment_len > self.size {
                // Too big at this level: flush and recurse one level finer
                if !window.is_empty() {
                    chunks.push(window.join(joiner));
                    window.clear();
                }
                chunks.extend(self.split_level(segment, level.finer()));
                continue;
            }

            let mut current = joined_len(&window, joiner_len);
            if !window.is_empty() && current + joiner_len + segment_len > self.size {
                chunks.push(window.join(joiner));

                // Keep a tail of the flushed chunk as overlap for the next one
                while !window.is_empty()
                    && (current > self.overlap || current + joiner_len + segment_len > self.size)
                {
                    window.remove(0);
                    current = joined_len(&window, joiner_len);
                }
            }

            window.push(segment);
        }

        if !window.is_empty() {
            chunks.push(window.join(joiner));
        }

        chunks
    }

    /// Fixed-width character windows, for text with no usable boundary
    fn hard_split(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        let step = self.size - self.overlap;
        let mut chunks = Vec::new();
        let mut start = 0;

        while start < chars.len() {
            let end = (start + self.size).min(chars.len());
            let chunk: String = chars[start..end].iter().collect();
            let chunk = chunk.trim();
            if !chunk.is_empty() {
                chunks.push(chunk.to_string());
            }
            if end == chars.len() {
                break;
            }
            start += step;
        }

        chunks
    }
}

/// Split text after sentence-ending punctuation followed by whitespace
///
/// The punctuation stays attached to the preceding segment.
fn split_on_sentences(text: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        let is_sentence_end =
            matches!(c, '.' | '!' | '?') && chars.peek().is_some_and(|&(_, next)| next.is_whitespace());

        if is_sentence_end {
            let end = i + c.len_utf8();
            segments.push(&text[start..end]);
            start = end;
        }
    }

    if start < text.len() {
        segments.push(&text[start..]);
    }

    segments
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

fn joined_len(window: &[&str], joiner_len: usize) -> usize {
    if window.is_empty() {
        return 0;
    }
    window.iter().map(|s| char_len(s)).sum::<usize>() + joiner_len * (window.len() - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_returns_empty() {
        assert!(Chunker::new(100, 10).split("").is_empty());
        assert!(Chunker::new(100, 10).split("  \n\n ").is_empty());
    }

    #[test]
    fn text_within_limit_returns_single_chunk() {
        let chunks = Chunker::new(100, 10).split("  Hello, world!\n");
        assert_eq!(chunks, vec!["Hello, world!"]);
    }

    #[test]
    fn paragraphs_merge_when_they_fit() {
        let chunks = Chunker::new(100, 0).split("A.\n\nB.\n\nC.");
        assert_eq!(chunks, vec!["A.\n\nB.\n\nC."]);
    }

    #[test]
    fn paragraph_boundaries_are_preferred() {
        let text = "First paragraph here.\n\nSecond paragraph here.";
        let chunks = Chunker::new(30, 0).split(text);
        assert_eq!(chunks, vec!["First paragraph here.", "Second paragraph here."]);
    }

    #[test]
    fn falls_back_to_sentences() {
        let text = "Flood damage is covered under Section 4. Fire damage is covered under Section 7.";
        let chunks = Chunker::new(45, 0).split(text);
        assert_eq!(
            chunks,
            vec![
                "Flood damage is covered under Section 4.",
                "Fire damage is covered under Section 7."
            ]
        );
    }

    #[test]
    fn sentence_split_keeps_punctuation_and_decimals() {
        assert_eq!(
            split_on_sentences("Rate is 4.5 percent. Really? Yes!"),
            vec!["Rate is 4.5 percent.", " Really?", " Yes!"]
        );
    }

    #[test]
    fn word_overlap_carries_trailing_context() {
        let chunks = Chunker::new(13, 5).split("one two three four five six");
        assert_eq!(chunks, vec!["one two three", "three four", "four five six"]);
    }

    #[test]
    fn long_words_are_hard_split_on_char_boundaries() {
        let chunks = Chunker::new(4, 1).split("ééééééé");
        assert_eq!(chunks, vec!["éééé", "éééé"]);
        assert!(chunks.iter().all(|c| c.chars().count() <= 4));
    }

    #[test]
    fn chunks_never_exceed_size() {
        let text = "Coverage A applies to the dwelling. Coverage B applies to other structures.\n\
                    Coverage C covers personal property, subject to the limits in the declarations.\n\n\
                    Exclusions: earth movement, flood, and wear and tear are not covered.";
        let chunks = Chunker::new(40, 10).split(text);
        assert!(chunks.len() > 3);
        assert!(chunks.iter().all(|c| c.chars().count() <= 40));
        assert!(chunks.iter().all(|c| !c.trim().is_empty()));
    }

    #[test]
    fn splitting_is_deterministic() {
        let text = "Alpha beta gamma. Delta epsilon.\n\nZeta eta theta iota kappa lambda mu.";
        let chunker = Chunker::new(20, 6);
        assert_eq!(chunker.split(text), chunker.split(text));
    }

    #[test]
    fn overlap_is_kept_below_size() {
        let chunker = Chunker::new(10, 50);
        assert_eq!(chunker.overlap(), 9);
        assert_eq!(Chunker::new(0, 0).size(), 1);
    }
}
