use std::ops::Range;

use text_splitter::TextSplitter;

/// Split extracted text into retrieval-sized chunks. The splitter respects
/// sentence and word boundaries where it can, so chunks stay readable.
/// Whitespace-only chunks are dropped.
pub fn chunk_text(text: &str, size_range: Range<usize>) -> Vec<String> {
    let splitter = TextSplitter::new(size_range);
    splitter
        .chunks(text)
        .filter(|chunk| !chunk.trim().is_empty())
        .map(str::to_owned)
        .collect()
}
