#[cfg(test)]
mod tests;

use tracing::debug;

/// Sentence terminator used to split documents into chunks
pub const CHUNK_TERMINATOR: char = '.';

/// Lazily split `input` into sentence-sized chunks.
///
/// Splits on `.`, trims each segment and skips empty ones. This is a heuristic:
/// abbreviations, decimal prices and non-Latin punctuation such as `。` are not
/// treated specially, so callers must tolerate over- or under-segmentation.
#[inline]
pub fn chunks(input: &str) -> impl Iterator<Item = &str> {
    input
        .split(CHUNK_TERMINATOR)
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
}

/// Eager, owned version of [`chunks`], ready to hand to an embedder
#[inline]
pub fn generate_chunks(input: &str) -> Vec<String> {
    let result: Vec<String> = chunks(input).map(str::to_string).collect();
    debug!(
        "Split {} bytes of content into {} chunks",
        input.len(),
        result.len()
    );
    result
}

/// Number of chunks `input` would produce
#[inline]
pub fn chunk_count(input: &str) -> usize {
    chunks(input).count()
}
