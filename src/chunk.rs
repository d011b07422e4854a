//! Fixed-window text chunker with overlap.
//!
//! Splits document text into windows of `target_size` characters, each
//! starting `overlap` characters before the previous one ended. When a
//! newline sits just past the naive window end (within
//! [`SNAP_LOOKAHEAD`] characters) the window is stretched to include it so
//! chunks tend to end on line or paragraph boundaries instead of
//! mid-sentence.
//!
//! Positions and lengths are counted in characters (Unicode scalar values),
//! never bytes.

/// How far past the naive window end a newline may pull the boundary.
pub const SNAP_LOOKAHEAD: usize = 150;

/// Split `text` into overlapping chunks.
///
/// - Empty or whitespace-only text yields no chunks.
/// - `target_size == 0` yields the whole trimmed text as a single chunk.
/// - Each emitted chunk is trimmed; chunks that trim to nothing are dropped.
/// - A tail no longer than `overlap` is folded into the last window.
/// - The cursor always moves forward, even if `overlap >= target_size`.
pub fn chunk_text(text: &str, target_size: usize, overlap: usize) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }
    if target_size == 0 {
        return vec![text.to_string()];
    }

    // Byte offset of every char, plus the end of the text.
    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(b, _)| b)
        .chain(std::iter::once(text.len()))
        .collect();
    let n = bounds.len() - 1;

    let mut chunks = Vec::new();
    let mut i = 0usize;

    loop {
        let mut j = (i + target_size).min(n);
        if j < n {
            if let Some(newline) = newline_after(text, &bounds, j) {
                j = newline + 1;
            }
            if n - j <= overlap {
                j = n;
            }
        }

        let piece = text[bounds[i]..bounds[j]].trim();
        if !piece.is_empty() {
            chunks.push(piece.to_string());
        }

        if j >= n {
            break;
        }

        let next = j.saturating_sub(overlap);
        i = if next > i { next } else { j };
    }

    chunks
}

/// Char position of the first `\n` in `[from, from + SNAP_LOOKAHEAD)`.
fn newline_after(text: &str, bounds: &[usize], from: usize) -> Option<usize> {
    let n = bounds.len() - 1;
    let until = (from + SNAP_LOOKAHEAD).min(n);
    let window = &text[bounds[from]..bounds[until]];
    let byte = bounds[from] + window.find('\n')?;
    bounds.binary_search(&byte).ok()
}
