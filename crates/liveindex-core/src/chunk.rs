//! Boundary-aware text chunker with overlap and exact byte offsets.
//!
//! Splits document content into ordered [`Segment`]s of at most
//! `target_size` bytes. Each segment's `text` is a verbatim slice of the
//! input, so `&content[offset..offset + text.len()] == text` always holds
//! and citations can point back into the original document.
//!
//! # Algorithm
//!
//! 1. Take a window of `target_size` bytes starting at the cursor, snapped
//!    back to a UTF-8 char boundary.
//! 2. If the window does not reach the end of the content, move its end
//!    back to the last paragraph break (`\n\n`), line break, sentence end
//!    (`". "`), or space found in the second half of the window.
//! 3. Emit the window unless it is whitespace only.
//! 4. Advance the cursor to `end - overlap` (never backwards past the
//!    previous cursor).
//! 5. Non-empty input always yields at least one segment.
//!
//! The output depends only on the input and the parameters, which keeps
//! document-level content hashing meaningful for no-op detection.
//!
//! # Example
//!
//! ```rust
//! use liveindex_core::chunk::{chunk_text, ChunkParams};
//!
//! let params = ChunkParams { target_size: 500, overlap: 50 };
//! let segments = chunk_text("Refunds are accepted within 30 days.", &params);
//! assert_eq!(segments.len(), 1);
//! assert_eq!(segments[0].offset, 0);
//! ```

use sha2::{Digest, Sha256};

/// Break candidates in order of preference, with the length of the
/// separator that stays in the earlier segment.
const BREAKS: [&str; 4] = ["\n\n", "\n", ". ", " "];

/// Chunking parameters. Sizes are in UTF-8 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkParams {
    pub target_size: usize,
    pub overlap: usize,
}

impl Default for ChunkParams {
    fn default() -> Self {
        Self {
            target_size: 500,
            overlap: 50,
        }
    }
}

/// A contiguous slice of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub text: String,
    /// Byte offset of `text` in the source content.
    pub offset: usize,
}

/// Split `content` into ordered, overlapping segments.
///
/// Returns an empty vector only for empty input.
pub fn chunk_text(content: &str, params: &ChunkParams) -> Vec<Segment> {
    if content.is_empty() {
        return Vec::new();
    }

    let target = params.target_size.max(1);
    let overlap = params.overlap.min(target - 1);

    let mut segments = Vec::new();
    let mut start = 0usize;

    while start < content.len() {
        let mut hard_end = snap_to_char_boundary(content, start + target);
        if hard_end <= start {
            // A single char wider than the target.
            hard_end = next_char_boundary(content, start);
        }

        let end = if hard_end >= content.len() {
            content.len()
        } else {
            find_break(content, start, hard_end)
        };

        let piece = &content[start..end];
        if !piece.trim().is_empty() {
            segments.push(Segment {
                text: piece.to_string(),
                offset: start,
            });
        }

        if end >= content.len() {
            break;
        }

        let next = snap_to_char_boundary(content, end.saturating_sub(overlap));
        start = if next > start { next } else { end };
    }

    if segments.is_empty() {
        segments.push(Segment {
            text: content.to_string(),
            offset: 0,
        });
    }

    segments
}

/// Last preferred break in the second half of `[start, hard_end)`, or
/// `hard_end` when there is none.
fn find_break(content: &str, start: usize, hard_end: usize) -> usize {
    let lo = snap_to_char_boundary(content, start + (hard_end - start) / 2);
    let window = &content[lo..hard_end];
    for sep in BREAKS {
        if let Some(pos) = window.rfind(sep) {
            let end = lo + pos + sep.len();
            if end > start {
                return end;
            }
        }
    }
    hard_end
}

/// Snap a byte index back to the nearest valid UTF-8 char boundary.
fn snap_to_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn next_char_boundary(s: &str, index: usize) -> usize {
    s[index..]
        .char_indices()
        .nth(1)
        .map(|(i, _)| index + i)
        .unwrap_or(s.len())
}

/// Hex SHA-256 of raw document content.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Deterministic chunk id for `(document_id, version, offset)`.
///
/// A retried cycle for the same version produces the same ids, so its
/// upserts overwrite any partial writes from the failed attempt.
pub fn chunk_id(document_id: &str, version: u64, offset: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(version.to_le_bytes());
    hasher.update([0u8]);
    hasher.update((offset as u64).to_le_bytes());
    let hex = format!("{:x}", hasher.finalize());
    hex[..32].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(target_size: usize, overlap: usize) -> ChunkParams {
        ChunkParams {
            target_size,
            overlap,
        }
    }

    fn assert_offsets_exact(content: &str, segments: &[Segment]) {
        for s in segments {
            assert_eq!(&content[s.offset..s.offset + s.text.len()], s.text);
        }
    }

    #[test]
    fn test_small_text_single_segment() {
        let segments = chunk_text("Hello, world!", &params(500, 50));
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].text, "Hello, world!");
        assert_eq!(segments[0].offset, 0);
    }

    #[test]
    fn test_empty_text() {
        assert!(chunk_text("", &params(500, 50)).is_empty());
    }

    #[test]
    fn test_whitespace_only_is_never_empty() {
        let segments = chunk_text("   \n\n  ", &params(4, 1));
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].offset, 0);
    }

    #[test]
    fn test_offsets_point_into_source() {
        let text = (0..40)
            .map(|i| format!("Paragraph number {} talks about refunds.", i))
            .collect::<Vec<_>>()
            .join("\n\n");
        let segments = chunk_text(&text, &params(120, 20));
        assert!(segments.len() > 1);
        assert_offsets_exact(&text, &segments);
        for pair in segments.windows(2) {
            assert!(pair[1].offset > pair[0].offset);
        }
    }

    #[test]
    fn test_prefers_paragraph_breaks() {
        let text = "First paragraph here.\n\nSecond paragraph here.";
        let segments = chunk_text(text, &params(30, 0));
        assert_eq!(segments[0].text, "First paragraph here.\n\n");
        assert_eq!(segments[1].offset, 23);
    }

    #[test]
    fn test_overlap_repeats_tail() {
        let text = "aaaa bbbb cccc dddd eeee ffff gggg hhhh";
        let segments = chunk_text(text, &params(15, 5));
        assert!(segments.len() > 2);
        for pair in segments.windows(2) {
            let prev_end = pair[0].offset + pair[0].text.len();
            assert!(pair[1].offset < prev_end, "segments should overlap");
        }
        assert_offsets_exact(text, &segments);
    }

    #[test]
    fn test_covers_whole_content() {
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(20);
        let segments = chunk_text(&text, &params(64, 8));
        let last = segments.last().unwrap();
        assert_eq!(last.offset + last.text.len(), text.len());
    }

    #[test]
    fn test_overlap_not_smaller_than_target_still_progresses() {
        let segments = chunk_text("abcdefghij", &params(3, 10));
        assert!(!segments.is_empty());
        let last = segments.last().unwrap();
        assert_eq!(last.offset + last.text.len(), 10);
    }

    #[test]
    fn test_multibyte_utf8_chars() {
        let text = "┌──────────────────┐\n│ Hello world      │\n└──────────────────┘";
        let segments = chunk_text(text, &params(7, 2));
        assert!(!segments.is_empty());
        assert_offsets_exact(text, &segments);
    }

    #[test]
    fn test_deterministic() {
        let text = "Alpha\n\nBeta\n\nGamma\n\nDelta";
        assert_eq!(
            chunk_text(text, &params(8, 2)),
            chunk_text(text, &params(8, 2))
        );
    }

    #[test]
    fn test_chunk_id_depends_on_version_and_offset() {
        let a = chunk_id("doc.md", 1, 0);
        assert_eq!(a, chunk_id("doc.md", 1, 0));
        assert_ne!(a, chunk_id("doc.md", 2, 0));
        assert_ne!(a, chunk_id("doc.md", 1, 10));
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn test_content_hash_changes_with_content() {
        assert_ne!(content_hash(b"30 days"), content_hash(b"45 days"));
        assert_eq!(content_hash(b"same"), content_hash(b"same"));
    }
}
