//! Overlapping text chunker.
//!
//! Splits document text into chunks of at most `max_chars` characters,
//! each carrying the last `overlap_chars` characters of its predecessor
//! as a prefix so retrieval context survives chunk boundaries. Splits
//! prefer paragraph, line, sentence, and word boundaries; a hard
//! character cut happens only when no boundary exists in the window.
//!
//! Stripping the overlap prefix from every chunk and concatenating the
//! remainders reconstructs the original text exactly.

use crate::models::{Chunk, Document};

/// Boundary separators tried in order of preference. A split lands just
/// after the separator.
const SEPARATORS: [&str; 4] = ["\n\n", "\n", ". ", " "];

/// Split a batch of documents. Chunks inherit their parent's `source`;
/// documents with empty text contribute nothing.
pub fn split_documents(documents: &[Document], max_chars: usize, overlap_chars: usize) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    for doc in documents {
        if doc.content.is_empty() {
            continue;
        }
        for (content, overlap) in split_text(&doc.content, max_chars, overlap_chars) {
            chunks.push(Chunk {
                content,
                overlap,
                source: doc.source.clone(),
            });
        }
    }
    chunks
}

/// Split one text into `(content, overlap)` pairs, where `overlap` is the
/// number of leading characters repeated from the previous chunk.
///
/// Limits are measured in characters, not bytes; slicing always lands on
/// UTF-8 boundaries. `overlap_chars` must be smaller than `max_chars`
/// (enforced by config validation; clamped here for safety with direct
/// callers).
pub fn split_text(text: &str, max_chars: usize, overlap_chars: usize) -> Vec<(String, usize)> {
    if text.is_empty() || max_chars == 0 {
        return Vec::new();
    }

    // Byte offset of every char position, plus the end of the text.
    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let total_chars = bounds.len() - 1;

    let overlap_chars = overlap_chars.min(max_chars.saturating_sub(1));

    let mut out = Vec::new();
    let mut start = 0usize; // first char not yet covered by emitted non-overlap content

    while start < total_chars {
        let overlap = if out.is_empty() {
            0
        } else {
            overlap_chars.min(start)
        };
        let chunk_start = start - overlap;
        let limit = chunk_start + max_chars;

        let end = if limit >= total_chars {
            total_chars
        } else {
            find_break(text, &bounds, start, limit)
        };

        out.push((text[bounds[chunk_start]..bounds[end]].to_string(), overlap));
        start = end;
    }

    out
}

/// Pick the split position (char index) in `(start, limit]`, preferring
/// the rightmost boundary separator inside the window. The returned
/// position is always greater than `start`, so every chunk contributes
/// new text and the loop makes progress.
fn find_break(text: &str, bounds: &[usize], start: usize, limit: usize) -> usize {
    let window = &text[bounds[start]..bounds[limit]];
    for sep in SEPARATORS {
        if let Some(pos) = window.rfind(sep) {
            let byte_end = bounds[start] + pos + sep.len();
            // Separators are ASCII, so byte_end is a char boundary.
            return bounds.partition_point(|&b| b < byte_end);
        }
    }
    limit
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reconstruct(pieces: &[(String, usize)]) -> String {
        pieces
            .iter()
            .map(|(content, overlap)| content.chars().skip(*overlap).collect::<String>())
            .collect()
    }

    #[test]
    fn short_text_is_one_chunk() {
        let pieces = split_text("Hello world.", 1000, 200);
        assert_eq!(pieces.len(), 1);
        assert_eq!(pieces[0], ("Hello world.".to_string(), 0));
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(split_text("", 1000, 200).is_empty());
    }

    #[test]
    fn reconstruction_is_lossless() {
        let text = (0..40)
            .map(|i| format!("Paragraph number {} with a little bit of body text.", i))
            .collect::<Vec<_>>()
            .join("\n\n");
        let pieces = split_text(&text, 120, 30);
        assert!(pieces.len() > 1);
        assert_eq!(reconstruct(&pieces), text);
    }

    #[test]
    fn reconstruction_survives_text_without_boundaries() {
        let text: String = std::iter::repeat('x').take(537).collect();
        let pieces = split_text(&text, 100, 20);
        assert_eq!(reconstruct(&pieces), text);
        for (content, _) in &pieces {
            assert!(content.chars().count() <= 100);
            assert!(!content.is_empty());
        }
    }

    #[test]
    fn reconstruction_is_char_safe_for_multibyte_text() {
        let text = "héllø wörld. ".repeat(60);
        let pieces = split_text(&text, 50, 10);
        assert_eq!(reconstruct(&pieces), text);
    }

    #[test]
    fn chunks_respect_max_chars() {
        let text = "word ".repeat(500);
        for (content, _) in split_text(&text, 80, 20) {
            assert!(content.chars().count() <= 80);
        }
    }

    #[test]
    fn overlap_prefix_matches_predecessor_tail() {
        let text = "alpha beta gamma delta ".repeat(40);
        let pieces = split_text(&text, 100, 25);
        for pair in pieces.windows(2) {
            let (prev, _) = &pair[0];
            let (next, overlap) = &pair[1];
            if *overlap > 0 {
                let prev_chars: Vec<char> = prev.chars().collect();
                let tail: String = prev_chars[prev_chars.len() - overlap..].iter().collect();
                let prefix: String = next.chars().take(*overlap).collect();
                assert_eq!(prefix, tail);
            }
        }
    }

    #[test]
    fn splits_prefer_paragraph_boundaries() {
        let para = "Sentence one. Sentence two.";
        let text = format!("{}\n\n{}\n\n{}", para, para, para);
        let pieces = split_text(&text, para.len() + 4, 0);
        // Each split should land after a paragraph separator, so every
        // chunk except the last ends with the separator.
        for (content, _) in &pieces[..pieces.len() - 1] {
            assert!(content.ends_with("\n\n"), "chunk {:?} not on boundary", content);
        }
    }

    #[test]
    fn documents_tag_chunks_with_their_source() {
        let docs = vec![
            Document {
                content: "first file text".to_string(),
                source: "a.txt".to_string(),
            },
            Document {
                content: String::new(),
                source: "empty.txt".to_string(),
            },
            Document {
                content: "second file text".to_string(),
                source: "b.pdf".to_string(),
            },
        ];
        let chunks = split_documents(&docs, 1000, 200);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].source, "a.txt");
        assert_eq!(chunks[1].source, "b.pdf");
    }

    #[test]
    fn deterministic() {
        let text = "Alpha\n\nBeta\n\nGamma\n\nDelta ".repeat(20);
        let a = split_text(&text, 90, 15);
        let b = split_text(&text, 90, 15);
        assert_eq!(a, b);
    }
}
