use tracing::info;

use super::{Chunk, Document};
use crate::config::ChunkConfig;
use crate::error::{RagError, Result};

/// Splits a document into overlapping character windows.
///
/// Each window holds at most `chunk_size` characters and starts
/// `chunk_size - overlap` characters after the previous one. When the window
/// after the current one would be shorter than `min_chunk_size`, the final
/// chunk is instead anchored to the end of the document, absorbing the tail
/// without emitting a tiny fragment. Documents no longer than `chunk_size`
/// yield exactly one chunk; blank documents yield none.
pub fn chunk(document: &Document, config: &ChunkConfig) -> Result<Vec<Chunk>> {
    config
        .validate()
        .map_err(|e| RagError::Config(e.to_string()))?;

    if document.text.trim().is_empty() {
        info!("Skipping empty document: {}", document.id);
        return Ok(Vec::new());
    }

    let spans = split_spans(&document.text, config);
    let boundaries = char_boundaries(&document.text);

    Ok(spans
        .into_iter()
        .enumerate()
        .map(|(position, (start, end))| Chunk {
            document_id: document.id.clone(),
            position,
            text: document.text[boundaries[start]..boundaries[end]].to_string(),
            start,
            end,
            language: document.language,
        })
        .collect())
}

/// Chunk every document, concatenating the results in input order.
pub fn chunk_all(documents: &[Document], config: &ChunkConfig) -> Result<Vec<Chunk>> {
    let mut chunks = Vec::new();
    for doc in documents {
        chunks.extend(chunk(doc, config)?);
    }
    Ok(chunks)
}

/// Compute `(start, end)` character spans for a non-empty text.
fn split_spans(text: &str, config: &ChunkConfig) -> Vec<(usize, usize)> {
    let len = text.chars().count();
    let size = config.chunk_size;

    if len <= size {
        return vec![(0, len)];
    }

    let step = size - config.overlap;
    let mut spans = Vec::new();
    let mut start = 0;

    loop {
        let end = (start + size).min(len);
        spans.push((start, end));
        if end == len {
            break;
        }

        let next = start + step;
        if len - next < config.min_chunk_size {
            // len > size here, so the anchored window is full-sized
            spans.push((len - size, len));
            break;
        }
        start = next;
    }

    spans
}

/// Byte offset of every char index, plus the text length as a sentinel.
fn char_boundaries(text: &str) -> Vec<usize> {
    text.char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(chunk_size: usize, overlap: usize, min_chunk_size: usize) -> ChunkConfig {
        ChunkConfig {
            chunk_size,
            overlap,
            min_chunk_size,
        }
    }

    fn assert_covers(text: &str, chunks: &[Chunk], max: usize) {
        let len = text.chars().count();
        assert_eq!(chunks.first().unwrap().start, 0);
        assert_eq!(chunks.last().unwrap().end, len);
        for pair in chunks.windows(2) {
            assert!(pair[1].start <= pair[0].end, "gap between chunks");
            assert!(pair[1].start > pair[0].start, "no forward progress");
        }
        for c in chunks {
            let len = c.end - c.start;
            assert!(len <= max, "chunk longer than {max}");
            assert_eq!(c.text.chars().count(), len);
            let expected: String = text.chars().skip(c.start).take(len).collect();
            assert_eq!(c.text, expected);
        }
    }

    #[test]
    fn test_short_document_single_chunk() {
        let doc = Document::new("doc1", "Paris is the capital of France.");
        let chunks = chunk(&doc, &config(500, 50, 20)).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, doc.text);
        assert_eq!(chunks[0].position, 0);
        assert_eq!(chunks[0].document_id, "doc1");
    }

    #[test]
    fn test_short_document_below_min_still_one_chunk() {
        let doc = Document::new("tiny", "Hi.");
        let chunks = chunk(&doc, &config(100, 10, 20)).unwrap();
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn test_empty_document_skipped() {
        let doc = Document::new("empty", "");
        assert!(chunk(&doc, &config(100, 10, 5)).unwrap().is_empty());

        let blank = Document::new("blank", "  \n\t ");
        assert!(chunk(&blank, &config(100, 10, 5)).unwrap().is_empty());
    }

    #[test]
    fn test_overlap_must_be_smaller_than_chunk_size() {
        let doc = Document::new("d", "some text");
        let err = chunk(&doc, &config(10, 10, 0)).unwrap_err();
        assert!(matches!(err, RagError::Config(_)));

        let err = chunk(&doc, &config(10, 20, 0)).unwrap_err();
        assert!(matches!(err, RagError::Config(_)));
    }

    #[test]
    fn test_windows_advance_by_step() {
        let text = "abcdefghijklmnopqrstuvwxyz";
        let doc = Document::new("alpha", text);
        let chunks = chunk(&doc, &config(10, 3, 0)).unwrap();
        let spans: Vec<(usize, usize)> = chunks.iter().map(|c| (c.start, c.end)).collect();
        assert_eq!(spans, vec![(0, 10), (7, 17), (14, 24), (21, 26)]);
        assert_covers(text, &chunks, 10);
    }

    #[test]
    fn test_tiny_tail_is_merged() {
        // 26 chars, size 10, overlap 3: last window would be (21, 26), 5 chars
        let text = "abcdefghijklmnopqrstuvwxyz";
        let doc = Document::new("alpha", text);
        let chunks = chunk(&doc, &config(10, 3, 6)).unwrap();
        let spans: Vec<(usize, usize)> = chunks.iter().map(|c| (c.start, c.end)).collect();
        assert_eq!(spans, vec![(0, 10), (7, 17), (14, 24), (16, 26)]);
        assert!(chunks.iter().all(|c| c.end - c.start >= 6));
        assert_covers(text, &chunks, 10);
    }

    #[test]
    fn test_consecutive_chunks_overlap() {
        let text = "x".repeat(1234);
        let doc = Document::new("long", text.clone());
        let chunks = chunk(&doc, &config(100, 25, 10)).unwrap();
        for pair in chunks.windows(2) {
            assert!(pair[0].end - pair[1].start >= 25);
        }
        assert_covers(&text, &chunks, 100);
    }

    #[test]
    fn test_coverage_across_configs() {
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(37);
        let doc = Document::new("fox", text.clone());
        for (size, overlap, min) in [(50, 0, 0), (50, 10, 5), (64, 63, 1), (97, 13, 40), (7, 2, 7)] {
            let chunks = chunk(&doc, &config(size, overlap, min)).unwrap();
            assert_covers(&text, &chunks, size);
            for (i, c) in chunks.iter().enumerate() {
                assert_eq!(c.position, i);
            }
        }
    }

    #[test]
    fn test_multibyte_offsets_are_chars() {
        let text = "これは日本語のテストです。".repeat(10);
        let doc = Document::new("ja.txt", text.clone());
        let chunks = chunk(&doc, &config(40, 10, 5)).unwrap();
        assert!(chunks.len() > 1);
        assert_covers(&text, &chunks, 40);
        assert!(chunks.iter().all(|c| c.language == crate::lang::Language::Ja));
    }

    #[test]
    fn test_chunking_is_deterministic() {
        let doc = Document::new("d", "Lorem ipsum dolor sit amet. ".repeat(40));
        let cfg = config(120, 30, 15);
        assert_eq!(chunk(&doc, &cfg).unwrap(), chunk(&doc, &cfg).unwrap());
    }

    #[test]
    fn test_chunk_all_keeps_document_order() {
        let docs = vec![
            Document::new("a", "first document"),
            Document::new("empty", ""),
            Document::new("b", "second document"),
        ];
        let chunks = chunk_all(&docs, &config(100, 10, 0)).unwrap();
        let ids: Vec<&str> = chunks.iter().map(|c| c.document_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
