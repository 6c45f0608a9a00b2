//! Splits document text into overlapping word windows for embedding and search.
//!
//! Window `k` covers words `[k * stride, k * stride + chunk_size)` with
//! `stride = chunk_size - overlap`, clipped to the end of the text. The last
//! window is the first one that reaches the final word; a trailing window made
//! only of overlap words is never emitted.

use serde::{Deserialize, Serialize};

use crate::documents::Document;

/// Default window size in words.
pub const DEFAULT_CHUNK_SIZE: usize = 400;
/// Default overlap between consecutive windows, in words.
pub const DEFAULT_OVERLAP: usize = 50;

/// A chunk of text from a document, with source reference.
/// Also the record type stored in the metadata file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub filename: String,
    /// Index of this chunk within its document (0, 1, 2, …), gap-free.
    pub chunk_id: usize,
    pub text: String,
}

/// Validated window parameters. The only way to build one is [`ChunkParams::new`],
/// so the stride is always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkParams {
    chunk_size: usize,
    overlap: usize,
}

impl ChunkParams {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, ChunkError> {
        if chunk_size == 0 {
            return Err(ChunkError::ZeroChunkSize);
        }
        if overlap >= chunk_size {
            return Err(ChunkError::OverlapTooLarge {
                chunk_size,
                overlap,
            });
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    pub fn stride(&self) -> usize {
        self.chunk_size - self.overlap
    }
}

impl Default for ChunkParams {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_OVERLAP,
        }
    }
}

/// Splits whitespace-separated words of `text` into window strings.
pub fn split_words(text: &str, params: ChunkParams) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    let mut windows = Vec::new();
    let mut start = 0;
    while start < words.len() {
        let end = (start + params.chunk_size).min(words.len());
        windows.push(words[start..end].join(" "));
        if end == words.len() {
            break;
        }
        start += params.stride();
    }
    windows
}

/// Chunk a single document. Empty documents produce no chunks.
pub fn chunk_document(doc: &Document, params: ChunkParams) -> Vec<Chunk> {
    split_words(&doc.text, params)
        .into_iter()
        .enumerate()
        .map(|(chunk_id, text)| Chunk {
            filename: doc.filename.clone(),
            chunk_id,
            text,
        })
        .collect()
}

/// Chunk all documents. Returns chunks in document order, then chunk order.
pub fn chunk_documents(docs: &[Document], params: ChunkParams) -> Vec<Chunk> {
    docs.iter().flat_map(|d| chunk_document(d, params)).collect()
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChunkError {
    #[error("chunk_size must be at least 1 word")]
    ZeroChunkSize,
    #[error("overlap ({overlap}) must be smaller than chunk_size ({chunk_size})")]
    OverlapTooLarge { chunk_size: usize, overlap: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ")
    }

    fn expected_count(w: usize, c: usize, o: usize) -> usize {
        if w == 0 {
            return 0;
        }
        let num = w.saturating_sub(o).max(1);
        num.div_ceil(c - o)
    }

    #[test]
    fn rejects_bad_params() {
        assert_eq!(ChunkParams::new(0, 0), Err(ChunkError::ZeroChunkSize));
        assert_eq!(
            ChunkParams::new(5, 5),
            Err(ChunkError::OverlapTooLarge {
                chunk_size: 5,
                overlap: 5
            })
        );
        assert!(ChunkParams::new(5, 9).is_err());
        assert!(ChunkParams::new(5, 4).is_ok());
    }

    #[test]
    fn empty_text_has_no_chunks() {
        let p = ChunkParams::new(5, 1).unwrap();
        assert!(split_words("", p).is_empty());
        assert!(split_words("   \n ", p).is_empty());
    }

    #[test]
    fn windows_follow_stride_and_clip() {
        let p = ChunkParams::new(5, 1).unwrap();
        let c = split_words("The annual tech fest happens every March.", p);
        assert_eq!(c, ["The annual tech fest happens", "happens every March."]);
    }

    #[test]
    fn no_overlap_only_tail() {
        // 5 words, window 5, overlap 1: the first window already covers everything.
        let p = ChunkParams::new(5, 1).unwrap();
        assert_eq!(split_words(&words(5), p).len(), 1);
    }

    #[test]
    fn count_and_content_match_window_formula() {
        for c in 1..7 {
            for o in 0..c {
                let p = ChunkParams::new(c, o).unwrap();
                for w in 0..25 {
                    let text = words(w);
                    let all: Vec<&str> = text.split_whitespace().collect();
                    let chunks = split_words(&text, p);
                    assert_eq!(chunks.len(), expected_count(w, c, o), "w={w} c={c} o={o}");
                    for (k, chunk) in chunks.iter().enumerate() {
                        let start = k * (c - o);
                        let end = (start + c).min(w);
                        assert_eq!(chunk, &all[start..end].join(" "));
                    }
                }
            }
        }
    }

    #[test]
    fn chunk_ids_are_per_document_and_ordered() {
        let docs = vec![
            Document {
                filename: "a.txt".into(),
                text: words(9),
            },
            Document {
                filename: "empty.txt".into(),
                text: String::new(),
            },
            Document {
                filename: "b.txt".into(),
                text: words(3),
            },
        ];
        let chunks = chunk_documents(&docs, ChunkParams::new(5, 1).unwrap());
        let ids: Vec<_> = chunks
            .iter()
            .map(|c| (c.filename.as_str(), c.chunk_id))
            .collect();
        assert_eq!(ids, [("a.txt", 0), ("a.txt", 1), ("b.txt", 0)]);
        assert!(chunks.iter().all(|c| !c.text.is_empty()));
    }
}
