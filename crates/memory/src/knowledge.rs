//! Keyword-scored, in-memory knowledge index over chunked documents.
//!
//! Documents are split into overlapping chunks. A chunk's score for a query
//! is the fraction of distinct query terms it contains. Words are runs of
//! alphanumeric characters; CJK ideographs and kana count as one term each.

use async_trait::async_trait;
use parley_core::error::RetrievalError;
use parley_core::retrieval::{KnowledgeIndex, RetrievedSnippet};
use std::collections::HashSet;
use std::path::Path;
use tokio::sync::RwLock;
use tracing::{debug, info};

struct Chunk {
    source_id: String,
    text: String,
    terms: HashSet<String>,
}

/// A knowledge index held entirely in memory.
pub struct InMemoryKnowledgeIndex {
    chunks: RwLock<Vec<Chunk>>,
    chunk_size: usize,
    chunk_overlap: usize,
}

impl InMemoryKnowledgeIndex {
    /// `chunk_size` and `chunk_overlap` are measured in characters.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunks: RwLock::new(Vec::new()),
            chunk_size: chunk_size.max(1),
            chunk_overlap: chunk_overlap.min(chunk_size.saturating_sub(1)),
        }
    }

    /// Index a document. Returns the number of chunks added.
    pub async fn add_document(&self, source_id: impl Into<String>, text: &str) -> usize {
        let source_id = source_id.into();
        let new_chunks: Vec<Chunk> = split_chunks(text, self.chunk_size, self.chunk_overlap)
            .into_iter()
            .map(|text| Chunk {
                source_id: source_id.clone(),
                terms: terms(&text),
                text,
            })
            .collect();

        let added = new_chunks.len();
        self.chunks.write().await.extend(new_chunks);
        debug!(source = %source_id, chunks = added, "Indexed document");
        added
    }

    /// Index every `.md` and `.txt` file directly inside `dir`, in name order.
    pub async fn load_dir(&self, dir: &Path) -> std::io::Result<usize> {
        let mut paths = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let indexable = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("md") || e.eq_ignore_ascii_case("txt"));
            if indexable && path.is_file() {
                paths.push(path);
            }
        }
        paths.sort();

        let mut total = 0;
        for path in &paths {
            let text = tokio::fs::read_to_string(path).await?;
            let source_id = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            total += self.add_document(source_id, &text).await;
        }

        info!(dir = %dir.display(), files = paths.len(), chunks = total, "Loaded knowledge documents");
        Ok(total)
    }

    pub async fn len(&self) -> usize {
        self.chunks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.chunks.read().await.is_empty()
    }
}

impl Default for InMemoryKnowledgeIndex {
    fn default() -> Self {
        Self::new(1000, 200)
    }
}

#[async_trait]
impl KnowledgeIndex for InMemoryKnowledgeIndex {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn search(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievedSnippet>, RetrievalError> {
        let query_terms = terms(query);
        if query_terms.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let chunks = self.chunks.read().await;
        let mut hits: Vec<RetrievedSnippet> = chunks
            .iter()
            .filter_map(|chunk| {
                let matched = query_terms.iter().filter(|t| chunk.terms.contains(*t)).count();
                (matched > 0).then(|| RetrievedSnippet {
                    source_id: chunk.source_id.clone(),
                    text: chunk.text.clone(),
                    score: matched as f32 / query_terms.len() as f32,
                })
            })
            .collect();

        // Stable: equal scores keep insertion order.
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(top_k);
        Ok(hits)
    }
}

/// Split text into windows of at most `size` characters, each starting
/// `overlap` characters before the previous one ended. Windows prefer to end
/// on whitespace in their back half.
fn split_chunks(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let mut end = (start + size).min(chars.len());
        if end < chars.len() {
            if let Some(pos) = (start + size / 2..end).rev().find(|&i| chars[i].is_whitespace()) {
                end = pos + 1;
            }
        }

        let chunk: String = chars[start..end].iter().collect();
        let chunk = chunk.trim();
        if !chunk.is_empty() {
            chunks.push(chunk.to_string());
        }

        if end >= chars.len() {
            break;
        }
        start = end.saturating_sub(overlap).max(start + 1);
    }

    chunks
}

fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{3040}'..='\u{30FF}'   // kana
        | '\u{3400}'..='\u{4DBF}' // CJK extension A
        | '\u{4E00}'..='\u{9FFF}' // CJK unified
        | '\u{AC00}'..='\u{D7AF}' // hangul
    )
}

fn terms(text: &str) -> HashSet<String> {
    let mut out = HashSet::new();
    let mut word = String::new();

    for c in text.chars() {
        if is_cjk(c) {
            if !word.is_empty() {
                out.insert(std::mem::take(&mut word));
            }
            out.insert(c.to_string());
        } else if c.is_alphanumeric() {
            word.extend(c.to_lowercase());
        } else if !word.is_empty() {
            out.insert(std::mem::take(&mut word));
        }
    }
    if !word.is_empty() {
        out.insert(word);
    }

    out
}
