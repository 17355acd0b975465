//! Sentence-aware text chunking.
//!
//! Language models deliver text in small deltas that rarely line up with
//! phrase boundaries. Sending each delta straight to the synthesizer makes it
//! guess at prosody mid-word, so deltas are buffered until a boundary
//! character is seen and then released as one chunk with a trailing space.

use async_stream::stream;
use futures_core::Stream;
use futures_util::StreamExt;

/// Characters that end a chunk. A lone space counts as a boundary, so any
/// delta starting or ending with a space forces an emission.
pub const BOUNDARIES: [char; 14] = [
    '.', ',', '?', '!', ';', ':', '—', '-', '(', ')', '[', ']', '}', ' ',
];

fn is_boundary(c: char) -> bool {
    BOUNDARIES.contains(&c)
}

/// Buffers tokens into chunks. One instance serves one token stream.
#[derive(Debug, Default)]
pub struct TextChunker {
    buffer: String,
}

impl TextChunker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one token, returning a chunk when a boundary was crossed.
    pub fn push(&mut self, token: &str) -> Option<String> {
        if self.buffer.chars().next_back().is_some_and(is_boundary) {
            let mut chunk = std::mem::replace(&mut self.buffer, token.to_string());
            chunk.push(' ');
            return Some(chunk);
        }

        match token.chars().next() {
            Some(first) if is_boundary(first) => {
                let rest = &token[first.len_utf8()..];
                let mut chunk = std::mem::replace(&mut self.buffer, rest.to_string());
                chunk.push(first);
                chunk.push(' ');
                Some(chunk)
            }
            _ => {
                self.buffer.push_str(token);
                None
            }
        }
    }

    /// Flushes whatever is still pending once the token stream is exhausted.
    pub fn finish(self) -> Option<String> {
        if self.buffer.is_empty() {
            None
        } else {
            let mut chunk = self.buffer;
            chunk.push(' ');
            Some(chunk)
        }
    }
}

/// Turns a token stream into a chunk stream.
pub fn chunk_stream<S>(tokens: S) -> impl Stream<Item = String> + Send
where
    S: Stream<Item = String> + Send,
{
    stream! {
        let mut chunker = TextChunker::new();
        futures_util::pin_mut!(tokens);
        while let Some(token) = tokens.next().await {
            if let Some(chunk) = chunker.push(&token) {
                yield chunk;
            }
        }
        if let Some(chunk) = chunker.finish() {
            yield chunk;
        }
    }
}

/// Chunks a finite token list synchronously.
pub fn chunk_all<I, T>(tokens: I) -> Vec<String>
where
    I: IntoIterator<Item = T>,
    T: AsRef<str>,
{
    let mut chunker = TextChunker::new();
    let mut chunks: Vec<String> = tokens
        .into_iter()
        .filter_map(|token| chunker.push(token.as_ref()))
        .collect();
    chunks.extend(chunker.finish());
    chunks
}
