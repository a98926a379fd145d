//! Text normalization and chunking

use crate::config::ChunkingConfig;
use regex::Regex;

/// Word-per-token expansion used when converting token budgets to word counts
const WORDS_PER_TOKEN: f32 = 1.3;

/// Estimate the token count of a text as ceil(len / 4).
///
/// Single source of truth for both chunk sizing and reported token counts.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

/// An emitted chunk with offsets into the normalized source text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub content: String,
    /// Dense 0-based position within the document
    pub index: usize,
    /// Byte range within the normalized text
    pub start_offset: usize,
    pub end_offset: usize,
    pub token_count: usize,
}

/// Splits normalized text into overlapping, size-bounded chunks.
///
/// Pure and deterministic: no I/O, identical input yields identical chunks.
pub struct TextChunker {
    config: ChunkingConfig,
    spaces_re: Regex,
    newlines_re: Regex,
}

impl TextChunker {
    pub fn new(config: ChunkingConfig) -> Self {
        Self {
            config,
            spaces_re: Regex::new(r"[ \t]+").expect("static regex"),
            newlines_re: Regex::new(r"\n{3,}").expect("static regex"),
        }
    }

    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    /// Normalize line endings and whitespace runs before splitting
    pub fn normalize(&self, text: &str) -> String {
        let unified = text.replace("\r\n", "\n").replace('\r', "\n");
        let collapsed = self.spaces_re.replace_all(&unified, " ");
        let squeezed = self.newlines_re.replace_all(&collapsed, "\n\n");
        squeezed.trim().to_string()
    }

    /// Split text into chunks, returning offsets relative to the normalized text.
    ///
    /// Empty or whitespace-only input yields an empty list.
    pub fn chunk(&self, text: &str) -> Vec<TextChunk> {
        let normalized = self.normalize(text);
        if normalized.is_empty() {
            return Vec::new();
        }

        let spans = if self.config.preserve_paragraphs {
            self.paragraph_chunks(&normalized)
        } else {
            let mut spans = Vec::new();
            self.window_chunks(&normalized, 0, normalized.len(), &mut spans);
            spans
        };

        spans
            .into_iter()
            .enumerate()
            .map(|(index, (start, end))| {
                let content = normalized[start..end].to_string();
                let token_count = estimate_tokens(&content);
                TextChunk {
                    content,
                    index,
                    start_offset: start,
                    end_offset: end,
                    token_count,
                }
            })
            .collect()
    }

    /// Greedy paragraph packing with an overlap tail between chunks
    fn paragraph_chunks(&self, text: &str) -> Vec<(usize, usize)> {
        let max_tokens = self.config.chunk_size;
        let min_tokens = self.config.min_chunk_size;

        let mut spans: Vec<(usize, usize)> = Vec::new();
        // Current accumulation as a contiguous byte span of the normalized text
        let mut current: Option<(usize, usize)> = None;

        for (ps, pe) in paragraph_spans(text) {
            let para_tokens = estimate_tokens(&text[ps..pe]);

            // A paragraph that alone exceeds the budget falls back to windowing
            if para_tokens > max_tokens {
                let start = match current.take() {
                    Some((cs, ce)) => {
                        if estimate_tokens(&text[cs..ce]) >= min_tokens {
                            spans.push((cs, ce));
                            ps
                        } else {
                            // Too small to stand alone; fold into the windowed region
                            cs
                        }
                    }
                    None => ps,
                };
                self.window_chunks(text, start, pe, &mut spans);
                continue;
            }

            match current {
                None => current = Some((ps, pe)),
                Some((cs, ce)) => {
                    if estimate_tokens(&text[cs..pe]) <= max_tokens {
                        current = Some((cs, pe));
                    } else if estimate_tokens(&text[cs..ce]) >= min_tokens {
                        spans.push((cs, ce));
                        let tail = self.overlap_tail_start(text, cs, ce);
                        current = Some((tail.unwrap_or(ps), pe));
                    } else {
                        // Below the minimum: keep accumulating rather than
                        // emitting an undersized chunk
                        current = Some((cs, pe));
                    }
                }
            }
        }

        if let Some((cs, ce)) = current {
            if estimate_tokens(&text[cs..ce]) >= min_tokens || spans.is_empty() {
                spans.push((cs, ce));
            } else if let Some(last) = spans.last_mut() {
                // Undersized trailing remainder joins the previous chunk
                last.1 = ce;
            }
        }

        spans
    }

    /// Sliding word-window fallback over `text[start..end]`.
    ///
    /// Window is `chunk_size` tokens worth of words, step is window minus the
    /// overlap; the step is clamped to at least one word so the loop always
    /// makes forward progress.
    fn window_chunks(
        &self,
        text: &str,
        start: usize,
        end: usize,
        out: &mut Vec<(usize, usize)>,
    ) {
        let words = word_spans(&text[start..end], start);
        if words.is_empty() {
            return;
        }

        let window = ((self.config.chunk_size as f32) * WORDS_PER_TOKEN).max(1.0) as usize;
        let overlap = ((self.config.chunk_overlap as f32) * WORDS_PER_TOKEN) as usize;
        let step = window.saturating_sub(overlap).max(1);

        let mut i = 0;
        loop {
            let j = (i + window).min(words.len());
            out.push((words[i].0, words[j - 1].1));
            if j == words.len() {
                break;
            }
            i += step;
        }
    }

    /// Byte offset where the overlap tail of `text[cs..ce]` begins.
    ///
    /// The tail is the last `chunk_overlap` tokens worth of whitespace-delimited
    /// words. Returns None when overlap is disabled or swallows the whole chunk.
    fn overlap_tail_start(&self, text: &str, cs: usize, ce: usize) -> Option<usize> {
        let keep = ((self.config.chunk_overlap as f32) * WORDS_PER_TOKEN) as usize;
        if keep == 0 {
            return None;
        }
        let words = word_spans(&text[cs..ce], cs);
        if words.len() <= keep {
            return None;
        }
        Some(words[words.len() - keep].0)
    }
}

impl Default for TextChunker {
    fn default() -> Self {
        Self::new(ChunkingConfig::default())
    }
}

/// Maximal non-blank paragraph spans of normalized text.
///
/// After normalization, paragraph separators are exactly one blank line.
fn paragraph_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = 0;
    for (i, _) in text.match_indices("\n\n") {
        if i > start {
            spans.push((start, i));
        }
        start = i + 2;
    }
    if start < text.len() {
        spans.push((start, text.len()));
    }
    spans
}

/// Byte spans of whitespace-delimited words, shifted by `base`
fn word_spans(text: &str, base: usize) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start: Option<usize> = None;
    for (i, c) in text.char_indices() {
        if c.is_whitespace() {
            if let Some(s) = start.take() {
                spans.push((base + s, base + i));
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        spans.push((base + s, base + text.len()));
    }
    spans
}
