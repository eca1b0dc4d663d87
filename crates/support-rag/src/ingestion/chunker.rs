//! Section-aware text chunking with sliding-window splitting

use crate::config::ChunkingConfig;
use crate::error::Result;
use crate::types::chunk::GENERAL_SECTION;
use crate::types::Chunk;

use super::normalizer::SECTION_HEADING;

/// A contiguous region of the document starting at a heading line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section<'a> {
    /// Heading line, or `General` for text preceding the first heading
    pub title: String,
    /// Trimmed section text, heading included
    pub text: &'a str,
    /// Character offset of `text` in the document
    pub char_offset: usize,
}

/// One size-bounded window produced by [`DocumentChunker::split_by_size`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Window {
    /// Start character offset (inclusive) in the split text
    pub start: usize,
    /// End character offset (exclusive) in the split text
    pub end: usize,
    /// Trimmed window content
    pub text: String,
}

/// Document chunker with configurable size, overlap and sentence lookback
#[derive(Debug, Clone)]
pub struct DocumentChunker {
    /// Target chunk size in characters
    chunk_size: usize,
    /// Overlap between consecutive windows
    overlap: usize,
    /// Distance searched backwards for a sentence terminal
    sentence_lookback: usize,
}

impl DocumentChunker {
    /// Create a new chunker with the default 100-character sentence lookback
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            overlap,
            sentence_lookback: 100,
        }
    }

    /// Create a chunker from validated configuration
    pub fn from_config(config: &ChunkingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(config.chunk_size, config.overlap)
            .with_sentence_lookback(config.sentence_lookback))
    }

    /// Override the sentence lookback distance
    pub fn with_sentence_lookback(mut self, lookback: usize) -> Self {
        self.sentence_lookback = lookback;
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Chunk a normalized document.
    ///
    /// Sections come out in document order and windows within a section left to
    /// right; `chunk_id` counts across the whole document.
    pub fn chunk_document(&self, text: &str) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        let sections = self.split_sections(text);

        if sections.is_empty() {
            // No headings: size-based splitting over the whole document
            for (idx, window) in self.split_by_size(text).into_iter().enumerate() {
                chunks.push(Chunk::new(
                    chunks.len() as u32,
                    window.text,
                    GENERAL_SECTION.to_string(),
                    idx as u32,
                    window.start,
                    window.end,
                ));
            }
        } else {
            tracing::info!("Found {} sections", sections.len());

            for section in &sections {
                let section_len = section.text.chars().count();

                if section_len > self.chunk_size {
                    for (idx, window) in self.split_by_size(section.text).into_iter().enumerate() {
                        chunks.push(Chunk::new(
                            chunks.len() as u32,
                            window.text,
                            section.title.clone(),
                            idx as u32,
                            section.char_offset + window.start,
                            section.char_offset + window.end,
                        ));
                    }
                } else {
                    chunks.push(Chunk::new(
                        chunks.len() as u32,
                        section.text.to_string(),
                        section.title.clone(),
                        0,
                        section.char_offset,
                        section.char_offset + section_len,
                    ));
                }
            }
        }

        tracing::info!("Created {} chunks", chunks.len());
        chunks
    }

    /// Split text at `Section <digits>:` heading lines.
    ///
    /// Returns an empty list when the text has no headings. Text before the first
    /// heading becomes a `General` section; whitespace-only sections are dropped.
    pub fn split_sections<'a>(&self, text: &'a str) -> Vec<Section<'a>> {
        let starts: Vec<usize> = SECTION_HEADING.find_iter(text).map(|m| m.start()).collect();
        if starts.is_empty() {
            return Vec::new();
        }

        let mut bounds = Vec::with_capacity(starts.len() + 1);
        if starts[0] > 0 {
            bounds.push((0, starts[0], false));
        }
        for (i, &start) in starts.iter().enumerate() {
            let end = starts.get(i + 1).copied().unwrap_or(text.len());
            bounds.push((start, end, true));
        }

        let mut sections = Vec::with_capacity(bounds.len());
        let mut char_cursor = 0usize;
        let mut byte_cursor = 0usize;

        for (start, end, has_heading) in bounds {
            char_cursor += text[byte_cursor..start].chars().count();
            byte_cursor = start;

            let raw = &text[start..end];
            let trimmed_start = raw.trim_start();
            let trimmed = trimmed_start.trim_end();
            if trimmed.is_empty() {
                continue;
            }

            let leading = raw[..raw.len() - trimmed_start.len()].chars().count();
            let title = if has_heading {
                trimmed.lines().next().unwrap_or(trimmed).trim_end().to_string()
            } else {
                GENERAL_SECTION.to_string()
            };

            sections.push(Section {
                title,
                text: trimmed,
                char_offset: char_cursor + leading,
            });
        }

        sections
    }

    /// Split text into windows of `chunk_size` characters.
    ///
    /// A cut that would land mid-sentence snaps back to just after the nearest
    /// `.`, `!` or `?` within `sentence_lookback` characters; the next window
    /// starts `overlap` characters before the previous cut.
    pub fn split_by_size(&self, text: &str) -> Vec<Window> {
        let chars: Vec<char> = text.chars().collect();
        let len = chars.len();
        let mut windows = Vec::new();
        let mut start = 0usize;

        while start < len {
            let mut end = (start + self.chunk_size).min(len);

            if start + self.chunk_size < len {
                let search_start = end.saturating_sub(self.sentence_lookback).max(start);
                let terminal = (search_start..end)
                    .rev()
                    .find(|&i| is_sentence_terminal(chars[i]));
                if let Some(pos) = terminal {
                    if pos > start {
                        end = pos + 1;
                    }
                }
            }

            let piece: String = chars[start..end].iter().collect();
            let trimmed = piece.trim();
            if !trimmed.is_empty() {
                windows.push(Window {
                    start,
                    end,
                    text: trimmed.to_string(),
                });
            }

            if end >= len {
                break;
            }
            start = end.saturating_sub(self.overlap).max(start + 1);
        }

        windows
    }
}

impl Default for DocumentChunker {
    fn default() -> Self {
        Self::new(500, 50)
    }
}

fn is_sentence_terminal(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

/// Convenience function to chunk a document with explicit window settings
pub fn chunk_document(text: &str, chunk_size: usize, overlap: usize) -> Vec<Chunk> {
    DocumentChunker::new(chunk_size, overlap).chunk_document(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Letters only, so no sentence terminals and no whitespace at cut points
    fn filler(len: usize) -> String {
        "abcdefghij".chars().cycle().take(len).collect()
    }

    fn span_text(doc: &str, chunk: &Chunk) -> String {
        doc.chars()
            .skip(chunk.char_start)
            .take(chunk.char_end - chunk.char_start)
            .collect()
    }

    #[test]
    fn test_1200_char_section_yields_three_chunks() {
        let heading = "Section 1: Overview\n";
        let section = format!("{}{}", heading, filler(1200 - heading.len()));
        assert_eq!(section.chars().count(), 1200);

        let chunks = chunk_document(&section, 500, 50);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.char_count <= 500));
        assert_eq!(chunks[0].char_count, 500);
        assert_eq!(chunks[2].char_count, 300);

        let first_tail: String = chunks[0].text.chars().skip(450).collect();
        let second_head: String = chunks[1].text.chars().take(50).collect();
        assert_eq!(first_tail, second_head);

        assert!(chunks.iter().all(|c| c.section == "Section 1: Overview"));
        let indexes: Vec<u32> = chunks.iter().map(|c| c.chunk_index).collect();
        assert_eq!(indexes, vec![0, 1, 2]);
    }

    #[test]
    fn test_cut_snaps_to_sentence_end() {
        let text = format!("{}. {}", filler(460), filler(300));
        let windows = DocumentChunker::new(500, 50).split_by_size(&text);

        assert!(windows[0].text.ends_with('.'));
        assert_eq!(windows[0].end, 461);
        assert_eq!(windows[1].start, 411);
    }

    #[test]
    fn test_terminal_outside_lookback_is_ignored() {
        let text = format!("{}.{}", filler(300), filler(400));
        let windows = DocumentChunker::new(500, 50).split_by_size(&text);
        assert_eq!(windows[0].end, 500);
    }

    #[test]
    fn test_lookback_is_configurable() {
        let text = format!("{}.{}", filler(300), filler(400));
        let windows = DocumentChunker::new(500, 50)
            .with_sentence_lookback(250)
            .split_by_size(&text);
        assert_eq!(windows[0].end, 301);
    }

    #[test]
    fn test_fallback_to_general_section() {
        let text = filler(1000);
        let chunks = chunk_document(&text, 400, 40);

        assert!(chunks.len() > 1);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.section, GENERAL_SECTION);
            assert_eq!(chunk.chunk_index, i as u32);
            assert_eq!(chunk.chunk_id, i as u32);
        }
    }

    #[test]
    fn test_sections_and_ordering() {
        let doc = format!(
            "Section 1: Returns\nItems may be returned within 60 days.\n\nSection 2: Shipping\n{}\n\nSection 3: Payments\nWe accept Visa.",
            filler(900)
        );
        let chunks = chunk_document(&doc, 500, 50);

        assert_eq!(chunks[0].section, "Section 1: Returns");
        assert_eq!(chunks[0].chunk_index, 0);
        assert!(chunks[0].text.starts_with("Section 1: Returns"));

        let shipping: Vec<&Chunk> = chunks.iter().filter(|c| c.section == "Section 2: Shipping").collect();
        assert!(shipping.len() >= 2);
        assert_eq!(shipping[0].chunk_index, 0);

        let last = chunks.last().unwrap();
        assert_eq!(last.section, "Section 3: Payments");
        assert_eq!(last.chunk_index, 0);

        for pair in chunks.windows(2) {
            assert!(pair[1].chunk_id > pair[0].chunk_id);
        }
    }

    #[test]
    fn test_short_section_verbatim() {
        let doc = "Section 7: Contact\nCall 1-800-555-0100.";
        let chunks = chunk_document(doc, 500, 50);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, doc);
        assert_eq!(chunks[0].char_count, doc.chars().count());
    }

    #[test]
    fn test_preamble_kept_as_general() {
        let doc = "Welcome to support.\n\nSection 1: Returns\nReturn within 60 days.";
        let chunks = chunk_document(doc, 500, 50);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].section, GENERAL_SECTION);
        assert_eq!(chunks[0].text, "Welcome to support.");
        assert_eq!(chunks[1].section, "Section 1: Returns");
    }

    #[test]
    fn test_empty_document() {
        assert!(chunk_document("", 500, 50).is_empty());
        assert!(chunk_document("   \n  ", 500, 50).is_empty());
    }

    #[test]
    fn test_from_config_rejects_bad_overlap() {
        let config = ChunkingConfig {
            chunk_size: 100,
            overlap: 100,
            sentence_lookback: 10,
        };
        assert!(DocumentChunker::from_config(&config).is_err());
    }

    #[test]
    fn test_multibyte_text() {
        let doc = "Section 1: Café\n".to_string() + &"é".repeat(700);
        let chunks = chunk_document(&doc, 300, 30);
        assert!(chunks.iter().all(|c| c.char_count <= 300));
        for chunk in &chunks {
            assert_eq!(chunk.text, span_text(&doc, chunk).trim());
        }
    }

    fn document_strategy() -> impl Strategy<Value = String> {
        let piece = prop_oneof![
            4 => "[a-z]{1,12}".prop_map(|w| format!("{} ", w)),
            1 => Just(". ".to_string()),
            1 => Just("? ".to_string()),
            1 => Just("\n".to_string()),
            1 => (1u32..20).prop_map(|n| format!("\nSection {}: Topic {}\n", n, n)),
        ];
        proptest::collection::vec(piece, 0..300).prop_map(|pieces| pieces.concat())
    }

    proptest! {
        #[test]
        fn prop_chunks_cover_and_match_source(
            doc in document_strategy(),
            chunk_size in 20usize..200,
            overlap_ratio in 0usize..50,
            lookback in 0usize..80,
        ) {
            let overlap = chunk_size * overlap_ratio / 100;
            let chunker = DocumentChunker::new(chunk_size, overlap).with_sentence_lookback(lookback);
            let chunks = chunker.chunk_document(&doc);
            let doc_chars: Vec<char> = doc.chars().collect();

            // every chunk is the trimmed text of its own source span
            for chunk in &chunks {
                prop_assert!(!chunk.text.is_empty());
                prop_assert!(chunk.char_count <= chunk_size);
                let span = span_text(&doc, chunk);
                prop_assert_eq!(chunk.text.as_str(), span.trim());
            }

            // no non-whitespace character is dropped
            for (i, c) in doc_chars.iter().enumerate() {
                if !c.is_whitespace() {
                    prop_assert!(chunks.iter().any(|ch| ch.char_start <= i && i < ch.char_end));
                }
            }

            // ids strictly increase, indexes restart per section
            for (i, chunk) in chunks.iter().enumerate() {
                prop_assert_eq!(chunk.chunk_id, i as u32);
                if i > 0 && chunks[i - 1].section != chunk.section {
                    prop_assert_eq!(chunk.chunk_index, 0);
                }
            }

            // adjacent windows of one split share `overlap` source characters
            for pair in chunks.windows(2) {
                if pair[0].section == pair[1].section && pair[1].chunk_index == pair[0].chunk_index + 1 {
                    let shared = pair[0].char_end.saturating_sub(pair[1].char_start);
                    prop_assert!(shared <= overlap);
                    if pair[0].char_end - pair[0].char_start > overlap {
                        prop_assert_eq!(shared, overlap);
                    }
                }
            }

            // determinism
            prop_assert_eq!(chunker.chunk_document(&doc), chunks);
        }
    }
}
