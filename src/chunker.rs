//! Overlapping, size-bounded text chunker.
//!
//! Splits document body text into pieces that never exceed `max_chars`
//! characters. Splitting prefers paragraph (`\n\n`) and line boundaries to
//! preserve semantic coherence; oversized runs are hard-split at character
//! boundaries. Each piece after the first starts with the trailing `overlap`
//! characters of its predecessor.
//!
//! Chunking is deterministic and pure: the same text and configuration
//! always produce the same ordered piece sequence, which combined with
//! deterministic chunk ids makes index upserts idempotent.

use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::models::{Chunk, ChunkMetadata, SourceDocument};

/// One chunk piece before it is attached to a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPiece {
    pub index: usize,
    pub text: String,
}

/// Split text into overlapping pieces of at most `max_chars` characters.
///
/// Returns an empty vec for blank input. Fails with
/// [`Error::InvalidConfig`] when `max_chars` is zero or `overlap` is not
/// smaller than `max_chars`.
pub fn chunk_text(text: &str, max_chars: usize, overlap: usize) -> Result<Vec<ChunkPiece>> {
    if max_chars == 0 {
        return Err(Error::InvalidConfig(
            "chunking.max_chars must be > 0".to_string(),
        ));
    }
    if overlap >= max_chars {
        return Err(Error::InvalidConfig(format!(
            "chunking.overlap ({}) must be smaller than chunking.max_chars ({})",
            overlap, max_chars
        )));
    }

    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    // A seeded chunk is `seed + '\n' + fresh content`, so the fresh-content
    // budget must leave room for the seed and its separator. When the
    // configuration leaves no such room, the seed is dropped entirely.
    let use_overlap = if overlap + 2 <= max_chars { overlap } else { 0 };
    let budget = if use_overlap == 0 {
        max_chars
    } else {
        max_chars - use_overlap - 1
    };

    let atoms = split_atoms(trimmed, budget);

    let mut texts: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut fresh = 0usize;

    for atom in atoms {
        let atom_len = char_len(&atom);
        let sep = usize::from(fresh > 0);

        if fresh > 0 && fresh + sep + atom_len > budget {
            let seed = overlap_tail(&current, use_overlap);
            texts.push(std::mem::take(&mut current));
            current = seed;
            fresh = 0;
        }

        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(&atom);
        fresh += atom_len + usize::from(fresh > 0);
    }

    // A trailing buffer holding only an overlap seed is discarded.
    if fresh > 0 {
        texts.push(current);
    }

    Ok(texts
        .into_iter()
        .enumerate()
        .map(|(index, text)| ChunkPiece { index, text })
        .collect())
}

/// Chunk one source document into fully-formed [`Chunk`]s for a tenant.
pub fn chunk_document(
    doc: &SourceDocument,
    tenant_id: &str,
    max_chars: usize,
    overlap: usize,
) -> Result<Vec<Chunk>> {
    let pieces = chunk_text(&doc.raw_text, max_chars, overlap)?;
    let total = pieces.len();
    let document_id = doc.document_id();

    Ok(pieces
        .into_iter()
        .map(|piece| Chunk {
            id: Chunk::id_for(doc.source_type, &doc.external_id, piece.index),
            source_document_id: document_id.clone(),
            chunk_index: piece.index,
            total_chunks: total,
            metadata: ChunkMetadata {
                title: doc.title.clone(),
                last_modified_at: doc.last_modified_at,
                source_type: doc.source_type,
                tenant_id: tenant_id.to_string(),
                content_hash: content_hash(&piece.text),
            },
            text: piece.text,
        })
        .collect())
}

fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Break text into atoms no longer than `budget` characters, preferring
/// paragraph, then line, then sentence boundaries before hard windows.
fn split_atoms(text: &str, budget: usize) -> Vec<String> {
    let mut atoms = Vec::new();

    for para in text.split("\n\n") {
        let para = para.trim();
        if para.is_empty() {
            continue;
        }
        if char_len(para) <= budget {
            atoms.push(para.to_string());
            continue;
        }
        for line in para.split('\n') {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if char_len(line) <= budget {
                atoms.push(line.to_string());
                continue;
            }
            for sentence in line.split_inclusive(['.', '!', '?']) {
                let sentence = sentence.trim();
                if sentence.is_empty() {
                    continue;
                }
                if char_len(sentence) <= budget {
                    atoms.push(sentence.to_string());
                } else {
                    atoms.extend(hard_windows(sentence, budget));
                }
            }
        }
    }

    atoms
}

/// Hard-split a run into windows of at most `budget` characters, breaking
/// at the last space inside the window when one exists.
fn hard_windows(s: &str, budget: usize) -> Vec<String> {
    let chars: Vec<char> = s.chars().collect();
    let mut out = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let end = (start + budget).min(chars.len());
        let mut split = end;
        if end < chars.len() {
            if let Some(pos) = chars[start..end].iter().rposition(|c| *c == ' ') {
                if pos > 0 {
                    split = start + pos + 1;
                }
            }
        }
        let piece: String = chars[start..split].iter().collect();
        let piece = piece.trim();
        if !piece.is_empty() {
            out.push(piece.to_string());
        }
        start = split;
    }

    out
}

/// The trailing `overlap` characters of a chunk, carried into its successor.
fn overlap_tail(s: &str, overlap: usize) -> String {
    if overlap == 0 {
        return String::new();
    }
    let chars: Vec<char> = s.chars().collect();
    if chars.len() <= overlap {
        return s.to_string();
    }
    chars[chars.len() - overlap..].iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceType;
    use chrono::Utc;

    #[test]
    fn test_small_text_single_piece() {
        let pieces = chunk_text("Hello, world!", 500, 50).unwrap();
        assert_eq!(pieces.len(), 1);
        assert_eq!(pieces[0].index, 0);
        assert_eq!(pieces[0].text, "Hello, world!");
    }

    #[test]
    fn test_blank_text_yields_no_pieces() {
        assert!(chunk_text("", 500, 50).unwrap().is_empty());
        assert!(chunk_text("   \n\n  ", 500, 50).unwrap().is_empty());
    }

    #[test]
    fn test_overlap_must_be_smaller_than_max() {
        assert!(matches!(
            chunk_text("abc", 100, 100),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            chunk_text("abc", 100, 200),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(chunk_text("abc", 0, 0), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_no_piece_exceeds_max_chars() {
        let text = (0..40)
            .map(|i| format!("Paragraph number {} with some filler text in it.", i))
            .collect::<Vec<_>>()
            .join("\n\n");
        let pieces = chunk_text(&text, 120, 20).unwrap();
        assert!(pieces.len() > 1);
        for piece in &pieces {
            assert!(
                piece.text.chars().count() <= 120,
                "piece {} has {} chars",
                piece.index,
                piece.text.chars().count()
            );
        }
    }

    #[test]
    fn test_indices_contiguous() {
        let text = (0..30)
            .map(|i| format!("Line {}.", i))
            .collect::<Vec<_>>()
            .join("\n\n");
        let pieces = chunk_text(&text, 40, 8).unwrap();
        for (i, piece) in pieces.iter().enumerate() {
            assert_eq!(piece.index, i);
        }
    }

    #[test]
    fn test_deterministic() {
        let text = "Alpha\n\nBeta\n\nGamma\n\nDelta\n\nEpsilon";
        let a = chunk_text(text, 14, 4).unwrap();
        let b = chunk_text(text, 14, 4).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_successor_carries_overlap_tail() {
        let text = "a".repeat(1200);
        let pieces = chunk_text(&text, 500, 50).unwrap();
        assert!(pieces.len() >= 2);
        let tail: String = pieces[0]
            .text
            .chars()
            .skip(pieces[0].text.chars().count() - 50)
            .collect();
        assert!(pieces[1].text.starts_with(&tail));
    }

    #[test]
    fn test_1200_chars_at_500_50_yields_three_pieces() {
        let text = "a".repeat(1200);
        let pieces = chunk_text(&text, 500, 50).unwrap();
        assert_eq!(pieces.len(), 3);
    }

    #[test]
    fn test_multibyte_text_hard_split_is_boundary_safe() {
        let text = "배포 절차와 운영 가이드라인 문서입니다 ".repeat(60);
        let pieces = chunk_text(&text, 100, 10).unwrap();
        assert!(!pieces.is_empty());
        for piece in &pieces {
            assert!(piece.text.chars().count() <= 100);
        }
    }

    #[test]
    fn test_chunk_document_ids_are_stable() {
        let doc = SourceDocument {
            source_type: SourceType::WorkspaceDoc,
            external_id: "page-1".to_string(),
            title: "Policy A".to_string(),
            raw_text: "first paragraph\n\nsecond paragraph".to_string(),
            last_modified_at: Utc::now(),
        };

        let first = chunk_document(&doc, "acme", 500, 50).unwrap();
        let second = chunk_document(&doc, "acme", 500, 50).unwrap();

        let ids_a: Vec<&str> = first.iter().map(|c| c.id.as_str()).collect();
        let ids_b: Vec<&str> = second.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids_a, ids_b);
        assert_eq!(first[0].id, "workspace-doc:page-1:0");
        assert_eq!(first[0].source_document_id, "workspace-doc:page-1");

        let hashes_a: Vec<&str> = first.iter().map(|c| c.metadata.content_hash.as_str()).collect();
        let hashes_b: Vec<&str> = second.iter().map(|c| c.metadata.content_hash.as_str()).collect();
        assert_eq!(hashes_a, hashes_b);
    }
}
