//! Knowledge-base file loading and processed-chunk persistence

use std::path::Path;

use crate::error::{Error, Result};
use crate::types::Chunk;

/// Load a plain-text knowledge base, rejecting non UTF-8 content
pub fn load_knowledge_base(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    let content = String::from_utf8(bytes).map_err(|e| {
        Error::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("{} is not valid UTF-8 text: {}", path.display(), e),
        ))
    })?;

    tracing::info!("Loaded {} characters from {}", content.chars().count(), path.display());
    Ok(content)
}

/// Write the chunk list as pretty JSON, creating parent directories
pub fn save_chunks_json(chunks: &[Chunk], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(chunks)?;
    std::fs::write(path, json)?;

    tracing::info!("Saved {} chunks to {}", chunks.len(), path.display());
    Ok(())
}

/// Read a chunk list previously written by [`save_chunks_json`]
pub fn load_chunks_json(path: &Path) -> Result<Vec<Chunk>> {
    let raw = std::fs::read_to_string(path)?;
    let chunks: Vec<Chunk> = serde_json::from_str(&raw)?;
    tracing::info!("Loaded {} chunks from {}", chunks.len(), path.display());
    Ok(chunks)
}
