//! Document loading and splitting.
//!
//! Reads staged files as UTF-8 text and splits each into chunks whose
//! `source` is the staged path. Unreadable files are skipped with a
//! warning; the rest of the batch is still loaded.

use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use habit_context_core::chunk::{split_with, SplitParams};
use habit_context_core::Chunk;

/// Summary of one ingest call, returned to the CLI and HTTP callers.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    /// Files that were staged and loaded.
    pub files: Vec<PathBuf>,
    /// Chunks written to the store.
    pub chunks: usize,
}

/// Load and split every file in `files`, in order.
pub fn load_chunks(files: &[PathBuf], params: &SplitParams) -> (Vec<PathBuf>, Vec<Chunk>) {
    let mut loaded = Vec::new();
    let mut chunks = Vec::new();
    for file in files {
        match load_file(file, params) {
            Ok(file_chunks) => {
                debug!(path = %file.display(), chunks = file_chunks.len(), "split file");
                chunks.extend(file_chunks);
                loaded.push(file.clone());
            }
            Err(e) => warn!(path = %file.display(), error = %e, "cannot load file; skipping"),
        }
    }
    info!(files = loaded.len(), chunks = chunks.len(), "loaded documents");
    (loaded, chunks)
}

fn load_file(path: &Path, params: &SplitParams) -> std::io::Result<Vec<Chunk>> {
    let text = std::fs::read_to_string(path)?;
    let source = path.to_string_lossy();
    Ok(split_with(&source, &text, params))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_chunks_skips_unreadable() {
        let tmp = TempDir::new().unwrap();
        let good = tmp.path().join("good.txt");
        let binary = tmp.path().join("blob.bin");
        fs::write(&good, "x".repeat(2500)).unwrap();
        fs::write(&binary, [0xff, 0xfe, 0x00, 0x9f]).unwrap();

        let params = SplitParams::default();
        let (loaded, chunks) =
            load_chunks(&[good.clone(), binary, tmp.path().join("gone.txt")], &params);

        assert_eq!(loaded, vec![good.clone()]);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.source == good.to_string_lossy()));
    }

    #[test]
    fn test_empty_file_loads_without_chunks() {
        let tmp = TempDir::new().unwrap();
        let empty = tmp.path().join("empty.txt");
        fs::write(&empty, "").unwrap();

        let (loaded, chunks) = load_chunks(&[empty.clone()], &SplitParams::default());
        assert_eq!(loaded, vec![empty]);
        assert!(chunks.is_empty());
    }
}
