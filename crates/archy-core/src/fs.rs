// SPDX-FileCopyrightText: 2026 Archy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Crash-safe file persistence for the JSON documents owned by the pipeline.

use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::ArchyError;

/// Write `bytes` to `path` atomically.
///
/// The data goes to a temp file in the same directory, is fsynced, and then
/// renamed over the destination, so readers see either the old or the new
/// document and never a torn write.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ArchyError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(ArchyError::storage)?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(ArchyError::storage)?;
    tmp.write_all(bytes).map_err(ArchyError::storage)?;
    tmp.as_file().sync_all().map_err(ArchyError::storage)?;
    tmp.persist(path)
        .map_err(|e| ArchyError::storage(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_atomic_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/doc.json");
        write_atomic(&path, b"{}").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}");
    }

    #[test]
    fn write_atomic_replaces_existing_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");
        write_atomic(&path, b"first version, longer").unwrap();
        write_atomic(&path, b"second").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");

        let leftovers: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(leftovers.len(), 1, "temp file should have been renamed away");
    }
}
