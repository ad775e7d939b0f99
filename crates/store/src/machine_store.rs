// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Atomic single-file reads/writes under a machine's directory tree.

use crate::error::StoreError;
use std::collections::HashSet;
use std::io::Write;
use std::path::Path;

pub fn read(dir: &Path, key: &str) -> Option<String> {
    std::fs::read_to_string(dir.join(key)).ok().map(|s| s.trim_end_matches('\n').to_string())
}

/// Writes `dir/key` atomically: the new contents land in `dir/tmp/<key>.<pid>`
/// then are renamed into place, so a reader never observes a partial write
/// and a crash mid-write leaves the previous value intact (SPEC_FULL.md §4.1,
/// §9 "rename(2) semantics").
pub fn write(dir: &Path, key: &str, contents: &[u8], mode: u32) -> Result<(), StoreError> {
    let tmp_dir = dir.join("tmp");
    std::fs::create_dir_all(&tmp_dir).map_err(|e| io_err(&tmp_dir, e))?;

    let tmp_path = tmp_dir.join(format!("{key}.{}", std::process::id()));
    {
        let mut f = std::fs::File::create(&tmp_path).map_err(|e| io_err(&tmp_path, e))?;
        f.write_all(contents).map_err(|e| io_err(&tmp_path, e))?;
        set_mode(&f, mode);
    }

    let final_path = dir.join(key);
    std::fs::rename(&tmp_path, &final_path).map_err(|e| io_err(&final_path, e))?;
    Ok(())
}

#[cfg(unix)]
fn set_mode(file: &std::fs::File, mode: u32) {
    use std::os::unix::fs::PermissionsExt;
    let _ = file.set_permissions(std::fs::Permissions::from_mode(mode));
}

#[cfg(not(unix))]
fn set_mode(_file: &std::fs::File, _mode: u32) {}

pub fn list_dirs(dir: &Path) -> Result<HashSet<String>, StoreError> {
    let mut names = HashSet::new();
    if !dir.exists() {
        return Ok(names);
    }
    for entry in std::fs::read_dir(dir).map_err(|e| io_err(dir, e))? {
        let entry = entry.map_err(|e| io_err(dir, e))?;
        if entry.path().is_dir() {
            if let Some(name) = entry.file_name().to_str() {
                names.insert(name.to_string());
            }
        }
    }
    Ok(names)
}

fn io_err(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io { path: path.to_path_buf(), source }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "created", b"100", 0o640).unwrap();
        assert_eq!(read(dir.path(), "created"), Some("100".to_string()));
    }

    #[test]
    fn no_tmp_file_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "created", b"100", 0o640).unwrap();
        let tmp_dir = dir.path().join("tmp");
        let remaining: Vec<_> = std::fs::read_dir(&tmp_dir).unwrap().collect();
        assert!(remaining.is_empty());
    }

    #[test]
    fn read_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(read(dir.path(), "nope"), None);
    }
}
