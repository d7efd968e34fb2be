//! Filesystem helpers shared by staging, collection and publishing.

use std::collections::BTreeSet;
use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::PipelineResult;

/// Immediate subdirectories of `dir`, sorted by name. Hidden entries are
/// skipped. A missing `dir` yields an empty list.
pub fn list_subdirs(dir: &Path) -> PipelineResult<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(dirs),
        Err(e) => return Err(e.into()),
    };
    for entry in entries {
        let entry = entry?;
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        if entry.file_type()?.is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// Regular files directly inside `dir`, sorted.
pub fn list_files(dir: &Path) -> PipelineResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

/// Names of every entry directly inside `dir`.
pub fn entry_names(dir: &Path) -> PipelineResult<BTreeSet<OsString>> {
    let mut names = BTreeSet::new();
    for entry in fs::read_dir(dir)? {
        names.insert(entry?.file_name());
    }
    Ok(names)
}

/// Recursively copy `src` into `dst`, creating `dst`. Returns the number of
/// files copied.
pub fn copy_dir_all(src: &Path, dst: &Path) -> PipelineResult<usize> {
    let mut copied = 0;
    fs::create_dir_all(dst)?;
    for entry in WalkDir::new(src).min_depth(1).sort_by_file_name() {
        let entry = entry?;
        let Ok(rel) = entry.path().strip_prefix(src) else {
            continue;
        };
        let target = dst.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
            copied += 1;
        }
    }
    Ok(copied)
}

/// Write `data` to `path` through a temp file in the same directory, then
/// rename, so readers never observe a partial file.
pub fn write_atomic(path: &Path, data: &[u8]) -> PipelineResult<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Remove `path` whether it is a file or a directory. Missing paths are fine.
pub fn remove_path(path: &Path) -> std::io::Result<()> {
    let result = match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) => Err(e),
    };
    match result {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
