//! Result collection and archiving.

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tar::Builder as TarBuilder;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::{PipelineError, PipelineResult};

/// Description of a written archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveInfo {
    pub path: PathBuf,
    pub sha256: String,
    pub size_bytes: u64,
}

/// Copies result files by extension into the results tree and packs the
/// tree into a gzip-compressed tar.
#[derive(Debug, Clone)]
pub struct ArtifactCollector {
    extensions: BTreeSet<String>,
}

impl ArtifactCollector {
    /// `extensions` are matched case-insensitively, with or without a dot.
    pub fn new<S: AsRef<str>>(extensions: &[S]) -> Self {
        Self {
            extensions: extensions
                .iter()
                .map(|e| e.as_ref().trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn matches(&self, path: &Path) -> bool {
        path.extension()
            .map(|e| self.extensions.contains(&e.to_string_lossy().to_ascii_lowercase()))
            .unwrap_or(false)
    }

    /// Copy every allow-listed file under `source` into `dest`, keeping the
    /// relative layout. Hidden entries are skipped. Returns the number of
    /// files copied.
    pub fn collect(&self, source: &Path, dest: &Path) -> PipelineResult<usize> {
        let mut copied = 0;
        let walker = WalkDir::new(source)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !e.file_name().to_string_lossy().starts_with('.'));
        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() || !self.matches(entry.path()) {
                continue;
            }
            let Ok(rel) = entry.path().strip_prefix(source) else {
                continue;
            };
            let target = dest.join(rel);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
            copied += 1;
        }
        debug!(source = %source.display(), copied, "Collected result files");
        Ok(copied)
    }

    /// Pack `bundle_dir` into `archive_path` with the directory's name as the
    /// single top-level entry.
    ///
    /// The archive is written to a temp file next to `archive_path` and
    /// renamed into place, so an existing archive is only ever replaced
    /// whole.
    pub fn archive(&self, bundle_dir: &Path, archive_path: &Path) -> PipelineResult<ArchiveInfo> {
        let top = bundle_dir
            .file_name()
            .ok_or_else(|| PipelineError::Archive(format!("{} has no name", bundle_dir.display())))?;
        let parent = archive_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        fs::create_dir_all(parent)?;

        let tmp = tempfile::NamedTempFile::new_in(parent)?;
        let enc = GzEncoder::new(tmp.reopen()?, Compression::default());
        let mut tar = TarBuilder::new(enc);
        tar.follow_symlinks(false);
        tar.append_dir_all(top, bundle_dir)
            .map_err(|e| PipelineError::Archive(format!("packing {}: {e}", bundle_dir.display())))?;
        let mut file = tar
            .into_inner()
            .and_then(|enc| enc.finish())
            .map_err(|e| PipelineError::Archive(format!("finishing archive: {e}")))?;
        file.flush()?;

        let (sha256, size_bytes) = sha256_file(tmp.path())?;
        tmp.persist(archive_path).map_err(|e| e.error)?;
        info!(archive = %archive_path.display(), %sha256, size_bytes, "Wrote results archive");

        Ok(ArchiveInfo {
            path: archive_path.to_path_buf(),
            sha256,
            size_bytes,
        })
    }
}

/// Hex SHA-256 and length of a file.
pub fn sha256_file(path: &Path) -> io::Result<(String, u64)> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    let mut total = 0u64;
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        total += n as u64;
    }
    Ok((hex::encode(hasher.finalize()), total))
}
