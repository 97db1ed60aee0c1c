//! Zip packaging of File Geodatabase directories.
//!
//! Uses the external `zip` tool with a sorted entry list and no extra
//! file attributes, so identical inputs produce byte-identical archives.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::convert::stderr_tail;

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("cannot archive {}: {message}", .path.display())]
    Input { path: PathBuf, message: String },
    #[error("failed to run {tool}: {source}")]
    Spawn { tool: String, source: io::Error },
    #[error("{tool} failed: {stderr}")]
    Failed { tool: String, stderr: String },
    #[error("archive I/O: {0}")]
    Io(#[from] io::Error),
}

/// Packs a directory into a single archive file
pub trait ArchivePackager: Send + Sync {
    /// Archive `dir` (entries prefixed by its own name) into `archive`,
    /// returning the archive's size in bytes.
    fn pack_dir(&self, dir: &Path, archive: &Path) -> Result<u64, ArchiveError>;
}

/// [`ArchivePackager`] running `zip -X -D -q`
#[derive(Debug, Clone)]
pub struct ZipCommand {
    binary: PathBuf,
}

impl ZipCommand {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for ZipCommand {
    fn default() -> Self {
        Self::new("zip")
    }
}

/// Files under `dir`, relative to its parent, in sorted order
pub fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>, ArchiveError> {
    let input_err = |message: String| ArchiveError::Input {
        path: dir.to_path_buf(),
        message,
    };
    let parent = dir
        .parent()
        .ok_or_else(|| input_err("directory has no parent".into()))?;
    let pattern = format!("{}/**/*", glob::Pattern::escape(&dir.to_string_lossy()));
    let mut entries = Vec::new();
    for entry in glob::glob(&pattern).map_err(|e| input_err(e.to_string()))? {
        let path = entry.map_err(|e| input_err(e.to_string()))?;
        if path.is_file() {
            let rel = path
                .strip_prefix(parent)
                .map_err(|e| input_err(e.to_string()))?;
            entries.push(rel.to_path_buf());
        }
    }
    entries.sort();
    Ok(entries)
}

impl ArchivePackager for ZipCommand {
    fn pack_dir(&self, dir: &Path, archive: &Path) -> Result<u64, ArchiveError> {
        let entries = sorted_entries(dir)?;
        if entries.is_empty() {
            return Err(ArchiveError::Input {
                path: dir.to_path_buf(),
                message: "directory is empty".into(),
            });
        }
        let parent = dir.parent().unwrap_or(Path::new("."));
        // zip updates an existing archive in place instead of replacing it
        if archive.exists() {
            fs::remove_file(archive)?;
        }
        let archive = std::path::absolute(archive)?;

        let tool = self.binary.display().to_string();
        let mut args: Vec<OsString> = ["-X", "-D", "-q"].map(OsString::from).to_vec();
        args.push(archive.clone().into());
        args.extend(entries.into_iter().map(OsString::from));

        let out = Command::new(&self.binary)
            .current_dir(parent)
            .args(&args)
            .output()
            .map_err(|source| ArchiveError::Spawn {
                tool: tool.clone(),
                source,
            })?;
        if !out.status.success() {
            return Err(ArchiveError::Failed {
                tool,
                stderr: stderr_tail(&out.stderr),
            });
        }
        Ok(fs::metadata(&archive)?.len())
    }
}
