//! Path utilities for output naming and directory handling.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::identifier::Identifier;

/// Checks if a file name starts with a dot.
pub fn is_hidden_file(path: &Path) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy().starts_with('.'))
        .unwrap_or(false)
}

/// Replaces characters that are reserved in file names with their
/// full-width look-alikes, so titles stay readable on every platform.
/// Control characters become `_`.
pub fn sanitize_filename(filename: &str) -> String {
    filename
        .chars()
        .map(|c| match c {
            '<' => '＜',
            '>' => '＞',
            ':' => '：',
            '"' => '＂',
            '/' => '／',
            '\\' => '＼',
            '|' => '｜',
            '?' => '？',
            '*' => '＊',
            c if c.is_control() => '_',
            c => c,
        })
        .collect::<String>()
        .trim_end_matches(['.', ' '])
        .to_string()
}

/// The output path of a volume: its zero-padded identifier plus `extension`.
pub fn volume_file_path(
    directory: &Path,
    volume: &Identifier,
    major_width: usize,
    minor_width: usize,
    extension: &str,
) -> PathBuf {
    let stem = sanitize_filename(&volume.string_filled(major_width, minor_width, false));
    directory.join(format!("{}.{}", stem, extension))
}

/// Creates `directory` (and parents) if needed; fails if the path exists and
/// is not a directory.
pub async fn ensure_directory(directory: &Path) -> Result<()> {
    if directory.exists() && !directory.is_dir() {
        return Err(Error::InvalidPath(
            directory.to_path_buf(),
            "Path exists and is not a directory".to_string(),
        ));
    }
    tokio::fs::create_dir_all(directory).await?;
    Ok(())
}

/// Removes a partially written file, ignoring a file that is already gone.
pub async fn remove_partial(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
