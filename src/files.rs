//! Capability-scoped helpers for reading local files named in configuration.

use std::io;

use camino::Utf8Path;
use cap_std::{ambient_authority, fs_utf8::Dir};

fn split(path: &Utf8Path) -> io::Result<(&Utf8Path, &str)> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."));
    let file_name = path.file_name().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("path has no file name: {path}"),
        )
    })?;
    Ok((parent, file_name))
}

/// Reads `path` as UTF-8 text.
///
/// # Errors
///
/// Returns the underlying I/O error when the parent directory cannot be
/// opened or the file cannot be read.
pub fn read_to_string(path: &Utf8Path) -> io::Result<String> {
    let (parent, file_name) = split(path)?;
    let dir = Dir::open_ambient_dir(parent, ambient_authority())?;
    dir.read_to_string(file_name)
}

/// Reads `path` as raw bytes.
///
/// # Errors
///
/// Returns the underlying I/O error when the parent directory cannot be
/// opened or the file cannot be read.
pub fn read(path: &Utf8Path) -> io::Result<Vec<u8>> {
    let (parent, file_name) = split(path)?;
    let dir = Dir::open_ambient_dir(parent, ambient_authority())?;
    dir.read(file_name)
}
