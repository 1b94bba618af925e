// crates/server-jobs/src/paths.rs
//! File-name checks and input cleanup for the uploads/results areas.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

/// True when `name` is a single path component: no separators, not `.`/`..`.
///
/// Used for every client-supplied or analyzer-supplied file name before it
/// is joined onto the uploads or results directory.
pub fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && !name.contains('/')
        && !name.contains('\\')
        && Path::new(name).file_name() == Some(OsStr::new(name))
}

/// Replace every character outside `[A-Za-z0-9._-]` with `_`.
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

/// Best-effort delete of a job's input file.
///
/// Returns whether a file was removed. A missing file is not an error;
/// any other failure is logged and swallowed.
pub async fn remove_input_file(path: &Path) -> bool {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "removed input file");
            true
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to remove input file");
            false
        }
    }
}

/// Locate `program` the way a shell would: as given when it contains a
/// separator, otherwise by searching `PATH`.
pub fn find_executable(program: &Path) -> Option<PathBuf> {
    if program.components().count() > 1 || program.is_absolute() {
        return program.is_file().then(|| program.to_path_buf());
    }
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}
