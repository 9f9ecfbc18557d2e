use std::fs;

use camino::{Utf8Path, Utf8PathBuf};

use crate::error::PipelineError;

/// Size of `path` when it is a regular file holding at least one byte.
pub fn has_content(path: &Utf8Path) -> Option<u64> {
    fs::metadata(path)
        .ok()
        .filter(|meta| meta.is_file() && meta.len() > 0)
        .map(|meta| meta.len())
}

/// `path` made absolute against the current directory, without resolving symlinks.
pub fn absolute(path: &Utf8Path) -> Result<Utf8PathBuf, PipelineError> {
    let absolute = std::path::absolute(path)
        .map_err(|err| PipelineError::Filesystem(format!("resolve {path}: {err}")))?;
    Utf8PathBuf::from_path_buf(absolute).map_err(|path| {
        PipelineError::Filesystem(format!("path is not valid UTF-8: {}", path.display()))
    })
}

pub fn ensure_dir(path: &Utf8Path) -> Result<(), PipelineError> {
    fs::create_dir_all(path)
        .map_err(|err| PipelineError::Filesystem(format!("create {path}: {err}")))
}

pub fn ensure_parent(path: &Utf8Path) -> Result<(), PipelineError> {
    match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => ensure_dir(parent),
        _ => Ok(()),
    }
}
