//! Copying terraform override files (`override.tf`, `*_override.tf`, ...)
//! into the working directory before any action runs.

use std::path::Path;

use tracing::debug;

use crate::Result;

/// Recursively copy `src` into `dst`, returning how many files were copied.
///
/// A missing `src` is not an error. Entries whose own name starts with `..`
/// are skipped: mounted secret volumes expose their payload through `..data`
/// style symlink directories, and the visible entries already point at it.
pub fn copy_overrides(src: &Path, dst: &Path) -> Result<usize> {
    if !src.exists() {
        debug!(src = %src.display(), "no override directory");
        return Ok(0);
    }
    let copied = copy_tree(src, dst)?;
    debug!(src = %src.display(), dst = %dst.display(), copied, "copied overrides");
    Ok(copied)
}

fn copy_tree(src: &Path, dst: &Path) -> Result<usize> {
    let meta = std::fs::metadata(src)?;
    if !dst.exists() {
        std::fs::create_dir_all(dst)?;
        std::fs::set_permissions(dst, meta.permissions())?;
    }

    let mut copied = 0;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let name = entry.file_name();
        if name.to_string_lossy().starts_with("..") {
            continue;
        }
        let path = entry.path();
        let target = dst.join(&name);
        // follows symlinks: the payload is what gets copied
        if std::fs::metadata(&path)?.is_dir() {
            copied += copy_tree(&path, &target)?;
        } else {
            std::fs::copy(&path, &target)?;
            copied += 1;
        }
    }
    Ok(copied)
}
