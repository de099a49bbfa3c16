//! File-system helpers.

use std::path::{Path, PathBuf};

use crate::AsrResult;

/// Recursively collect all files under `directory` whose name ends with
/// `extension`.
///
/// The result is sorted for determinism, the way dataset manifests expect.
pub fn find_files(directory: impl AsRef<Path>, extension: &str) -> AsrResult<Vec<PathBuf>> {
    let mut found = Vec::new();
    walk(directory.as_ref(), extension, &mut found)?;
    found.sort();
    Ok(found)
}

fn walk(dir: &Path, extension: &str, out: &mut Vec<PathBuf>) -> AsrResult<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            walk(&path, extension, out)?;
        } else if path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.ends_with(extension))
        {
            out.push(path);
        }
    }
    Ok(())
}
