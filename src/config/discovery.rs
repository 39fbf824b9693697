//! Profile discovery.
//!
//! Profiles are plain `*.toml` files kept side by side in one directory,
//! usually `./profiles`.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// List `*.toml` files directly inside `dir`, sorted by path.
///
/// A missing directory yields an empty list.
pub fn discover_profiles(dir: &Path) -> Result<Vec<PathBuf>, walkdir::Error> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).max_depth(1) {
        let entry = entry?;
        if entry.file_type().is_file()
            && entry.path().extension().and_then(|s| s.to_str()) == Some("toml")
        {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort();
    Ok(files)
}
