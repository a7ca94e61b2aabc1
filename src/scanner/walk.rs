use glob::Pattern;
use std::path::{Path, PathBuf};
use tracing::{error, warn};
use walkdir::WalkDir;

/// Recursive directory walk yielding every regular file regardless of
/// extension, skipping anything matched by the glob ignore patterns.
/// Unreadable entries are logged and skipped.
pub fn walk_folder(root: &Path, ignore_globs: &[String]) -> Vec<PathBuf> {
    let ignore_patterns = compile_ignore_patterns(ignore_globs);

    WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            !ignore_patterns
                .iter()
                .any(|pattern| pattern.matches_path(entry.path()))
        })
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!("Skipping unreadable entry under {}: {}", root.display(), err);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .collect()
}

fn compile_ignore_patterns(ignore_globs: &[String]) -> Vec<Pattern> {
    ignore_globs
        .iter()
        .filter_map(|glob| match Pattern::new(glob) {
            Ok(p) => Some(p),
            Err(e) => {
                error!("Invalid glob pattern '{}': {}", glob, e);
                None
            }
        })
        .collect()
}
