use std::path::Path;

/// Makes a label safe for use in a directory name: trims, collapses
/// whitespace runs to one space and replaces anything outside
/// `[A-Za-z0-9-_. ]` with `_`. Absent labels become `NA`.
pub fn sanitize(text: Option<&str>) -> String {
    let Some(text) = text else {
        return "NA".to_string();
    };
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ' ') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Splits a file name into stem and extension (with its leading dot).
/// Names without an extension, and dot-files, get an empty extension.
pub fn split_extension(path: &Path) -> (String, String) {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    (stem, extension)
}
