//! Storage key derivation for generated artifacts.

/// Derive the thumbnail key from the original's storage key.
///
/// The last directory named `original` becomes `thumbnail`; without one, a
/// `thumbnail/` directory is added next to the file. The extension always
/// becomes `.jpg`. `filename` is used only when the key has no file part.
///
/// `u1/original/cat.jpg` -> `u1/thumbnail/cat.jpg`
pub fn thumbnail_path(original_path: &str, filename: &str) -> String {
    let (dir_part, file) = original_path.rsplit_once('/').unwrap_or(("", original_path));
    let file = if file.is_empty() { filename } else { file };

    let mut dirs: Vec<&str> = dir_part.split('/').filter(|s| !s.is_empty()).collect();
    match dirs.iter().rposition(|s| *s == "original") {
        Some(index) => dirs[index] = "thumbnail",
        None => dirs.push("thumbnail"),
    }

    let stem = match file_stem(file) {
        "" => "thumbnail",
        stem => stem,
    };

    format!("{}/{}.jpg", dirs.join("/"), stem)
}

/// File name without its last extension; dotfiles keep their name.
fn file_stem(name: &str) -> &str {
    match name.rfind('.') {
        Some(0) | None => name,
        Some(index) => &name[..index],
    }
}
