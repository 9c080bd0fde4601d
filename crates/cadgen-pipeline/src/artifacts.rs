//! Locate the mesh a successful program exported

use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static EXPORT_STL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"export_stl\s*\([^,]+,\s*['"]([^'"]+\.stl)['"]"#).unwrap()
});

/// Find the mesh file to show for `code`.
///
/// Literal `export_stl(..., "<path>.stl")` targets that exist win, the last
/// one in the program first. Otherwise the most recently modified mesh in
/// `output_dir` is used. Relative paths resolve against `working_dir`.
pub fn find_latest_mesh(
    code: &str,
    working_dir: &Path,
    output_dir: &Path,
    extension: &str,
) -> Option<PathBuf> {
    let literal = EXPORT_STL
        .captures_iter(code)
        .map(|caps| resolve(working_dir, &caps[1]))
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .find(|path| path.is_file());

    literal.or_else(|| newest_with_extension(&resolve_dir(working_dir, output_dir), extension))
}

fn resolve(working_dir: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        working_dir.join(path)
    }
}

fn resolve_dir(working_dir: &Path, dir: &Path) -> PathBuf {
    if dir.is_absolute() {
        dir.to_path_buf()
    } else {
        working_dir.join(dir)
    }
}

fn newest_with_extension(dir: &Path, extension: &str) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;
    entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == extension))
        .filter_map(|path| {
            let modified = path.metadata().and_then(|m| m.modified()).ok()?;
            Some((modified, path))
        })
        .max_by_key(|(modified, _)| *modified)
        .map(|(_, path)| path)
}
