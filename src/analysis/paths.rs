//! Path relativization.

use std::fs;
use std::path::{Component, Path, PathBuf, MAIN_SEPARATOR_STR};

/// Express `child` relative to `parent_base`.
///
/// Both paths are made absolute, normalized and resolved through any
/// symlinks of their existing prefix before comparing. Returns `None` when
/// `child` is not `parent_base` or one of its descendants. The result uses
/// the platform separator; `child == parent_base` yields an empty string.
pub fn relativize(parent_base: &Path, child: &Path) -> Option<String> {
    let base = canonical_form(parent_base)?;
    let child = canonical_form(child)?;

    let relative = child.strip_prefix(&base).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();

    Some(parts.join(MAIN_SEPARATOR_STR))
}

/// Absolute, normalized form of `path` with symlinks resolved as far as
/// the path exists on disk.
///
/// Unlike [`fs::canonicalize`] this accepts paths that do not exist yet,
/// such as a data file a module has not produced.
pub fn canonical_form(path: &Path) -> Option<PathBuf> {
    let absolute = std::path::absolute(path).ok()?;
    let normalized = normalize(&absolute);

    let mut existing = normalized.as_path();
    let mut missing = Vec::new();
    loop {
        if let Ok(mut resolved) = fs::canonicalize(existing) {
            for name in missing.iter().rev() {
                resolved.push(name);
            }
            return Some(resolved);
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                existing = parent;
            }
            _ => return Some(normalized),
        }
    }
}

/// Lexically drop `.` and fold `..` components.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
