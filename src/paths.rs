//! Lexical path algebra.
//!
//! Project files are authored with a fixed slash and case convention that has
//! nothing to do with the host doing the editing, so slash direction and case
//! are treated as presentation here rather than identity. Almost nothing in
//! this module touches the filesystem; the one exception is
//! [`to_absolute`], which resolves symlinks for paths that exist.
//!
//! Paths that may contain the "other" separator are carried as plain strings
//! until they are compared: on some hosts a native path value cannot hold a
//! back slash as a separator at all.

use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

// ═══════════════════════════════════════════════════════════════════════════════
//  Case sensitivity
// ═══════════════════════════════════════════════════════════════════════════════

/// How path components are compared by [`path_equals`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CaseSensitivity {
    /// Whatever the host filesystem usually does: insensitive on Windows,
    /// sensitive everywhere else. See [`CaseSensitivity::resolve`].
    #[default]
    Default,
    Sensitive,
    Insensitive,
}

impl CaseSensitivity {
    /// Replace [`CaseSensitivity::Default`] with the concrete mode for this
    /// host. The other two values are returned unchanged.
    pub fn resolve(self) -> Self {
        match self {
            Self::Default if cfg!(windows) => Self::Insensitive,
            Self::Default => Self::Sensitive,
            other => other,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Slash conversion
// ═══════════════════════════════════════════════════════════════════════════════

/// Flip any back slashes to forward slashes.
pub fn to_forward_slashes(s: &str) -> String {
    s.replace('\\', "/")
}

/// Flip any forward slashes to back slashes (the convention used inside
/// project files).
pub fn to_back_slashes(s: &str) -> String {
    s.replace('/', "\\")
}

/// Convert to the separator the host uses natively.
pub fn to_native_slashes(s: &str) -> String {
    if cfg!(windows) {
        to_back_slashes(s)
    } else {
        to_forward_slashes(s)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Normalization
// ═══════════════════════════════════════════════════════════════════════════════

/// Put a path into normal form without touching the filesystem.
///
/// `.` segments are dropped and `..` segments cancel the preceding normal
/// segment. Leading `..` segments of a relative path are kept; a `..` directly
/// under the root is dropped. Absolute stays absolute, relative stays
/// relative, and a relative path that collapses to nothing becomes `.`.
///
/// The result is the same whether or not the path exists.
pub fn normalize(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    if path.as_os_str().is_empty() {
        return PathBuf::new();
    }

    let mut prefix: Vec<Component> = Vec::new();
    let mut parts: Vec<Component> = Vec::new();

    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => prefix.push(component),
            Component::CurDir => {}
            Component::ParentDir => match parts.last() {
                Some(Component::Normal(_)) => {
                    parts.pop();
                }
                // `/..` is `/`.
                None if prefix.iter().any(|c| matches!(c, Component::RootDir)) => {}
                _ => parts.push(component),
            },
            Component::Normal(_) => parts.push(component),
        }
    }

    if prefix.is_empty() && parts.is_empty() {
        return PathBuf::from(".");
    }

    prefix.iter().chain(parts.iter()).collect()
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Relative paths
// ═══════════════════════════════════════════════════════════════════════════════

/// Compute the path that leads from `base` to `path`, purely lexically (no
/// symlinks are followed, nothing needs to exist).
///
/// Returns `None` when no such path can be expressed: the two differ in
/// kind or root (one absolute, one relative, or different drives), or the
/// part of `base` not shared with `path` contains `..`.
/// `relative_to(p, p)` is `.`.
pub fn relative_to(path: impl AsRef<Path>, base: impl AsRef<Path>) -> Option<PathBuf> {
    let path = path.as_ref();
    let base = base.as_ref();

    if root_of(path) != root_of(base) || path.has_root() != base.has_root() {
        return None;
    }

    let a: Vec<Component> = path.components().collect();
    let b: Vec<Component> = base.components().collect();
    let common = a.iter().zip(&b).take_while(|(x, y)| x == y).count();

    if common == a.len() && common == b.len() {
        return Some(PathBuf::from("."));
    }

    // What a `..` left in the base climbs out of is unknown lexically.
    let mut depth = 0;
    for component in &b[common..] {
        match component {
            Component::ParentDir => return None,
            Component::Normal(_) => depth += 1,
            _ => {}
        }
    }

    let rest = &a[common..];
    if depth == 0 && rest.is_empty() {
        return Some(PathBuf::from("."));
    }

    let mut result = PathBuf::new();
    for _ in 0..depth {
        result.push("..");
    }
    result.extend(rest);
    Some(result)
}

/// A cheaper [`relative_to`] that trusts its caller instead of checking.
///
/// Both paths must be of the same kind (both absolute or both relative),
/// both must be in normal form, and `base` must not contain `..`. None of
/// this is verified; violating it gives an unspecified result.
pub fn relative_to_fast(path: impl AsRef<Path>, base: impl AsRef<Path>) -> PathBuf {
    let mut path = path.as_ref().components().peekable();
    let mut base = base.as_ref().components().peekable();

    while let (Some(x), Some(y)) = (path.peek(), base.peek()) {
        if x != y {
            break;
        }
        path.next();
        base.next();
    }

    let mut result: PathBuf = base.map(|_| Component::ParentDir).collect();
    result.extend(path);
    if result.as_os_str().is_empty() {
        result.push(".");
    }
    result
}

fn root_of(path: &Path) -> Option<Component<'_>> {
    match path.components().next() {
        Some(c @ Component::Prefix(_)) => Some(c),
        _ => None,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Absolutization
// ═══════════════════════════════════════════════════════════════════════════════

/// Make `path` absolute.
///
/// If it exists, symlinks are resolved. Otherwise it is anchored at `cwd`
/// (when relative) and put into normal form lexically.
pub fn to_absolute(path: impl AsRef<Path>, cwd: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    let cwd = cwd.as_ref();
    let anchored = if path.is_absolute() { path.to_path_buf() } else { cwd.join(path) };
    if let Ok(canonical) = anchored.canonicalize() {
        return canonical;
    }
    lexically_absolute(path, cwd)
}

/// Anchor `path` at `cwd` when relative, then normalize, all without looking
/// at the filesystem.
pub fn lexically_absolute(path: impl AsRef<Path>, cwd: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    if path.is_absolute() {
        normalize(path)
    } else {
        normalize(cwd.as_ref().join(path))
    }
}

/// Resolve a literal path as it is written inside a project file: slashes are
/// flipped to forward, a relative value is anchored at `dir`, and the result
/// is normalized.
pub fn resolve_literal(dir: impl AsRef<Path>, literal: &str) -> PathBuf {
    let path = PathBuf::from(to_forward_slashes(literal));
    normalize(dir.as_ref().join(path))
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Comparison
// ═══════════════════════════════════════════════════════════════════════════════

/// Compare two paths component by component.
///
/// Either slash direction is accepted in both inputs. The inputs are
/// expected to be absolute and normalized; nothing is resolved here.
pub fn path_equals(a: impl AsRef<Path>, b: impl AsRef<Path>, case: CaseSensitivity) -> bool {
    let a = to_forward_slashes(&a.as_ref().to_string_lossy());
    let b = to_forward_slashes(&b.as_ref().to_string_lossy());
    let sensitive = case.resolve() == CaseSensitivity::Sensitive;

    let mut a = Path::new(&a).components();
    let mut b = Path::new(&b).components();
    loop {
        match (a.next(), b.next()) {
            (None, None) => return true,
            (Some(x), Some(y)) => {
                let (x, y) = (x.as_os_str(), y.as_os_str());
                let same = if sensitive {
                    x == y
                } else {
                    fold_case(x) == fold_case(y)
                };
                if !same {
                    return false;
                }
            }
            _ => return false,
        }
    }
}

fn fold_case(s: &std::ffi::OsStr) -> OsString {
    OsString::from(s.to_string_lossy().to_lowercase())
}

/// Does the literal contain an unexpanded build variable (`$(Var)`) or item
/// metadata reference (`%(Meta)`)?
pub fn has_variable_token(literal: &str) -> bool {
    literal.contains("$(") || literal.contains("%(")
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════════════
