//! Relative import resolution.
//!
//! Only specifiers starting with `.` are resolved. Bare package specifiers
//! are never looked up; callers treat `None` as "no local module".

use std::path::{Component, Path, PathBuf};

/// Suffixes tried after the literal path, in order.
const CANDIDATE_SUFFIXES: &[&str] = &[".js", ".mjs", "/index.js", "/index.mjs"];

#[derive(Debug, Clone, Default)]
pub struct PathResolver {
    root: Option<PathBuf>,
}

impl PathResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// A resolver that refuses anything outside `root`.
    ///
    /// Falls back to the unconfined resolver if `root` can't be
    /// canonicalized, since nothing under a missing root could resolve
    /// anyway.
    pub fn confined_to(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        match root.canonicalize() {
            Ok(canonical) => Self {
                root: Some(canonical),
            },
            Err(err) => {
                tracing::warn!(root = %root.display(), error = %err, "Module root is not accessible");
                Self {
                    root: Some(normalize(&absolutize(root))),
                }
            }
        }
    }

    /// Resolve `specifier` as imported from `from_file`.
    pub fn resolve(&self, from_file: &Path, specifier: &str) -> Option<PathBuf> {
        if !specifier.starts_with('.') {
            return None;
        }

        let base = from_file.parent().unwrap_or_else(|| Path::new(""));
        let joined = normalize(&base.join(specifier));

        let found = std::iter::once(joined.clone())
            .chain(CANDIDATE_SUFFIXES.iter().map(|suffix| {
                let mut candidate = joined.clone().into_os_string();
                candidate.push(suffix);
                PathBuf::from(candidate)
            }))
            .find(|candidate| candidate.is_file())?;

        let canonical = found.canonicalize().unwrap_or(found);

        if !self.is_path_allowed(&canonical) {
            tracing::warn!(
                file = %from_file.display(),
                specifier,
                resolved = %canonical.display(),
                "Import resolves outside the module root"
            );
            return None;
        }

        Some(canonical)
    }

    /// Check if a path is within the module root (always true without one).
    pub fn is_path_allowed(&self, path: &Path) -> bool {
        match &self.root {
            Some(root) => path.starts_with(root),
            None => true,
        }
    }
}

/// Turn a process-relative path into an absolute one, canonicalizing when the
/// file exists so that cache keys are stable.
pub fn absolutize(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    if path.is_absolute() {
        return normalize(path);
    }
    match std::env::current_dir() {
        Ok(cwd) => normalize(&cwd.join(path)),
        Err(_) => path.to_path_buf(),
    }
}

/// Lexically fold `.` and `..` components.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other),
        }
    }
    out
}
