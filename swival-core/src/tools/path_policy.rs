//! Root-anchored path resolution.
//!
//! Every filesystem path a tool touches goes through [`PathPolicy::resolve`]
//! first. Candidates and roots are both fully canonicalised (symlinks
//! resolved) before the descendant check; write targets that do not exist
//! yet are checked against the canonical form of their nearest existing
//! ancestor. The filesystem root is rejected unconditionally, YOLO included.

use std::path::{Component, Path, PathBuf};

use crate::error::{ToolError, ToolErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Read,
    Write,
}

#[derive(Debug, Clone)]
struct AllowedRoot {
    canonical: PathBuf,
    writable: bool,
}

#[derive(Debug, Clone)]
pub struct PathPolicy {
    base: PathBuf,
    roots: Vec<AllowedRoot>,
    yolo: bool,
}

#[derive(Debug, Clone)]
pub struct ResolvedPath {
    pub absolute: PathBuf,
    /// The allowed root that admitted the path; `None` under YOLO.
    pub root: Option<PathBuf>,
}

impl PathPolicy {
    /// Build a policy from the base directory plus extra roots. All roots
    /// must exist; they are canonicalised here, once.
    pub fn new(
        base_dir: &Path,
        extra_rw: &[PathBuf],
        read_only: &[PathBuf],
        yolo: bool,
    ) -> anyhow::Result<Self> {
        let base = dunce::canonicalize(base_dir).map_err(|err| {
            anyhow::anyhow!("base directory {} is not usable: {err}", base_dir.display())
        })?;
        let mut roots = vec![AllowedRoot {
            canonical: base.clone(),
            writable: true,
        }];
        for dir in extra_rw {
            roots.push(AllowedRoot {
                canonical: dunce::canonicalize(dir).map_err(|err| {
                    anyhow::anyhow!("additional root {} is not usable: {err}", dir.display())
                })?,
                writable: true,
            });
        }
        for dir in read_only {
            roots.push(AllowedRoot {
                canonical: dunce::canonicalize(dir).map_err(|err| {
                    anyhow::anyhow!("read-only root {} is not usable: {err}", dir.display())
                })?,
                writable: false,
            });
        }
        Ok(Self { base, roots, yolo })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base
    }

    /// Resolve `candidate` for the given intent. Relative paths are anchored
    /// at the base directory.
    pub fn resolve(&self, candidate: &str, intent: Intent) -> Result<ResolvedPath, ToolError> {
        if candidate.trim().is_empty() {
            return Err(ToolError::new(
                ToolErrorKind::InvalidToolArguments,
                "path must not be empty",
            ));
        }

        let raw = Path::new(candidate);
        let joined = if raw.is_absolute() {
            raw.to_path_buf()
        } else {
            self.base.join(raw)
        };

        let canonical = canonicalize_candidate(&joined, candidate)?;

        if canonical == Path::new("/") {
            return Err(ToolError::new(
                ToolErrorKind::RootForbidden,
                "the filesystem root is never a valid target",
            ));
        }

        if self.yolo {
            return Ok(ResolvedPath {
                absolute: canonical,
                root: None,
            });
        }

        let mut inside_read_only = false;
        for root in &self.roots {
            if canonical.starts_with(&root.canonical) {
                if root.writable || intent == Intent::Read {
                    return Ok(ResolvedPath {
                        absolute: canonical,
                        root: Some(root.canonical.clone()),
                    });
                }
                inside_read_only = true;
            }
        }

        if inside_read_only {
            return Err(ToolError::new(
                ToolErrorKind::ReadOnlyViolation,
                format!("{candidate} is inside a read-only root"),
            ));
        }

        // Relative input that canonicalised outside the base directory means
        // `..` segments or a symlink walked it out of its anchor.
        if !raw.is_absolute() {
            return Err(ToolError::new(
                ToolErrorKind::PathEscape,
                format!("{candidate} escapes the workspace"),
            ));
        }

        Err(ToolError::new(
            ToolErrorKind::RootForbidden,
            format!("{candidate} is outside every allowed root"),
        ))
    }
}

/// Canonicalise a candidate that may not exist yet: resolve the nearest
/// existing ancestor, then re-append the remaining components after a
/// lexical `..` check.
fn canonicalize_candidate(joined: &Path, original: &str) -> Result<PathBuf, ToolError> {
    if let Ok(canonical) = dunce::canonicalize(joined) {
        return Ok(canonical);
    }

    let mut existing = joined.to_path_buf();
    let mut remainder: Vec<std::ffi::OsString> = Vec::new();
    loop {
        match existing.parent() {
            Some(parent) => {
                if let Some(name) = existing.file_name() {
                    remainder.push(name.to_os_string());
                }
                existing = parent.to_path_buf();
                if existing.exists() {
                    break;
                }
            }
            None => break,
        }
    }

    let canonical_base = dunce::canonicalize(&existing)
        .map_err(|err| ToolError::other(format!("cannot resolve {original}: {err}")))?;

    let mut result = canonical_base;
    for part in remainder.iter().rev() {
        match Path::new(part).components().next() {
            Some(Component::ParentDir) => {
                return Err(ToolError::new(
                    ToolErrorKind::PathEscape,
                    format!("{original} uses `..` through a non-existent path"),
                ));
            }
            Some(Component::CurDir) | None => {}
            _ => result.push(part),
        }
    }
    Ok(result)
}
