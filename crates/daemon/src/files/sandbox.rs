//! Sandbox path resolution and depth policy.
//!
//! Every client-supplied path is resolved here before any filesystem call.
//! Resolution is purely lexical: the candidate is joined to the share root,
//! `.`/`..`/empty segments are collapsed without consulting the filesystem,
//! and the result must be the root itself or a strict descendant of it. The
//! descendant check compares whole path components, so a sibling directory
//! sharing a name prefix with the root (`/srv/share` vs `/srv/share2`) can
//! never pass.

use std::io;
use std::path::{Component, Path, PathBuf};

use protocol::ShareError;

/// Default maximum folder nesting depth below the root.
pub const DEFAULT_MAX_DEPTH: usize = 5;

/// The fixed directory tree all operations are confined to.
#[derive(Debug, Clone)]
pub struct Sandbox {
    root: PathBuf,
    max_depth: usize,
}

impl Sandbox {
    /// Open the sandbox rooted at `root`, creating the directory if absent.
    ///
    /// The root is canonicalized once here; resolution never touches the
    /// filesystem afterwards.
    pub fn open(root: impl Into<PathBuf>, max_depth: usize) -> io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        let root = root.canonicalize()?;
        Ok(Self { root, max_depth })
    }

    /// The absolute share root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Configured maximum nesting depth.
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Resolve a client-supplied relative path to an absolute path inside
    /// the root, or reject it with `InvalidPath`.
    ///
    /// Empty or blank input resolves to the root itself.
    pub fn resolve(&self, relative: &str) -> Result<PathBuf, ShareError> {
        let trimmed = relative.trim().trim_matches('/');
        if trimmed.is_empty() {
            return Ok(self.root.clone());
        }

        let candidate = normalize(&self.root.join(trimmed));
        if is_within(&self.root, &candidate) {
            Ok(candidate)
        } else {
            Err(ShareError::InvalidPath(relative.to_string()))
        }
    }

    /// Root-relative form of a resolved path, slash-separated; `""` for the
    /// root itself.
    pub fn relative_of(&self, resolved: &Path) -> String {
        let Ok(rel) = resolved.strip_prefix(&self.root) else {
            return String::new();
        };
        rel.components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Whether an entry at `depth` is within the nesting limit.
    pub fn within_limit(&self, depth: usize) -> bool {
        depth <= self.max_depth
    }
}

/// Nesting depth of a relative path: the number of non-empty segments after
/// trimming separators. The root is 0.
pub fn depth_of(relative: &str) -> usize {
    relative
        .trim_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .count()
}

/// Root-relative path of the parent directory of `relative`; `""` when the
/// entry sits directly under the root. Used to scope change events.
pub fn parent_of(relative: &str) -> String {
    let trimmed = relative.trim_matches('/');
    match trimmed.rsplit_once('/') {
        Some((parent, _)) => parent.to_string(),
        None => String::new(),
    }
}

/// Collapse `.`/`..`/redundant separators lexically, never following
/// symlinks. `..` at the top pops nothing and is discarded.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

/// Whether `candidate` is `root` or a strict descendant of it.
///
/// `Path::starts_with` compares whole components, which is exactly the
/// boundary-safe prefix check the sandbox needs.
pub fn is_within(root: &Path, candidate: &Path) -> bool {
    candidate.starts_with(root)
}

/// Reduce a client-supplied entry name to a filesystem-safe token: path
/// separators and control characters are stripped, surrounding whitespace
/// trimmed. `None` when nothing usable remains.
pub fn sanitize_name(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .chars()
        .filter(|c| *c != '/' && *c != '\\' && !c.is_control())
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        None
    } else {
        Some(cleaned.to_string())
    }
}
