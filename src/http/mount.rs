//! Mount tree resolution and URL prefix handling.
//!
//! `folders` and `proxy` share the same recursive shape. Resolution flattens
//! the tree into `(prefix, target)` pairs in declaration order.

use std::path::{Path, PathBuf};

use crate::config::schema::{MountTree, SiteDescriptor};

/// One resolved mount: a URL prefix and its target (directory or upstream).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    /// Normalized prefix: `/` or `/a/b` (no trailing slash).
    pub prefix: String,
    pub target: String,
}

/// Flatten a mount tree rooted at `/`.
pub fn resolve(tree: &MountTree) -> Vec<Mount> {
    let mut out = Vec::new();
    walk(tree, "/", &mut out);
    out
}

fn walk(tree: &MountTree, prefix: &str, out: &mut Vec<Mount>) {
    match tree {
        MountTree::Leaf(target) => out.push(Mount {
            prefix: prefix.to_string(),
            target: target.clone(),
        }),
        MountTree::List(items) => {
            for item in items {
                walk(item, prefix, out);
            }
        }
        MountTree::Named(map) => {
            for (key, sub) in map {
                walk(sub, &join_prefix(prefix, key), out);
            }
        }
    }
}

/// Append a path segment to a prefix, keeping the result normalized.
pub fn join_prefix(prefix: &str, key: &str) -> String {
    let joined = format!(
        "{}/{}",
        prefix.trim_end_matches('/'),
        key.trim_matches('/')
    );
    normalize_prefix(&joined)
}

/// Normalize a URL prefix: leading slash, no trailing slash, `/` for root.
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{trimmed}")
    }
}

/// Path remaining after a mount prefix, or `None` if the path is not under it.
///
/// Matching is segment-aware: `/api` matches `/api` and `/api/x`, never `/apix`.
pub fn strip_mount<'a>(prefix: &str, path: &'a str) -> Option<&'a str> {
    if prefix == "/" {
        return Some(path);
    }
    let rest = path.strip_prefix(prefix)?;
    if rest.is_empty() {
        Some("/")
    } else if rest.starts_with('/') {
        Some(rest)
    } else {
        None
    }
}

/// Resolve a directory the way the server always has: relative paths are
/// taken from the process working directory.
pub fn resolve_dir(dir: &str, cwd: &Path) -> PathBuf {
    let path = Path::new(dir);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    }
}

/// Static mounts of a site with their directories resolved.
pub fn static_mounts(site: &SiteDescriptor, cwd: &Path) -> Vec<(String, PathBuf)> {
    site.folders
        .as_ref()
        .map(resolve)
        .unwrap_or_default()
        .into_iter()
        .map(|m| (m.prefix, resolve_dir(&m.target, cwd)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    fn leaf(s: &str) -> MountTree {
        MountTree::Leaf(s.to_string())
    }

    #[test]
    fn resolves_nested_tree_in_order() {
        let mut inner = IndexMap::new();
        inner.insert("/v1".to_string(), leaf("http://a"));
        let mut root = IndexMap::new();
        root.insert("/api".to_string(), MountTree::Named(inner));
        root.insert("docs".to_string(), MountTree::List(vec![leaf("d1"), leaf("d2")]));

        let mounts = resolve(&MountTree::Named(root));
        let pairs: Vec<_> = mounts
            .iter()
            .map(|m| (m.prefix.as_str(), m.target.as_str()))
            .collect();
        assert_eq!(
            pairs,
            vec![("/api/v1", "http://a"), ("/docs", "d1"), ("/docs", "d2")]
        );
    }

    #[test]
    fn leaf_mounts_at_root() {
        assert_eq!(
            resolve(&leaf("public")),
            vec![Mount {
                prefix: "/".into(),
                target: "public".into()
            }]
        );
    }

    #[test]
    fn strip_is_segment_aware() {
        assert_eq!(strip_mount("/api", "/api/x"), Some("/x"));
        assert_eq!(strip_mount("/api", "/api"), Some("/"));
        assert_eq!(strip_mount("/api", "/apix"), None);
        assert_eq!(strip_mount("/", "/anything"), Some("/anything"));
    }

    #[test]
    fn relative_dirs_use_cwd() {
        let cwd = Path::new("/srv/app");
        assert_eq!(resolve_dir("public", cwd), PathBuf::from("/srv/app/public"));
        assert_eq!(resolve_dir("/var/www", cwd), PathBuf::from("/var/www"));
    }
}
