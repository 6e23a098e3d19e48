//! # Project Paths
//!
//! Single source of truth for the working-directory root and for turning the three
//! path conventions the model emits into one canonical absolute path:
//!
//! - fully qualified: `/home/project/src/App.tsx` or `home/project/src/App.tsx`
//! - root dropped: `project/src/App.tsx`
//! - relative: `src/App.tsx`, `./src/App.tsx`, `/src/App.tsx`

use anyhow::{Result, bail};

pub const DEFAULT_WORK_DIR: &str = "/home/project";

/// Canonical working directory of the execution target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkDir {
    /// Root without leading or trailing slashes, e.g. `home/project`.
    qualified: String,
    /// Everything before the last component, e.g. `home`. Empty for single-component roots.
    parent: String,
    /// Last component, e.g. `project`.
    leaf: String,
}

impl WorkDir {
    pub fn new(root: &str) -> Result<Self> {
        let qualified = root.trim().trim_matches('/').to_string();
        if qualified.is_empty() {
            bail!("Working directory root must contain at least one path component: {:?}", root);
        }
        let (parent, leaf) = match qualified.rsplit_once('/') {
            Some((parent, leaf)) => (parent.to_string(), leaf.to_string()),
            None => (String::new(), qualified.clone()),
        };
        Ok(Self {
            qualified,
            parent,
            leaf,
        })
    }

    /// Absolute form of the root, e.g. `/home/project`.
    pub fn root(&self) -> String {
        format!("/{}", self.qualified)
    }

    /// Maps any accepted path convention to one absolute path under the root.
    /// Idempotent: normalizing a normalized path returns it unchanged.
    pub fn normalize(&self, raw: &str) -> String {
        let mut path = raw.trim();
        path = path.strip_prefix('/').unwrap_or(path);
        while let Some(rest) = path.strip_prefix("./") {
            path = rest;
        }
        let path = path.trim_end_matches('/');

        if path.is_empty() || path == "." {
            return self.root();
        }

        if has_component_prefix(path, &self.qualified) {
            return format!("/{}", path);
        }

        if !self.parent.is_empty() && has_component_prefix(path, &self.leaf) {
            return format!("/{}/{}", self.parent, path);
        }

        format!("/{}/{}", self.qualified, path)
    }

    /// Path relative to the root for display; paths outside the root are returned as-is.
    /// e.g. `/home/project/src/App.tsx` -> `src/App.tsx`, `/home/project` -> `/`
    pub fn display(&self, path: &str) -> String {
        let root = self.root();
        match path.strip_prefix(&root) {
            Some("") => "/".to_string(),
            Some(rest) if rest.starts_with('/') => rest.trim_start_matches('/').to_string(),
            _ => path.to_string(),
        }
    }
}

impl Default for WorkDir {
    fn default() -> Self {
        Self {
            qualified: "home/project".to_string(),
            parent: "home".to_string(),
            leaf: "project".to_string(),
        }
    }
}

/// `true` when `path` is `prefix` itself or starts with `prefix/`.
fn has_component_prefix(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}
