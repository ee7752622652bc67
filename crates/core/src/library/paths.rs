//! Translation between the library service's paths and local mounts.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// One remote prefix and the local directory it is mounted at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathMapping {
    pub remote: String,
    pub local: PathBuf,
}

/// Rewrites path prefixes in both directions.
///
/// The longest matching prefix wins. Paths with no matching prefix are used
/// unchanged, which is the right thing when both sides share a filesystem.
#[derive(Debug, Clone, Default)]
pub struct PathMapper {
    mappings: Vec<PathMapping>,
}

impl PathMapper {
    pub fn new(mut mappings: Vec<PathMapping>) -> Self {
        mappings.sort_by(|a, b| b.remote.len().cmp(&a.remote.len()));
        Self { mappings }
    }

    /// Library path → local path.
    pub fn to_local(&self, remote: &str) -> PathBuf {
        for mapping in &self.mappings {
            if let Some(rest) = strip_prefix(remote, &mapping.remote) {
                return mapping.local.join(rest);
            }
        }
        PathBuf::from(remote)
    }

    /// Local path → library path.
    pub fn to_remote(&self, local: &Path) -> String {
        let mut by_local: Vec<&PathMapping> = self.mappings.iter().collect();
        by_local.sort_by(|a, b| {
            b.local
                .as_os_str()
                .len()
                .cmp(&a.local.as_os_str().len())
        });
        for mapping in by_local {
            if let Ok(rest) = local.strip_prefix(&mapping.local) {
                let rest = rest.to_string_lossy();
                let base = mapping.remote.trim_end_matches('/');
                return if rest.is_empty() {
                    base.to_string()
                } else {
                    format!("{}/{}", base, rest)
                };
            }
        }
        local.to_string_lossy().to_string()
    }
}

/// Component-aware prefix strip: `/data` matches `/data/x` but not `/database`.
fn strip_prefix<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    let prefix = prefix.trim_end_matches('/');
    let rest = path.strip_prefix(prefix)?;
    if rest.is_empty() {
        Some("")
    } else {
        rest.strip_prefix('/')
    }
}
