// src/watch/patterns.rs

use std::fmt;

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};

/// User-supplied exclude globs from `[watch].exclude`.
///
/// Patterns are matched against paths relative to the watch root, with
/// forward slashes (e.g. `"internal/gen/**"`).
#[derive(Clone, Default)]
pub struct ExcludePatterns {
    patterns: Vec<String>,
    set: Option<GlobSet>,
}

impl fmt::Debug for ExcludePatterns {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExcludePatterns")
            .field("patterns", &self.patterns)
            .finish_non_exhaustive()
    }
}

impl ExcludePatterns {
    /// Compile `patterns`. An empty list excludes nothing.
    pub fn compile(patterns: &[String]) -> Result<Self> {
        if patterns.is_empty() {
            return Ok(Self::default());
        }

        let mut builder = GlobSetBuilder::new();
        for pat in patterns {
            let glob = Glob::new(pat).with_context(|| format!("invalid glob pattern: {pat}"))?;
            builder.add(glob);
        }

        Ok(Self {
            patterns: patterns.to_vec(),
            set: Some(builder.build().context("building exclude globset")?),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_none()
    }

    /// True if `rel_path` (relative, forward slashes) is excluded.
    pub fn is_excluded(&self, rel_path: &str) -> bool {
        match &self.set {
            Some(set) => set.is_match(rel_path),
            None => false,
        }
    }
}
