// src/watch/classify.rs

//! Turning a changed path into a [`ChangeClass`].

use std::path::{Path, PathBuf};

use crate::types::ChangeClass;
use crate::watch::filter::{is_noise_file, traverses_ignored_dir};
use crate::watch::patterns::ExcludePatterns;

/// Source code: the running binary is stale.
pub const SOURCE_EXTENSIONS: &[&str] = &["go"];

/// Structured config read at startup.
pub const CONFIG_EXTENSIONS: &[&str] = &["json", "yaml", "yml", "toml", "env"];

/// Watched, but with no dedicated class of their own.
pub const DOC_EXTENSIONS: &[&str] = &["md"];

pub const MARKUP_EXTENSIONS: &[&str] = &["html", "htm", "tmpl", "gohtml"];
pub const STYLE_EXTENSIONS: &[&str] = &["css", "scss", "sass", "less"];
pub const SCRIPT_EXTENSIONS: &[&str] = &["js", "mjs", "ts"];

/// Project manifests, matched by exact file name.
pub const MANIFEST_FILES: &[&str] = &["go.mod", "go.sum"];

fn is_refresh_ext(ext: &str) -> bool {
    MARKUP_EXTENSIONS.contains(&ext)
        || STYLE_EXTENSIONS.contains(&ext)
        || SCRIPT_EXTENSIONS.contains(&ext)
}

fn is_watched_ext(ext: &str) -> bool {
    SOURCE_EXTENSIONS.contains(&ext)
        || CONFIG_EXTENSIONS.contains(&ext)
        || DOC_EXTENSIONS.contains(&ext)
        || is_refresh_ext(ext)
}

/// Classify a path string using the fixed filtering rules only.
///
/// Both `/` and `\` separators are understood. Extensions are compared
/// case-insensitively.
pub fn classify_path(path: &str) -> ChangeClass {
    let file_name = path
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();

    if is_noise_file(file_name) || traverses_ignored_dir(path) {
        return ChangeClass::Ignored;
    }

    if MANIFEST_FILES.contains(&file_name) {
        return ChangeClass::Reload;
    }

    let ext = match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => ext.to_ascii_lowercase(),
        _ => return ChangeClass::Ignored,
    };

    if !is_watched_ext(&ext) {
        ChangeClass::Ignored
    } else if is_refresh_ext(&ext) {
        ChangeClass::Refresh
    } else {
        // Source, config, and any other watched type.
        ChangeClass::Reload
    }
}

/// Classifies absolute event paths relative to the watch root, applying the
/// user exclude globs on top of the fixed rules.
#[derive(Debug, Clone)]
pub struct Classifier {
    root: PathBuf,
    exclude: ExcludePatterns,
}

impl Classifier {
    pub fn new(root: impl Into<PathBuf>, exclude: ExcludePatterns) -> Self {
        Self {
            root: root.into(),
            exclude,
        }
    }

    /// Path relative to the root with forward slashes, or the full path if
    /// it lies outside the root (e.g. a symlinked conventional dir).
    pub fn relative(&self, path: &Path) -> String {
        let rel = path.strip_prefix(&self.root).unwrap_or(path);
        rel.to_string_lossy().replace('\\', "/")
    }

    pub fn classify(&self, path: &Path) -> ChangeClass {
        let rel = self.relative(path);
        match classify_path(&rel) {
            ChangeClass::Ignored => ChangeClass::Ignored,
            _ if self.exclude.is_excluded(&rel) => ChangeClass::Ignored,
            class => class,
        }
    }
}
