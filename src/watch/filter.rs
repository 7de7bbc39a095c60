// src/watch/filter.rs

//! Noise filtering for raw filesystem events.

use std::path::Path;

use notify::event::{CreateKind, ModifyKind, RenameMode};
use notify::EventKind;

use crate::types::WatchEventKind;

/// Directory names whose contents never trigger anything: version control,
/// dependency caches, vendored code and build output.
pub const IGNORED_DIRS: &[&str] = &[".git", "node_modules", "vendor", "dist", "bin"];

/// Suffixes of temporary and backup files.
const NOISE_SUFFIXES: &[&str] = &[".tmp", ".swp", ".bak"];

/// Substrings left behind by editors while saving.
const SWAP_MARKERS: &[&str] = &[".swp", ".swx", "~", "#"];

/// Vim's write-permission test file; only the exact name is noise.
const VIM_WRITE_TEST_FILE: &str = "4913";

/// Map a notify event kind onto the two kinds that can trigger work.
///
/// Directory creation, metadata, access and remove events yield `None`.
pub fn qualifying_kind(kind: &EventKind) -> Option<WatchEventKind> {
    match kind {
        EventKind::Create(CreateKind::File | CreateKind::Any) => Some(WatchEventKind::Create),
        EventKind::Modify(ModifyKind::Name(RenameMode::To | RenameMode::Both)) => {
            Some(WatchEventKind::Create)
        }
        EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Any) => Some(WatchEventKind::Write),
        _ => None,
    }
}

/// True for hidden, temporary, backup and editor swap files.
pub fn is_noise_file(file_name: &str) -> bool {
    file_name.is_empty()
        || file_name.starts_with('.')
        || file_name.starts_with('~')
        || file_name == VIM_WRITE_TEST_FILE
        || NOISE_SUFFIXES.iter().any(|s| file_name.ends_with(s))
        || SWAP_MARKERS.iter().any(|m| file_name.contains(m))
}

/// True if any directory component of `path` is an ignored directory.
///
/// The path is split on both `/` and `\`, so Windows-style paths are handled
/// on every platform. The final component (the file name) is not checked.
pub fn traverses_ignored_dir(path: &str) -> bool {
    let mut components: Vec<&str> = path
        .split(['/', '\\'])
        .filter(|c| !c.is_empty())
        .collect();
    components.pop();
    components.iter().any(|c| IGNORED_DIRS.contains(c))
}

/// Whether a directory found while walking should be registered with the
/// OS watcher: hidden and ignored directories are skipped.
pub fn is_watchable_dir(dir: &Path) -> bool {
    match dir.file_name().and_then(|n| n.to_str()) {
        Some(name) => !name.starts_with('.') && !IGNORED_DIRS.contains(&name),
        None => false,
    }
}
