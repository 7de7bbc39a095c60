// src/watch/mod.rs

//! File watching and change classification.
//!
//! This module is responsible for:
//! - Registering the project tree (plus conventional asset directories) with
//!   a cross-platform filesystem watcher (`notify`), including directories
//!   created later.
//! - Filtering noise: hidden/temp/swap files, VCS, dependency and build
//!   output directories, user exclude globs.
//! - Classifying surviving changes into `Reload` or `Refresh`.
//! - Debouncing bursts into a single `RuntimeEvent::FileChanged`.
//!
//! It does **not** act on changes; the engine decides what a class means.

pub mod classify;
pub mod debounce;
pub mod filter;
pub mod patterns;
pub mod watcher;

pub use classify::{classify_path, Classifier};
pub use debounce::{spawn_debouncer, ClassifiedChange, Debouncer};
pub use filter::{is_noise_file, qualifying_kind, traverses_ignored_dir, IGNORED_DIRS};
pub use patterns::ExcludePatterns;
pub use watcher::{spawn_watcher, WatchOptions, WatcherHandle};
