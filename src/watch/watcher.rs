// src/watch/watcher.rs

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use notify::event::CreateKind;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::engine::RuntimeEvent;
use crate::errors::{Result, SupervisorError};
use crate::types::{ChangeClass, WatchEvent};
use crate::watch::classify::Classifier;
use crate::watch::debounce::{spawn_debouncer, ClassifiedChange};
use crate::watch::filter::{is_watchable_dir, qualifying_kind, traverses_ignored_dir};
use crate::watch::patterns::ExcludePatterns;

/// Everything the watcher needs, resolved from [`crate::config::Settings`].
#[derive(Debug, Clone)]
pub struct WatchOptions {
    pub root: PathBuf,
    /// Conventional subdirectories registered in addition to the root tree.
    pub extra_dirs: Vec<String>,
    pub debounce: Duration,
    pub exclude: ExcludePatterns,
}

/// Handle for the filesystem watcher.
///
/// Keeps the `RecommendedWatcher` alive; dropping the handle stops watching
/// and aborts the dispatch and debounce tasks.
pub struct WatcherHandle {
    registry: Arc<Mutex<DirRegistry>>,
    tasks: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for WatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherHandle")
            .field("watched_dirs", &self.watched_dirs().len())
            .finish()
    }
}

impl WatcherHandle {
    /// Directories currently registered with the OS watcher.
    pub fn watched_dirs(&self) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = lock(&self.registry).seen.iter().cloned().collect();
        dirs.sort();
        dirs
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
        debug!("file watcher stopped");
    }
}

/// Non-recursive registrations, one per watched directory.
///
/// Registering directories one by one keeps ignored trees such as
/// `node_modules` out of the OS watcher entirely.
struct DirRegistry {
    watcher: RecommendedWatcher,
    seen: HashSet<PathBuf>,
}

impl DirRegistry {
    /// Register `start` and every watchable directory below it.
    ///
    /// `start` itself is not name-filtered. Symlinks below `start` are not
    /// followed. Returns the number of newly registered directories.
    fn register_tree(&mut self, start: &Path) -> usize {
        let mut added = 0;
        let mut stack = vec![start.to_path_buf()];

        while let Some(dir) = stack.pop() {
            if self.seen.contains(&dir) {
                continue;
            }
            if let Err(err) = self.watcher.watch(&dir, RecursiveMode::NonRecursive) {
                warn!(dir = ?dir, error = %err, "cannot watch directory");
                continue;
            }
            trace!(dir = ?dir, "watching directory");
            self.seen.insert(dir.clone());
            added += 1;

            let entries = match std::fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(err) => {
                    debug!(dir = ?dir, error = %err, "cannot list directory");
                    continue;
                }
            };
            for entry in entries.flatten() {
                let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
                let path = entry.path();
                if is_dir && is_watchable_dir(&path) {
                    stack.push(path);
                }
            }
        }

        added
    }
}

fn lock(registry: &Mutex<DirRegistry>) -> MutexGuard<'_, DirRegistry> {
    match registry.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Spawn a filesystem watcher over `options.root` that sends debounced
/// `RuntimeEvent::FileChanged` events to `runtime_tx`.
///
/// Fails with [`SupervisorError::NothingToWatch`] if no directory at all
/// could be registered.
pub fn spawn_watcher(
    options: WatchOptions,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
) -> Result<WatcherHandle> {
    // Canonicalize once so we have a stable base path.
    let root = options
        .root
        .canonicalize()
        .unwrap_or_else(|_| options.root.clone());

    // Channel from the blocking notify callback into the async world.
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<Event>();

    let watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                // Fails only once the dispatch task is gone.
                let _ = event_tx.send(event);
            }
            Err(err) => {
                eprintln!("rekindle: file watch error: {err}");
            }
        },
        Config::default(),
    )?;

    let mut registry = DirRegistry {
        watcher,
        seen: HashSet::new(),
    };

    let mut count = registry.register_tree(&root);
    for name in &options.extra_dirs {
        let dir = root.join(name);
        if dir.is_dir() {
            // Symlinked conventional dirs resolve to their target.
            let dir = dir.canonicalize().unwrap_or(dir);
            count += registry.register_tree(&dir);
        }
    }

    if count == 0 {
        return Err(SupervisorError::NothingToWatch(root));
    }

    info!(root = ?root, dirs = count, "file watcher started");

    let registry = Arc::new(Mutex::new(registry));
    let classifier = Classifier::new(root, options.exclude);
    let (changes_tx, changes_rx) = mpsc::channel::<ClassifiedChange>(256);

    let debounce_task = spawn_debouncer(options.debounce, changes_rx, runtime_tx);

    let dispatch_registry = Arc::clone(&registry);
    let dispatch_task = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            trace!(?event, "received notify event");

            for change in dispatch_event(&event, &classifier, &dispatch_registry) {
                if changes_tx.send(change).await.is_err() {
                    debug!("debouncer gone; watcher dispatch exiting");
                    return;
                }
            }
        }
        debug!("watcher event loop finished");
    });

    Ok(WatcherHandle {
        registry,
        tasks: vec![dispatch_task, debounce_task],
    })
}

/// Filter and classify one notify event.
///
/// New directories are registered (with their subtree) and produce no change.
fn dispatch_event(
    event: &Event,
    classifier: &Classifier,
    registry: &Mutex<DirRegistry>,
) -> Vec<ClassifiedChange> {
    let mut out = Vec::new();

    for path in &event.paths {
        let created = matches!(
            event.kind,
            EventKind::Create(_) | EventKind::Modify(notify::event::ModifyKind::Name(_))
        );
        if created && path.is_dir() {
            register_new_dir(path, classifier, registry);
            continue;
        }
        if matches!(event.kind, EventKind::Create(CreateKind::Folder)) {
            continue;
        }

        let Some(kind) = qualifying_kind(&event.kind) else {
            continue;
        };

        match classifier.classify(path) {
            ChangeClass::Ignored => trace!(path = ?path, "ignored change"),
            class => {
                debug!(path = ?path, ?kind, %class, "qualifying change");
                out.push(ClassifiedChange {
                    event: WatchEvent::new(path.clone(), kind),
                    class,
                });
            }
        }
    }

    out
}

fn register_new_dir(path: &Path, classifier: &Classifier, registry: &Mutex<DirRegistry>) {
    let rel = classifier.relative(path);
    if !is_watchable_dir(path) || traverses_ignored_dir(&rel) {
        trace!(dir = ?path, "new directory not watched");
        return;
    }

    let added = lock(registry).register_tree(path);
    if added > 0 {
        info!(dir = ?path, dirs = added, "watching new directory");
    }
}
