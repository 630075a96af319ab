//! File watcher backed by OS change events.
//!
//! # How Watching Works
//!
//! 1. `watch(path, callback)` registers the callback for the file and asks
//!    the `notify` backend to watch the file's directory. Watching the
//!    directory keeps working when an editor replaces the file by renaming.
//!
//! 2. The backend queues events on a channel as they happen. Nothing runs
//!    until `poll()` drains the channel; every watched file named by a
//!    create, modify or remove event then has its callbacks run once.
//!
//! 3. `spawn(period)` drives `poll()` from a tokio interval task. The task
//!    only holds the watcher weakly and ends once the watcher is dropped.
//!
//! Removing the handle returned by `watch` drops the callback. The last
//! callback of a file takes its entry with it, and the directory is
//! unwatched once no file in it is left.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use indexmap::IndexSet;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::error::{Error, Result};
use crate::reactive::{ListenerHandle, Listeners};

/// Callback fired when a watched file changes.
pub type WatchCallback = Arc<dyn Fn() + Send + Sync>;

type Callbacks = Listeners<dyn Fn() + Send + Sync>;

struct Shared {
    /// Canonical file path to its callbacks.
    files: DashMap<PathBuf, Arc<Callbacks>>,

    /// Also serializes directory bookkeeping between watch and release.
    backend: Mutex<RecommendedWatcher>,

    events: Mutex<Receiver<notify::Result<Event>>>,
}

impl Shared {
    fn watches_directory(&self, directory: &Path) -> bool {
        self.files
            .iter()
            .any(|entry| entry.key().parent() == Some(directory))
    }

    /// Stop watching the directory of `file` if nothing else in it is watched.
    fn release_directory(&self, backend: &mut RecommendedWatcher, file: &Path) {
        let Some(directory) = file.parent() else {
            return;
        };
        if self.watches_directory(directory) {
            return;
        }

        match backend.unwatch(directory) {
            Ok(()) => tracing::debug!(directory = %directory.display(), "released directory"),
            Err(error) => tracing::warn!(
                directory = %directory.display(),
                %error,
                "failed to release watched directory"
            ),
        }
    }

    /// Drop the entry for `file` once its last callback is gone.
    fn prune(&self, file: &Path) {
        let mut backend = self.backend.lock();
        if self
            .files
            .remove_if(file, |_, callbacks| callbacks.is_empty())
            .is_some()
        {
            self.release_directory(&mut backend, file);
        }
    }
}

fn is_change(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

/// Watches files through the platform's recommended `notify` backend.
///
/// The watcher is an ordinary value: create one, share it through an `Arc`
/// and either call [`poll`](FileWatcher::poll) yourself or start a
/// background task with [`spawn`](FileWatcher::spawn). Events are queued
/// between polls, so callbacks only ever run inside `poll`.
pub struct FileWatcher {
    shared: Arc<Shared>,
}

impl FileWatcher {
    pub fn new() -> Result<Self> {
        let (sender, events) = mpsc::channel();
        let backend = RecommendedWatcher::new(sender, Config::default())?;

        Ok(Self {
            shared: Arc::new(Shared {
                files: DashMap::new(),
                backend: Mutex::new(backend),
                events: Mutex::new(events),
            }),
        })
    }

    /// Call `callback` whenever `path` changes on disk.
    ///
    /// The path must exist; it is canonicalized so different spellings of
    /// the same file share one entry. Removing the returned handle stops the
    /// callback. Dropping the handle does not.
    pub fn watch<F>(&self, path: impl AsRef<Path>, callback: F) -> Result<ListenerHandle>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let path = path.as_ref();
        let file = fs::canonicalize(path).map_err(|source| Error::io(path, source))?;
        let directory = file.parent().map(Path::to_path_buf).ok_or_else(|| {
            Error::io(path, io::Error::new(io::ErrorKind::InvalidInput, "not a file"))
        })?;

        let callbacks = {
            let mut backend = self.shared.backend.lock();
            if !self.shared.watches_directory(&directory) {
                backend.watch(&directory, RecursiveMode::NonRecursive)?;
                tracing::debug!(directory = %directory.display(), "watching directory");
            }
            Arc::clone(self.shared.files.entry(file.clone()).or_default().value())
        };

        let registration = callbacks.add(Arc::new(callback));
        tracing::debug!(path = %file.display(), callbacks = callbacks.len(), "watching file");

        let shared = Arc::downgrade(&self.shared);
        let prune = ListenerHandle::new(move || {
            if let Some(shared) = shared.upgrade() {
                shared.prune(&file);
            }
        });

        Ok(ListenerHandle::merge([registration, prune]))
    }

    /// Stop watching `path` and drop all of its callbacks. Returns whether
    /// it was watched.
    pub fn unwatch(&self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        let file = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());

        let mut backend = self.shared.backend.lock();
        let removed = self.shared.files.remove(&file).is_some();
        if removed {
            self.shared.release_directory(&mut backend, &file);
        }
        removed
    }

    /// Number of watched files.
    pub fn len(&self) -> usize {
        self.shared.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.files.is_empty()
    }

    /// Drain queued events and fire the callbacks of every watched file they
    /// name. Returns the number of changed files.
    pub fn poll(&self) -> usize {
        let changed: IndexSet<PathBuf> = {
            let events = self.shared.events.lock();
            let mut changed = IndexSet::new();

            for result in events.try_iter() {
                match result {
                    Ok(event) if is_change(&event.kind) => changed.extend(
                        event
                            .paths
                            .into_iter()
                            .filter(|path| self.shared.files.contains_key(path)),
                    ),
                    Ok(_) => {}
                    Err(error) => tracing::warn!(%error, "file watcher reported an error"),
                }
            }
            changed
        };

        for path in &changed {
            let callbacks = self
                .shared
                .files
                .get(path)
                .map(|entry| Arc::clone(entry.value()));

            if let Some(callbacks) = callbacks {
                tracing::debug!(path = %path.display(), "file changed on disk");
                callbacks.notify();
            }
        }

        changed.len()
    }

    /// Poll every `period` on the current tokio runtime.
    ///
    /// Polls run on the blocking pool since callbacks do file I/O. The task
    /// stops once the last `Arc` to the watcher is dropped; abort the handle
    /// to stop it sooner.
    pub fn spawn(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let watcher: Weak<Self> = Arc::downgrade(self);

        tokio::spawn(async move {
            let mut ticks = tokio::time::interval(period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticks.tick().await;

                let Some(watcher) = watcher.upgrade() else {
                    tracing::debug!("file watcher dropped; stopping poll task");
                    break;
                };

                if let Err(error) = tokio::task::spawn_blocking(move || watcher.poll()).await {
                    tracing::error!(%error, "file watcher poll failed");
                }
            }
        })
    }
}

impl std::fmt::Debug for FileWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileWatcher")
            .field("files", &self.shared.files.len())
            .finish()
    }
}
