//! Loading configuration files as live properties.
//!
//! # How Loading Works
//!
//! 1. The file (and its parent directories) is created when missing.
//!
//! 2. Its content is read into a property, the *persisted* property, which
//!    always holds the last content known to be on disk.
//!
//! 3. The file is registered with the [`FileWatcher`]. When it changes
//!    externally the content is re-read and, if different, written into the
//!    persisted property. The registration lives as long as the persisted
//!    property, so dropping every node of a config unwatches its file.
//!
//! 4. The caller receives a property linked to the persisted one. Writes made
//!    through it are saved to disk before the persisted property follows.
//!
//! I/O failures inside listener-driven steps cannot be returned to anyone,
//! so they are logged and queued for [`ConfigManager::take_errors`].

use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use super::node::ConfigNode;
use super::options::ConfigOptions;
use super::transformer::{ConfigTransformer, JsonTransformer};
use super::watcher::FileWatcher;
use crate::error::{Error, Result};
use crate::reactive::Property;

type ErrorQueue = Arc<Mutex<Vec<Error>>>;

/// Loads configuration files and keeps them in sync with their properties.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use tether_core::config::{ConfigManager, FileWatcher};
///
/// # fn main() -> tether_core::Result<()> {
/// let watcher = Arc::new(FileWatcher::new()?);
/// let manager = ConfigManager::new(Arc::clone(&watcher));
///
/// let config = manager.load("./config.json")?;
/// let greeting = config.get_string("greeting");
///
/// // Writes "Hello, world!" into the file if the key is missing.
/// println!("{}", greeting.get_or(String::from("Hello, world!")));
/// # Ok(())
/// # }
/// ```
pub struct ConfigManager {
    watcher: Arc<FileWatcher>,
    options: ConfigOptions,
    errors: ErrorQueue,
}

impl ConfigManager {
    pub fn new(watcher: Arc<FileWatcher>) -> Self {
        Self::with_options(watcher, ConfigOptions::default())
    }

    pub fn with_options(watcher: Arc<FileWatcher>, options: ConfigOptions) -> Self {
        Self {
            watcher,
            options,
            errors: Arc::default(),
        }
    }

    pub fn watcher(&self) -> &Arc<FileWatcher> {
        &self.watcher
    }

    pub fn options(&self) -> &ConfigOptions {
        &self.options
    }

    /// Poll the watcher every [`ConfigOptions::poll_interval`] on the current
    /// tokio runtime. See [`FileWatcher::spawn`].
    pub fn spawn_polling(&self) -> JoinHandle<()> {
        tracing::debug!(period = ?self.options.poll_interval(), "starting config poll task");
        self.watcher.spawn(self.options.poll_interval())
    }

    /// Load `path` as a JSON document.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<ConfigNode> {
        let format = JsonTransformer::new(self.options.pretty);
        self.load_with(path, &format)
    }

    /// Load `path` with a custom document format.
    pub fn load_with(&self, path: impl AsRef<Path>, transformer: &dyn ConfigTransformer) -> Result<ConfigNode> {
        let content = self.load_content(path)?;
        Ok(transformer.transform(&content))
    }

    /// Load the raw content of `path` as a live property.
    pub fn load_content(&self, path: impl AsRef<Path>) -> Result<Property<String>> {
        let path = path.as_ref();

        if self.options.create_missing {
            create_missing(path)?;
        }

        let text = fs::read_to_string(path).map_err(|source| Error::io(path, source))?;
        let persisted = Property::of(text);

        // Disk -> property. Held weakly so the watcher never keeps a
        // dropped config alive.
        let registration = {
            let persisted = persisted.downgrade();
            let file = path.to_path_buf();
            let errors = Arc::clone(&self.errors);
            self.watcher.watch(path, move || {
                let Some(persisted) = persisted.upgrade() else {
                    return;
                };

                match fs::read_to_string(&file) {
                    Ok(text) => {
                        if text != persisted.get() {
                            tracing::debug!(path = %file.display(), "reloading config from disk");
                            persisted.set(text);
                        }
                    }
                    Err(source) => {
                        let error = Error::io(&file, source);
                        tracing::warn!(%error, "failed to re-read config");
                        errors.lock().push(error);
                    }
                }
            })?
        };
        persisted.hold(registration);

        // Property -> disk.
        let file = path.to_path_buf();
        let errors = Arc::clone(&self.errors);
        let last = persisted.clone();
        let content = persisted.bimap(
            |text: &String| text.clone(),
            move |text: &String| {
                if *text != last.get() {
                    match fs::write(&file, text) {
                        Ok(()) => tracing::debug!(path = %file.display(), bytes = text.len(), "saved config"),
                        Err(source) => {
                            let error = Error::io(&file, source);
                            tracing::error!(%error, "failed to save config");
                            errors.lock().push(error);
                        }
                    }
                }
                text.clone()
            },
        );

        tracing::info!(path = %path.display(), "loaded config");
        Ok(content)
    }

    /// Drain the I/O errors raised while reloading or saving files.
    pub fn take_errors(&self) -> Vec<Error> {
        std::mem::take(&mut *self.errors.lock())
    }
}

impl std::fmt::Debug for ConfigManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigManager")
            .field("watcher", &self.watcher)
            .field("options", &self.options)
            .field("pending_errors", &self.errors.lock().len())
            .finish()
    }
}

fn create_missing(path: &Path) -> Result<()> {
    if path.exists() {
        return Ok(());
    }

    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| Error::io(parent, source))?;
    }

    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| Error::io(path, source))?;

    tracing::debug!(path = %path.display(), "created config file");
    Ok(())
}
