//! Live Configuration Files
//!
//! Configuration files exposed as trees of properties. Reading a key gives a
//! property linked to the document; writing it saves the file, and edits
//! made to the file on disk flow back into every property read from it.
//!
//! # Layers
//!
//! 1. [`FileWatcher`] notices when a file changes on disk.
//!
//! 2. [`ConfigManager`] mirrors a file's text in a `Property<String>` and
//!    saves writes made through it.
//!
//! 3. A [`ConfigTransformer`] (JSON by default) links that text to a
//!    document object.
//!
//! 4. [`ConfigNode`] hands out one property per key, each linked to the
//!    object.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tether_core::config::{ConfigManager, FileWatcher};
//!
//! # async fn run() -> tether_core::Result<()> {
//! let watcher = Arc::new(FileWatcher::new()?);
//! let _poller = watcher.spawn(Duration::from_secs(1));
//!
//! let manager = ConfigManager::new(watcher);
//! let server = manager.load("./server.json")?.node("server");
//! let port = server.get_u64("port");
//!
//! port.add_change_listener(|port| println!("port is now {port:?}"));
//! # Ok(())
//! # }
//! ```

mod manager;
mod node;
mod options;
mod transformer;
mod watcher;

pub use manager::ConfigManager;
pub use node::{ConfigNode, JsonObject};
pub use options::ConfigOptions;
pub use transformer::{ConfigTransformer, JsonTransformer};
pub use watcher::{FileWatcher, WatchCallback};
