//! Home Assistant integration over its REST API.
//!
//! [`HaClient`] reads and writes entity states and calls services; the
//! [`EntityWatcher`] turns an entity's state into a stream of change
//! notifications.

pub mod client;
pub mod error;
pub mod watcher;

pub use {
    client::{EntityState, HaClient},
    error::{Error, Result},
    watcher::EntityWatcher,
};
