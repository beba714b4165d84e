//! Personal RSS/Atom/RDF feed reader.
//!
//! [`app::App`] is the entry point: it subscribes to feeds, refreshes them
//! through the [`feed`] ingestion pipeline, and keeps articles, marks and
//! collections in a [`storage::KeyValueStore`].

pub mod app;
pub mod config;
pub mod feed;
pub mod refresh;
pub mod storage;
pub mod sync;
pub mod util;
