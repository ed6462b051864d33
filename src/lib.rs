//! simcache: file cache engine for simulation output.
//!
//! An [`OrderedMap`](ds::OrderedMap) primitive carries every replacement
//! policy in [`policy`]. All policies speak the same put/get/refresh protocol
//! defined by [`FileCache`](traits::FileCache), including the waiting-list
//! staging of files that a simulation has not produced yet.

pub mod builder;
pub mod config;
pub mod ds;
pub mod entry;
pub mod env;
pub mod error;
pub mod policy;
pub mod prelude;
pub mod stats;
pub mod storage;
pub mod traits;
