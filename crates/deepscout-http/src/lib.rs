//! `deepscout` crate (library surface).
//!
//! The primary entrypoint for end users is the `deepscout` binary (HTTP server + CLI).
//! The library exposes the orchestration pieces so they can be embedded or tested without
//! going through either surface.

pub use deepscout_core as core;
pub use deepscout_local as local;

pub mod config;
pub mod pool;
pub mod render;
pub mod report;
pub mod research;
pub mod server;
pub mod summarize;
pub mod table;
