//! Reelscan - media library scanner and metadata merge pipeline
//!
//! This library crate exposes the core functionality for integration testing.

pub mod config;
pub mod merge;
pub mod metadata;
pub mod model;
pub mod probe;
pub mod recheck;
pub mod scanner;
pub mod sidecar;
pub mod state;
pub mod vfs;
pub mod workers;
