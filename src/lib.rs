//! Reelfetch - resilient fetching of movie artwork and metadata
//!
//! This library crate exposes the engine and its components for embedding and
//! integration testing.

pub mod cache;
pub mod config;
pub mod engine;
pub mod fetch;
pub mod rate_limit;
pub mod retry;
pub mod scheduler;
pub mod sources;

pub use engine::{EngineStats, FetchEngine, FetchOptions, Fetched, Origin, Resource};
pub use reelfetch_common::{Error, Priority, Result, TaskId};
