//! Reelfetch-Common: Shared types and errors.
//!
//! This crate provides common functionality used across reelfetch:
//!
//! - **Error Handling**: The fetch error taxonomy and result alias
//! - **Task IDs**: Caller-named or generated task identifiers
//! - **Core Types**: Task priority, task lifecycle state, endpoint tiers
//!
//! # Examples
//!
//! ```
//! use reelfetch_common::{Error, Priority, Result, TaskId};
//!
//! let id = TaskId::named("poster-550");
//! assert!(Priority::High > Priority::Normal);
//!
//! fn example() -> Result<()> {
//!     Err(Error::QueueFull { capacity: 10 })
//! }
//! assert!(!example().unwrap_err().is_retryable());
//! # let _ = id;
//! ```

pub mod error;
pub mod ids;
pub mod types;

pub use error::{AttemptFailure, Error, FailureReport, Result};
pub use ids::*;
pub use types::*;
