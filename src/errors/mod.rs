//! Centralized error handling.
//!
//! Every error that crosses a component boundary is wrapped as [`AppError`],
//! which carries enough structure for callers (the Scheduler's retry policy,
//! the Progress Service's error detail) to classify it without parsing
//! messages. See [`ErrorKind`] for the taxonomy.

mod types;

pub use types::*;

pub type AppResult<T> = Result<T, AppError>;
