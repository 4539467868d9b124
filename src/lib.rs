//! The operational concurrency spine of an IPTV aggregation/proxying
//! service: Ingestion Coordinator, Proxy Generation Orchestrator, Backup
//! Engine, Daemon Registry, Relay Session Manager, and the Scheduler +
//! Runner that drives all of them from a cron catalogue.
//!
//! Persistence, HTTP/API surfaces, and format-specific parsing (M3U,
//! Xtream, XMLTV) are out of scope; this crate owns the coordination
//! logic around those seams.

pub mod backup;
pub mod config;
pub mod daemon;
pub mod errors;
pub mod ids;
pub mod ingestor;
pub mod models;
pub mod pipeline;
pub mod progress;
pub mod relay;
pub mod repositories;
pub mod scheduler;
pub mod utils;

pub use errors::{AppError, AppResult, ErrorKind};
pub use ids::SortableId;
