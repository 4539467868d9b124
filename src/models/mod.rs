//! Domain entities.
//!
//! These are the semantic shapes the core subsystems operate on. Storage
//! bindings live behind the traits in [`crate::repositories`]; these
//! structs carry no persistence concerns of their own.

mod backup;
mod daemon;
mod job;
mod proxy;
mod relay;
mod source;

pub use backup::*;
pub use daemon::*;
pub use job::*;
pub use proxy::*;
pub use relay::*;
pub use source::*;
