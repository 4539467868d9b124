//! Daemon Registry: lifecycle state machine, capability/capacity index,
//! and the heartbeat sweeper (§4.6).

mod registry;

pub use registry::{DaemonRegistry, RegistryStats};
