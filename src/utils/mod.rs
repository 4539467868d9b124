//! Small cross-cutting helpers shared by more than one subsystem.

pub mod jitter;
