//! Core engine: per-account scheduling, economy side effects, and the
//! multi-account orchestrator.

pub mod economy;
pub mod orchestrator;
pub mod scheduler;
