//! End-to-end tests against an in-memory game service.

mod orchestrator_flow;
mod scheduler_flow;
mod session_flow;
