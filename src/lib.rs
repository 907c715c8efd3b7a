//! Edgeflow Engine Library
//!
//! Deployment planning and reconciliation for heterogeneous edge/cloud
//! targets: builds a desired state from a solution, diffs it against the
//! previously recorded and live observed states, compiles an ordered
//! deployment plan, and drives pluggable target providers to convergence.

pub mod engine;
pub mod errors;
pub mod events;
pub mod logs;
pub mod models;
pub mod providers;
pub mod stores;
