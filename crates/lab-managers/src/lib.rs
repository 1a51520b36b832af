//! Lab-manager identification for research groups.
//!
//! The library scores lab memberships against an ordered rule table, selects up to three
//! likely managers per lab, and persists the assignments through a transactional store.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
