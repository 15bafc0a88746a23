//! Command-line entry points.

pub mod extract;
pub mod reconcile;
pub mod rename;
pub mod schema;
