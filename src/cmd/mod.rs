//! Command-line entry points.

pub mod ask;
pub mod schema;
pub mod serve;
