pub mod backfill;
pub mod cache;
pub mod duration_source;
pub mod error;
pub mod scheduler;
pub mod validation;
