//! Domain layer - DB queries for videos and their interaction points
//!
//! Query functions use the generic Executor pattern, allowing them to work with
//! both `&PgPool` (for standalone queries) and `&mut PgConnection` (for transactions).

pub mod questions;
pub mod videos;
