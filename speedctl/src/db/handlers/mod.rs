//! Repository implementations for database access.
//!
//! Each repository wraps a borrowed `PgConnection` (a pooled connection or a transaction),
//! binds parameters at runtime and returns the row types from [`crate::db::models`].
//!
//! # Available Repositories
//!
//! - [`Hosts`]: throughput targets, implements the CRUD [`Repository`] trait
//! - [`SpeedTests`]: speed measurements, append-only with queries and administrative delete
//! - [`ThroughputTests`]: throughput measurements, append-only with queries and administrative delete
//!
//! ```ignore
//! use speedctl::db::handlers::ThroughputTests;
//!
//! let mut conn = pool.acquire().await?;
//! let slowest = ThroughputTests::new(&mut conn).slowest(10).await?;
//! ```

pub mod hosts;
pub mod repository;

pub use hosts::Hosts;
pub use repository::Repository;
pub use speed_tests::SpeedTests;
pub use throughput_tests::ThroughputTests;
