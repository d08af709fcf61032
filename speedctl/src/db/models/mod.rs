//! Database record models matching table schemas.
//!
//! Row structs derive `sqlx::FromRow` for query results and `serde` so the ingest API and
//! the remote submission sink can exchange them directly. Create and update requests are
//! plain structs consumed by the repositories in [`crate::db::handlers`].
//!
//! - [`hosts`]: iperf3 targets grouped by network category
//! - [`speed_tests`]: internet speed measurements
//! - [`throughput_tests`]: point-to-point throughput measurements, including failed attempts

pub mod hosts;
