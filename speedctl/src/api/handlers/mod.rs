//! HTTP request handlers for the ingest API.
//!
//! - [`hosts`]: throughput target administration
//! - [`speed_tests`]: speed test submission, queries and deletion
//! - [`throughput_tests`]: throughput test submission, queries and deletion
//! - [`runs`]: on-demand speed tests and throughput runs
//! - [`dashboard`]: summary of recent and slowest measurements
//!
//! Submissions go through [`crate::sink::direct`], so a record posted here is stored exactly
//! like one written by a daemon in direct mode.

pub mod dashboard;
pub mod hosts;
pub mod runs;
