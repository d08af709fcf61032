//! Request and response payloads of the ingest API.
//!
//! Stored rows from [`crate::db::models`] are returned as-is; this module holds the inbound
//! shapes plus the aggregate responses of the run and dashboard routes.

pub mod dashboard;
pub mod hosts;
pub mod results;
pub mod runs;
pub mod submissions;
