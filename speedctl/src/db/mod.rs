//! Database layer for hosts and measurement persistence.
//!
//! This module implements the data access layer using SQLx with PostgreSQL.
//! It follows the Repository pattern to keep queries out of the daemon and the ingest API.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────┐
//! │ DirectSink / ingest API  │
//! └────────────┬─────────────┘
//!              │
//!              ↓
//! ┌──────────────────────────┐
//! │ Repositories             │  (db::handlers - queries)
//! └────────────┬─────────────┘
//!              │
//!              ↓
//! ┌──────────────────────────┐
//! │ Models                   │  (db::models - request/response records)
//! └────────────┬─────────────┘
//!              │
//!              ↓
//! ┌──────────────────────────┐
//! │ PostgreSQL               │
//! └──────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`handlers`]: Repository implementations for each table
//! - [`models`]: Request and response structures for each table
//! - [`errors`]: Database-specific error types
//!
//! ## Example Usage
//!
//! ```ignore
//! use speedctl::db::handlers::{Hosts, Repository};
//!
//! async fn example(pool: &sqlx::PgPool) -> Result<(), Box<dyn std::error::Error>> {
//!     let mut conn = pool.acquire().await?;
//!     let mut hosts = Hosts::new(&mut conn);
//!
//!     for host in hosts.list_active(None).await? {
//!         println!("{} -> {}:{}", host.name, host.hostname, host.port);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Migrations
//!
//! Migrations live in the `migrations/` directory and are embedded into the binary.
//! The [`crate::migrator`] function provides access to the migrator:
//!
//! ```ignore
//! speedctl::migrator().run(&pool).await?;
//! ```

pub mod errors;
pub mod handlers;
pub mod models;
