//! Database repository for throughput target hosts.

use crate::db::errors::{DbError, Result};
use crate::db::handlers::repository::Repository;
use crate::db::models::hosts::{DEFAULT_IPERF_PORT, Host, HostCreateDBRequest, HostFilter, HostUpdateDBRequest};
use crate::types::{HostCategory, HostId};
use sqlx::PgConnection;
use tracing::instrument;

pub struct Hosts<'c> {
    db: &'c mut PgConnection,
}

#[async_trait::async_trait]
impl<'c> Repository for Hosts<'c> {
    type CreateRequest = HostCreateDBRequest;
    type UpdateRequest = HostUpdateDBRequest;
    type Response = Host;
    type Id = HostId;
    type Filter = HostFilter;

    #[instrument(skip(self, request), fields(name = %request.name, category = %request.category), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let host = sqlx::query_as::<_, Host>(
            r#"
            INSERT INTO hosts (name, hostname, port, category, active, description)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(&request.name)
        .bind(&request.hostname)
        .bind(request.port.unwrap_or(DEFAULT_IPERF_PORT))
        .bind(request.category)
        .bind(request.active.unwrap_or(true))
        .bind(&request.description)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(host)
    }

    #[instrument(skip(self), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let host = sqlx::query_as::<_, Host>("SELECT * FROM hosts WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(host)
    }

    #[instrument(skip(self, filter), fields(active = ?filter.active, category = ?filter.category), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let hosts = sqlx::query_as::<_, Host>(
            r#"
            SELECT * FROM hosts
            WHERE ($1::boolean IS NULL OR active = $1)
              AND ($2::text IS NULL OR category = $2)
            ORDER BY name ASC, id ASC
            "#,
        )
        .bind(filter.active)
        .bind(filter.category)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(hosts)
    }

    #[instrument(skip(self), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM hosts WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let host = sqlx::query_as::<_, Host>(
            r#"
            UPDATE hosts SET
                name = COALESCE($2, name),
                hostname = COALESCE($3, hostname),
                port = COALESCE($4, port),
                category = COALESCE($5, category),
                active = COALESCE($6, active),
                description = CASE
                    WHEN $7 THEN $8
                    ELSE description
                END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&request.name)
        .bind(&request.hostname)
        .bind(request.port)
        .bind(request.category)
        .bind(request.active)
        .bind(request.description.is_some())
        .bind(request.description.clone().flatten())
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(host)
    }
}

impl<'c> Hosts<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Active hosts, optionally restricted to one category.
    pub async fn list_active(&mut self, category: Option<HostCategory>) -> Result<Vec<Host>> {
        let filter = HostFilter {
            active: Some(true),
            category,
        };
        self.list(&filter).await
    }
}
