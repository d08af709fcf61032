use crate::AppState;
use crate::api::models::hosts::{HostCreate, HostUpdate, HostsQuery};
use crate::db::handlers::{Hosts, Repository};
use crate::db::models::hosts::{Host, HostCreateDBRequest, HostFilter, HostUpdateDBRequest};
use crate::errors::{Error, Result};
use crate::types::HostId;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

fn host_not_found(id: HostId) -> Error {
    Error::NotFound {
        resource: "Host".to_string(),
        id: id.to_string(),
    }
}

// GET /hosts - List hosts, optionally ?active=true&category=lan
#[tracing::instrument(skip_all)]
pub async fn list_hosts(State(state): State<AppState>, Query(query): Query<HostsQuery>) -> Result<Json<Vec<Host>>> {
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Hosts::new(&mut pool_conn);

    let hosts = repo.list(&HostFilter::from(query)).await?;
    Ok(Json(hosts))
}

// POST /hosts - Add a throughput target
#[tracing::instrument(skip_all)]
pub async fn create_host(State(state): State<AppState>, Json(create): Json<HostCreate>) -> Result<(StatusCode, Json<Host>)> {
    create.validate()?;

    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Hosts::new(&mut pool_conn);

    let host = repo.create(&HostCreateDBRequest::from(create)).await?;
    Ok((StatusCode::CREATED, Json(host)))
}

// GET /hosts/{id}
#[tracing::instrument(skip_all)]
pub async fn get_host(State(state): State<AppState>, Path(id): Path<HostId>) -> Result<Json<Host>> {
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Hosts::new(&mut pool_conn);

    match repo.get_by_id(id).await? {
        Some(host) => Ok(Json(host)),
        None => Err(host_not_found(id)),
    }
}

// PATCH /hosts/{id} - Partial update
#[tracing::instrument(skip_all)]
pub async fn update_host(
    State(state): State<AppState>,
    Path(id): Path<HostId>,
    Json(update): Json<HostUpdate>,
) -> Result<Json<Host>> {
    update.validate()?;

    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Hosts::new(&mut pool_conn);

    let host = repo.update(id, &HostUpdateDBRequest::from(update)).await?;
    Ok(Json(host))
}

// DELETE /hosts/{id} - Past measurements keep their data and lose the host reference
#[tracing::instrument(skip_all)]
pub async fn delete_host(State(state): State<AppState>, Path(id): Path<HostId>) -> Result<StatusCode> {
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Hosts::new(&mut pool_conn);

    if repo.delete(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(host_not_found(id))
    }
}
