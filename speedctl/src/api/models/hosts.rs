use crate::db::models::hosts::{HostCreateDBRequest, HostFilter, HostUpdateDBRequest};
use crate::errors::{Error, Result};
use crate::types::HostCategory;
use serde::{Deserialize, Serialize};
use serde_with::rust::double_option;

/// Query parameters for `GET /hosts`
#[derive(Debug, Default, Deserialize)]
pub struct HostsQuery {
    /// `true` for hosts eligible for testing only
    pub active: Option<bool>,
    pub category: Option<HostCategory>,
}

impl From<HostsQuery> for HostFilter {
    fn from(query: HostsQuery) -> Self {
        Self {
            active: query.active,
            category: query.category,
        }
    }
}

/// Body of `POST /hosts`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostCreate {
    pub name: String,
    pub hostname: String,
    pub port: Option<i32>,
    pub category: HostCategory,
    pub active: Option<bool>,
    pub description: Option<String>,
}

/// Body of `PATCH /hosts/{id}`. Absent fields are left as they are; `"description": null` clears it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostUpdate {
    pub name: Option<String>,
    pub hostname: Option<String>,
    pub port: Option<i32>,
    pub category: Option<HostCategory>,
    pub active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "double_option")]
    pub description: Option<Option<String>>,
}

fn require_text(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::BadRequest {
            message: format!("{field} must not be empty"),
        });
    }
    Ok(())
}

fn require_port(port: Option<i32>) -> Result<()> {
    match port {
        Some(port) if !(1..=65535).contains(&port) => Err(Error::BadRequest {
            message: format!("port {port} is out of range"),
        }),
        _ => Ok(()),
    }
}

impl HostCreate {
    pub fn validate(&self) -> Result<()> {
        require_text("name", &self.name)?;
        require_text("hostname", &self.hostname)?;
        require_port(self.port)
    }
}

impl HostUpdate {
    pub fn validate(&self) -> Result<()> {
        if let Some(name) = &self.name {
            require_text("name", name)?;
        }
        if let Some(hostname) = &self.hostname {
            require_text("hostname", hostname)?;
        }
        require_port(self.port)
    }
}

impl From<HostCreate> for HostCreateDBRequest {
    fn from(create: HostCreate) -> Self {
        Self {
            name: create.name.trim().to_string(),
            hostname: create.hostname.trim().to_string(),
            port: create.port,
            category: create.category,
            active: create.active,
            description: create.description,
        }
    }
}

impl From<HostUpdate> for HostUpdateDBRequest {
    fn from(update: HostUpdate) -> Self {
        Self {
            name: update.name.map(|n| n.trim().to_string()),
            hostname: update.hostname.map(|h| h.trim().to_string()),
            port: update.port,
            category: update.category,
            active: update.active,
            description: update.description,
        }
    }
}
