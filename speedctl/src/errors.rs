use crate::db::errors::DbError;
use crate::types::{HostCategory, HostId};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::time::Duration;
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// External tool ran past its deadline and was killed
    #[error("{command} timed out after {}s", deadline.as_secs())]
    ProcessTimeout { command: String, deadline: Duration },

    /// External tool failed to spawn, exited non-zero, or was cancelled
    #[error("{command} failed: {detail}")]
    ProcessExecutionFailed {
        command: String,
        detail: String,
        stderr: Option<String>,
    },

    /// Tool output could not be parsed into a measurement
    #[error("failed to parse {tool} output: {reason}")]
    NormalizationFailed {
        tool: &'static str,
        reason: String,
        /// Raw stdout, kept for diagnostics
        raw: Vec<u8>,
    },

    /// No active host in the category. A skip signal, not a failure.
    #[error("no eligible {category} hosts")]
    NoEligibleHosts { category: HostCategory },

    /// Submission API answered with a non-success status
    #[error("submission rejected with status {status}: {body}")]
    SubmissionRejected { status: u16, body: String },

    /// Submission API could not be reached
    #[error("submission endpoint {endpoint} unreachable")]
    SubmissionUnreachable {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    /// Storage refused or failed a write
    #[error("failed to persist {entity}")]
    PersistenceWriteFailed {
        entity: &'static str,
        #[source]
        source: DbError,
    },

    /// Referenced host does not exist
    #[error("host {id} not found")]
    HostNotFound { id: HostId },

    /// Requested measurement does not exist
    #[error("{resource} with ID {id} not found")]
    NotFound { resource: String, id: String },

    /// Invalid request data
    #[error("{message}")]
    BadRequest { message: String },

    /// Database operation error
    #[error(transparent)]
    Database(#[from] DbError),

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Raw tool output carried by a normalization failure, lossily decoded for logs.
    pub fn raw_output(&self) -> Option<String> {
        match self {
            Error::NormalizationFailed { raw, .. } => Some(String::from_utf8_lossy(raw).into_owned()),
            _ => None,
        }
    }

    /// Display text plus captured stderr, for storing alongside a failed measurement.
    pub fn detail(&self) -> String {
        match self {
            Error::ProcessExecutionFailed { stderr: Some(stderr), .. } => format!("{self}: {stderr}"),
            _ => self.to_string(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::HostNotFound { .. } | Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Error::ProcessTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Error::ProcessExecutionFailed { .. } | Error::NormalizationFailed { .. } => StatusCode::BAD_GATEWAY,
            Error::PersistenceWriteFailed { source, .. } | Error::Database(source) => match source {
                DbError::NotFound => StatusCode::NOT_FOUND,
                DbError::UniqueViolation { .. } => StatusCode::CONFLICT,
                DbError::ForeignKeyViolation { .. } | DbError::CheckViolation { .. } => StatusCode::BAD_REQUEST,
                DbError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Error::NoEligibleHosts { .. } => StatusCode::NOT_FOUND,
            Error::SubmissionRejected { .. } | Error::SubmissionUnreachable { .. } => StatusCode::BAD_GATEWAY,
            Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::HostNotFound { .. } | Error::NotFound { .. } | Error::BadRequest { .. } | Error::NoEligibleHosts { .. } => {
                self.to_string()
            }
            // Captured stderr and raw output stay in the logs
            Error::ProcessTimeout { .. } | Error::ProcessExecutionFailed { .. } | Error::NormalizationFailed { .. } => {
                self.to_string()
            }
            Error::PersistenceWriteFailed { source, .. } | Error::Database(source) => match source {
                DbError::NotFound => "Resource not found".to_string(),
                DbError::UniqueViolation { .. } => "Resource already exists".to_string(),
                DbError::ForeignKeyViolation { .. } => "Invalid reference to related resource".to_string(),
                DbError::CheckViolation { .. } => "Invalid data provided".to_string(),
                DbError::Other(_) => "Database error occurred".to_string(),
            },
            _ => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Internal service error: {:#}", self);
        } else if matches!(self, Error::PersistenceWriteFailed { .. } | Error::Database(_)) {
            tracing::warn!("Database constraint error: {:#}", self);
        } else {
            tracing::debug!("Client error: {}", self);
        }

        (status, self.user_message()).into_response()
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;
