// src/error.rs
use thiserror::Error;
use warp::http::StatusCode;
use warp::reject::Reject;

/// Every failure a dashboard stage can produce.
///
/// Variants carry rendered messages rather than source errors so the type is
/// `Clone`; the memo cache hands one failure to every waiter on the same key.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DashboardError {
    #[error("network failure fetching {url}: {message}")]
    Network { url: String, message: String },

    #[error("could not parse {what}: {message}")]
    Parse { what: String, message: String },

    #[error("no data returned for {0}")]
    EmptyDataset(String),

    #[error("forecast failed: {0}")]
    Forecast(String),

    #[error("unknown ticker {0}")]
    UnknownTicker(String),

    #[error("forecast horizon must be between 1 and 4 years, got {0}")]
    InvalidHorizon(u32),

    #[error("failed to render page: {0}")]
    Render(String),
}

impl DashboardError {
    pub fn network(url: impl Into<String>, err: impl std::fmt::Display) -> Self {
        DashboardError::Network {
            url: url.into(),
            message: err.to_string(),
        }
    }

    pub fn parse(what: impl Into<String>, err: impl std::fmt::Display) -> Self {
        DashboardError::Parse {
            what: what.into(),
            message: err.to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            DashboardError::Network { .. } | DashboardError::Parse { .. } => {
                StatusCode::BAD_GATEWAY
            }
            DashboardError::EmptyDataset(_) => StatusCode::NOT_FOUND,
            DashboardError::Forecast(_) => StatusCode::UNPROCESSABLE_ENTITY,
            DashboardError::UnknownTicker(_) | DashboardError::InvalidHorizon(_) => {
                StatusCode::BAD_REQUEST
            }
            DashboardError::Render(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<tera::Error> for DashboardError {
    fn from(err: tera::Error) -> Self {
        // tera nests the useful message in the source chain
        let mut message = err.to_string();
        let mut source = std::error::Error::source(&err);
        while let Some(inner) = source {
            message = format!("{message}: {inner}");
            source = inner.source();
        }
        DashboardError::Render(message)
    }
}

impl Reject for DashboardError {}

pub type Result<T, E = DashboardError> = std::result::Result<T, E>;
