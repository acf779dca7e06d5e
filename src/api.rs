// src/api.rs
use crate::dashboard::Dashboard;
use crate::error::DashboardError;
use crate::models::{is_known_ticker, Selection, MIN_YEARS};
use log::{error, info};
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

#[derive(Deserialize)]
struct PageQuery {
    stock: Option<String>,
    index: Option<String>,
    years: Option<u32>,
}

impl PageQuery {
    fn into_selection(self) -> Selection {
        let defaults = Selection::default();
        Selection {
            stock: self.stock.unwrap_or(defaults.stock),
            index: self.index.unwrap_or(defaults.index),
            years: self.years.unwrap_or(defaults.years),
        }
    }
}

#[derive(Deserialize)]
struct HorizonQuery {
    years: Option<u32>,
}

pub fn routes(
    dashboard: Arc<Dashboard>,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let page = warp::path::end()
        .and(warp::get())
        .and(warp::query::<PageQuery>())
        .and(with_dashboard(dashboard.clone()))
        .and_then(page_handler);

    let banner = warp::path!("banner")
        .and(warp::get())
        .and(with_dashboard(dashboard.clone()))
        .map(|dashboard: Arc<Dashboard>| warp::reply::json(&dashboard.banner()));

    let gainers = warp::path!("api" / "gainers")
        .and(warp::get())
        .and(with_dashboard(dashboard.clone()))
        .and_then(gainers_handler);

    let history = warp::path!("api" / "history" / String)
        .and(warp::get())
        .and(with_dashboard(dashboard.clone()))
        .and_then(history_handler);

    let forecast = warp::path!("api" / "forecast" / String)
        .and(warp::get())
        .and(warp::query::<HorizonQuery>())
        .and(with_dashboard(dashboard))
        .and_then(forecast_handler);

    page.or(banner)
        .or(gainers)
        .or(history)
        .or(forecast)
        .recover(handle_rejection)
}

fn with_dashboard(
    dashboard: Arc<Dashboard>,
) -> impl Filter<Extract = (Arc<Dashboard>,), Error = Infallible> + Clone {
    warp::any().map(move || dashboard.clone())
}

// `^NSEI` arrives percent-encoded in the path.
fn decode_ticker(raw: &str) -> Result<String, DashboardError> {
    let ticker = urlencoding::decode(raw)
        .map_err(|_| DashboardError::UnknownTicker(raw.to_string()))?
        .into_owned();
    if is_known_ticker(&ticker) {
        Ok(ticker)
    } else {
        Err(DashboardError::UnknownTicker(ticker))
    }
}

async fn page_handler(
    query: PageQuery,
    dashboard: Arc<Dashboard>,
) -> Result<impl Reply, Rejection> {
    let selection = query.into_selection();
    match dashboard.render(&selection).await {
        Ok(html) => {
            info!("Dashboard rendered for {}.", selection.stock);
            Ok(warp::reply::html(html))
        }
        Err(e) => {
            error!("Failed to render dashboard: {}", e);
            Err(warp::reject::custom(e))
        }
    }
}

async fn gainers_handler(dashboard: Arc<Dashboard>) -> Result<impl Reply, Rejection> {
    match dashboard.gainers().await {
        Ok(table) => {
            info!("Gainers table served.");
            Ok(warp::reply::json(&table))
        }
        Err(e) => {
            error!("Failed to scrape gainers: {}", e);
            Err(warp::reject::custom(e))
        }
    }
}

async fn history_handler(
    ticker: String,
    dashboard: Arc<Dashboard>,
) -> Result<impl Reply, Rejection> {
    let ticker = decode_ticker(&ticker).map_err(warp::reject::custom)?;
    match dashboard.history(&ticker).await {
        Ok(series) => {
            info!("History for {} served.", ticker);
            Ok(warp::reply::json(series.as_ref()))
        }
        Err(e) => {
            error!("Failed to load history for {}: {}", ticker, e);
            Err(warp::reject::custom(e))
        }
    }
}

async fn forecast_handler(
    ticker: String,
    query: HorizonQuery,
    dashboard: Arc<Dashboard>,
) -> Result<impl Reply, Rejection> {
    let ticker = decode_ticker(&ticker).map_err(warp::reject::custom)?;
    let years = query.years.unwrap_or(MIN_YEARS);
    match dashboard.forecast(&ticker, years).await {
        Ok(forecast) => {
            info!("Forecast for {} over {} year(s) served.", ticker, years);
            Ok(warp::reply::json(&forecast))
        }
        Err(e) => {
            error!("Failed to forecast {}: {}", ticker, e);
            Err(warp::reject::custom(e))
        }
    }
}

async fn handle_rejection(rejection: Rejection) -> Result<impl Reply, Infallible> {
    let (status, message) = if let Some(e) = rejection.find::<DashboardError>() {
        (e.status(), e.to_string())
    } else if rejection.is_not_found() {
        (StatusCode::NOT_FOUND, "not found".to_string())
    } else if let Some(e) = rejection.find::<warp::reject::InvalidQuery>() {
        (StatusCode::BAD_REQUEST, e.to_string())
    } else if rejection.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "method not allowed".to_string())
    } else {
        error!("Unhandled rejection: {:?}", rejection);
        (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
    };
    Ok(warp::reply::with_status(
        warp::reply::json(&json!({ "error": message })),
        status,
    ))
}
