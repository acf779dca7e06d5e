// src/models.rs
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const STOCKS: [&str; 4] = ["GOOG", "AAPL", "MSFT", "GME"];
pub const INDICES: [&str; 3] = ["^NSEI", "^NSEBANK", "^BSESN"];
pub const BANNER_ITEMS: [&str; 7] = [
    "Suzlon",
    "Tesla",
    "Amazon",
    "Microsoft",
    "Google",
    "Apple",
    "Facebook",
];

pub const MIN_YEARS: u32 = 1;
pub const MAX_YEARS: u32 = 4;

/// Scraped weekly gainers. Every row holds exactly `columns.len()` cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GainersTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl GainersTable {
    /// Rows in page order, each keyed by column header.
    pub fn records(&self) -> impl Iterator<Item = BTreeMap<&str, &str>> + '_ {
        self.rows.iter().map(|row| {
            self.columns
                .iter()
                .map(String::as_str)
                .zip(row.iter().map(String::as_str))
                .collect()
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

/// Daily bars for one ticker, ascending by date with no duplicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    pub ticker: String,
    pub bars: Vec<PriceBar>,
}

impl PriceSeries {
    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn tail(&self, n: usize) -> &[PriceBar] {
        &self.bars[self.bars.len().saturating_sub(n)..]
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.bars.last().map(|bar| bar.date)
    }
}

/// One row of the frame the forecaster is trained on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainingPoint {
    pub ds: NaiveDate,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub yhat: f64,
    pub yhat_lower: f64,
    pub yhat_upper: f64,
    pub trend: f64,
    pub yearly: Option<f64>,
    pub weekly: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastSeries {
    pub ticker: String,
    pub points: Vec<ForecastPoint>,
}

impl ForecastSeries {
    pub fn tail(&self, n: usize) -> &[ForecastPoint] {
        &self.points[self.points.len().saturating_sub(n)..]
    }

    pub fn has_yearly(&self) -> bool {
        self.points.first().is_some_and(|p| p.yearly.is_some())
    }

    pub fn has_weekly(&self) -> bool {
        self.points.first().is_some_and(|p| p.weekly.is_some())
    }
}

/// What the visitor picked on the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub stock: String,
    pub index: String,
    pub years: u32,
}

impl Default for Selection {
    fn default() -> Self {
        Selection {
            stock: STOCKS[0].to_string(),
            index: INDICES[0].to_string(),
            years: MIN_YEARS,
        }
    }
}

/// Forecast horizon in days.
pub fn horizon_days(years: u32) -> usize {
    years as usize * 365
}

pub fn is_known_ticker(ticker: &str) -> bool {
    STOCKS.contains(&ticker) || INDICES.contains(&ticker)
}
