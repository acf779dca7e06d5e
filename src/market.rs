// src/market.rs
use crate::error::{DashboardError, Result};
use crate::models::{PriceBar, PriceSeries};
use async_trait::async_trait;
use chrono::{DateTime, Days, NaiveDate, NaiveTime};
use log::{info, warn};
use reqwest::Client;
use serde::Deserialize;

/// Source of daily OHLCV bars.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Bars dated inside `[start, end]`, ascending, one per day.
    async fn daily_bars(&self, ticker: &str, start: NaiveDate, end: NaiveDate)
        -> Result<PriceSeries>;
}

#[derive(Deserialize)]
struct ChartEnvelope {
    chart: ChartBody,
}

#[derive(Deserialize)]
struct ChartBody {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Deserialize)]
struct ChartResult {
    #[serde(default)]
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Deserialize, Default)]
struct ChartMeta {
    #[serde(default, rename = "gmtoffset")]
    gmt_offset: i64,
}

#[derive(Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<QuoteColumns>,
}

// The endpoint leaves `null` holes for halted sessions.
#[derive(Deserialize, Default)]
struct QuoteColumns {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<u64>>,
}

/// Daily bars from the Yahoo Finance chart endpoint.
pub struct YahooChartProvider {
    client: Client,
    base_url: String,
}

impl YahooChartProvider {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        YahooChartProvider {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn chart_url(&self, ticker: &str) -> String {
        format!("{}/v8/finance/chart/{}", self.base_url, ticker)
    }
}

#[async_trait]
impl MarketDataProvider for YahooChartProvider {
    async fn daily_bars(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PriceSeries> {
        let url = self.chart_url(ticker);
        let period1 = start.and_time(NaiveTime::MIN).and_utc().timestamp();
        let period2 = end
            .checked_add_days(Days::new(1))
            .unwrap_or(end)
            .and_time(NaiveTime::MIN)
            .and_utc()
            .timestamp();
        info!("Downloading {} bars from {} to {}", ticker, start, end);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("period1", period1.to_string()),
                ("period2", period2.to_string()),
                ("interval", "1d".to_string()),
                ("events", "div,split".to_string()),
            ])
            .send()
            .await
            .map_err(|e| DashboardError::network(&url, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| DashboardError::network(&url, e))?;

        // Unknown symbols come back as 404 with a chart error body.
        let envelope = match serde_json::from_str::<ChartEnvelope>(&body) {
            Ok(envelope) => envelope,
            Err(_) if !status.is_success() => {
                warn!("Chart request for {} answered HTTP {}", ticker, status);
                return Err(DashboardError::network(&url, format!("HTTP {status}")));
            }
            Err(e) => return Err(DashboardError::parse(format!("{ticker} chart"), e)),
        };

        let bars = extract_bars(ticker, envelope)?;
        let series = PriceSeries {
            ticker: ticker.to_string(),
            bars: normalize(bars, start, end),
        };
        if series.is_empty() {
            return Err(DashboardError::EmptyDataset(ticker.to_string()));
        }
        if let Some(last) = series.last_date() {
            info!("Loaded {} bars for {} through {}", series.bars.len(), ticker, last);
        }
        Ok(series)
    }
}

fn extract_bars(ticker: &str, envelope: ChartEnvelope) -> Result<Vec<PriceBar>> {
    if let Some(err) = envelope.chart.error {
        warn!("Chart error for {}: {} ({})", ticker, err.description, err.code);
        return Err(DashboardError::EmptyDataset(format!(
            "{ticker}: {}",
            err.description
        )));
    }

    let Some(result) = envelope.chart.result.and_then(|r| r.into_iter().next()) else {
        return Err(DashboardError::EmptyDataset(ticker.to_string()));
    };
    let quote = result.indicators.quote.into_iter().next().unwrap_or_default();
    let offset = result.meta.gmt_offset;

    let mut bars = Vec::with_capacity(result.timestamp.len());
    for (i, ts) in result.timestamp.iter().enumerate() {
        let column = |values: &[Option<f64>]| values.get(i).copied().flatten();
        let (Some(open), Some(high), Some(low), Some(close)) = (
            column(&quote.open),
            column(&quote.high),
            column(&quote.low),
            column(&quote.close),
        ) else {
            continue;
        };
        let Some(stamp) = DateTime::from_timestamp(ts + offset, 0) else {
            continue;
        };
        bars.push(PriceBar {
            date: stamp.date_naive(),
            open,
            high,
            low,
            close,
            volume: quote.volume.get(i).copied().flatten().unwrap_or(0),
        });
    }
    Ok(bars)
}

/// Clamp to `[start, end]`, sort ascending, keep the last bar seen for a date.
pub fn normalize(mut bars: Vec<PriceBar>, start: NaiveDate, end: NaiveDate) -> Vec<PriceBar> {
    bars.retain(|bar| bar.date >= start && bar.date <= end);
    bars.sort_by_key(|bar| bar.date);

    let mut out: Vec<PriceBar> = Vec::with_capacity(bars.len());
    for bar in bars {
        match out.last_mut() {
            Some(last) if last.date == bar.date => *last = bar,
            _ => out.push(bar),
        }
    }
    out
}
