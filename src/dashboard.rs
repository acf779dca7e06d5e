// src/dashboard.rs
use crate::banner::BannerFrame;
use crate::cache::CachedLoader;
use crate::error::{DashboardError, Result};
use crate::forecast::{self, ForecastSettings};
use crate::gainers::fetch_gainers;
use crate::models::{
    ForecastSeries, GainersTable, PriceSeries, Selection, INDICES, MAX_YEARS, MIN_YEARS, STOCKS,
};
use crate::render::{self, Block, Choice, Controls, Page, Templates, PREVIEW_ROWS};
use chrono::{NaiveDate, Utc};
use log::{error, info, warn};
use reqwest::Client;
use std::sync::Arc;
use tokio::sync::watch;

pub const TITLE: &str = "Stock Forecast App";

/// Everything one page render needs; shared by all requests.
pub struct Dashboard {
    client: Client,
    gainers_url: String,
    history_start: NaiveDate,
    loader: CachedLoader,
    banner: watch::Receiver<BannerFrame>,
    templates: Templates,
    forecast_settings: ForecastSettings,
}

impl Dashboard {
    pub fn new(
        client: Client,
        gainers_url: impl Into<String>,
        history_start: NaiveDate,
        loader: CachedLoader,
        banner: watch::Receiver<BannerFrame>,
        templates: Templates,
    ) -> Self {
        Dashboard {
            client,
            gainers_url: gainers_url.into(),
            history_start,
            loader,
            banner,
            templates,
            forecast_settings: ForecastSettings::default(),
        }
    }

    pub fn banner(&self) -> BannerFrame {
        self.banner.borrow().clone()
    }

    pub fn validate(&self, selection: &Selection) -> Result<()> {
        if !STOCKS.contains(&selection.stock.as_str()) {
            return Err(DashboardError::UnknownTicker(selection.stock.clone()));
        }
        if !INDICES.contains(&selection.index.as_str()) {
            return Err(DashboardError::UnknownTicker(selection.index.clone()));
        }
        validate_years(selection.years)
    }

    pub async fn gainers(&self) -> Result<GainersTable> {
        fetch_gainers(&self.client, &self.gainers_url).await
    }

    /// Daily bars from the configured start through today.
    pub async fn history(&self, ticker: &str) -> Result<Arc<PriceSeries>> {
        let today = Utc::now().date_naive();
        self.loader.load(ticker, self.history_start, today).await
    }

    pub async fn forecast(&self, ticker: &str, years: u32) -> Result<ForecastSeries> {
        validate_years(years)?;
        let series = self.history(ticker).await?;
        self.fit(series, years).await
    }

    async fn fit(&self, series: Arc<PriceSeries>, years: u32) -> Result<ForecastSeries> {
        let settings = self.forecast_settings.clone();
        tokio::task::spawn_blocking(move || forecast::forecast(&series, years, &settings))
            .await
            .map_err(|e| DashboardError::Forecast(e.to_string()))?
    }

    pub async fn render(&self, selection: &Selection) -> Result<String> {
        self.validate(selection)?;
        let page = self.page(selection).await;
        page.render(&self.templates)
    }

    /// Run every stage in page order. Stage failures become visible blocks.
    pub async fn page(&self, selection: &Selection) -> Page {
        info!(
            "Rendering dashboard for {} / {} over {} year(s)",
            selection.stock, selection.index, selection.years
        );
        let mut page = Page::new(TITLE);
        page.push(Block::subheader("Top Stocks to Watch"));
        page.push(Block::Banner(self.banner()));

        page.push(Block::subheader("Top Performing Stocks of the Week"));
        match self.gainers().await {
            Ok(table) => page.push(Block::Table(render::gainers_table(&table))),
            Err(e) => {
                error!("Gainers table unavailable: {}", e);
                page.push(failure_block("Top gainers are unavailable", &e))
            }
        };

        page.push(Block::Controls(controls(selection)));

        let load_state = page.placeholder();
        let stock = self.history(&selection.stock).await;
        page.replace(
            load_state,
            match &stock {
                Ok(_) => Block::text("Loading data... done!"),
                Err(e) => failure_block(&format!("Could not load {}", selection.stock), e),
            },
        );
        let index = self.history(&selection.index).await;

        page.push(Block::subheader("Real-Time Stats for Selected Index"));
        match &index {
            Ok(series) => page.push(Block::Table(render::bars_preview(series, PREVIEW_ROWS))),
            Err(e) => {
                warn!("Index {} unavailable: {}", selection.index, e);
                page.push(failure_block(&format!("No data for {}", selection.index), e))
            }
        };

        page.push(Block::subheader("Raw Data for Selected Stock"));
        let Ok(stock) = stock else {
            page.push(Block::notice(format!(
                "Charts and forecast for {} are skipped until its prices load.",
                selection.stock
            )));
            self.index_charts(&mut page, selection, &index);
            return page;
        };
        page.push(Block::Table(render::bars_preview(&stock, PREVIEW_ROWS)));
        page.push(Block::Chart(render::price_chart(
            "raw-chart",
            "Time Series Data with Rangeslider",
            &stock,
            "Stock Open",
            "Stock Close",
        )));

        self.index_charts(&mut page, selection, &index);

        match self.fit(stock.clone(), selection.years).await {
            Ok(forecast) => {
                page.push(Block::subheader("Forecast Data for Selected Stock"));
                page.push(Block::Table(render::forecast_preview(&forecast, PREVIEW_ROWS)));
                page.push(Block::subheader(format!(
                    "Forecast Plot for {} Years for Selected Stock",
                    selection.years
                )));
                page.push(Block::Chart(render::forecast_chart(
                    "forecast-chart",
                    &format!("Forecast for {}", selection.stock),
                    &stock,
                    &forecast,
                )));
                page.push(Block::text("Forecast Components for Selected Stock"));
                for chart in render::component_charts("components", &forecast) {
                    page.push(Block::Chart(chart));
                }
            }
            Err(e) => {
                error!("Forecast for {} failed: {}", selection.stock, e);
                page.push(Block::subheader("Forecast Data for Selected Stock"));
                page.push(failure_block("Forecast unavailable", &e));
            }
        }
        page
    }

    fn index_charts(
        &self,
        page: &mut Page,
        selection: &Selection,
        index: &Result<Arc<PriceSeries>>,
    ) {
        let Ok(index) = index else {
            return;
        };
        let name = &selection.index;
        page.push(Block::subheader("Real-Time Charts for Selected Index"));
        page.push(Block::Chart(render::price_chart(
            "index-chart",
            &format!("Time Series Data for {name} with Rangeslider"),
            index,
            &format!("{name}_open"),
            &format!("{name}_close"),
        )));
    }
}

fn validate_years(years: u32) -> Result<()> {
    if (MIN_YEARS..=MAX_YEARS).contains(&years) {
        Ok(())
    } else {
        Err(DashboardError::InvalidHorizon(years))
    }
}

fn failure_block(context: &str, err: &DashboardError) -> Block {
    match err {
        DashboardError::EmptyDataset(_) => Block::notice(format!("{context}: {err}")),
        _ => Block::error(format!("{context}: {err}")),
    }
}

fn controls(selection: &Selection) -> Controls {
    let choices = |options: &[&str], picked: &str| -> Vec<Choice> {
        options
            .iter()
            .map(|value| Choice {
                value: value.to_string(),
                selected: *value == picked,
            })
            .collect()
    };
    Controls {
        stocks: choices(&STOCKS, &selection.stock),
        indices: choices(&INDICES, &selection.index),
        years: selection.years,
        min_years: MIN_YEARS,
        max_years: MAX_YEARS,
    }
}
