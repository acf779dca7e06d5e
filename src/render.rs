// src/render.rs
use crate::banner::BannerFrame;
use crate::error::Result;
use crate::models::{ForecastPoint, ForecastSeries, GainersTable, PriceSeries};
use chrono::{Datelike, NaiveDate};
use plotly::common::{Fill, Line, Marker, Mode, Title};
use plotly::layout::{Axis, RangeSlider};
use plotly::{Layout, Plot, Scatter};
use serde::Serialize;
use tera::{Context, Tera};

pub const PREVIEW_ROWS: usize = 5;

const PAGE_TEMPLATE: &str = "dashboard.html";

/// Compiled page templates. Autoescaping is on for everything except chart markup.
pub struct Templates {
    tera: Tera,
}

impl Templates {
    pub fn new() -> Result<Self> {
        let mut tera = Tera::default();
        tera.add_raw_template(PAGE_TEMPLATE, include_str!("../templates/dashboard.html"))?;
        Ok(Templates { tera })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableView {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// Teal background with white text.
    pub highlighted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartView {
    pub id: String,
    pub html: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Choice {
    pub value: String,
    pub selected: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Controls {
    pub stocks: Vec<Choice>,
    pub indices: Vec<Choice>,
    pub years: u32,
    pub min_years: u32,
    pub max_years: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Block {
    Subheader { text: String },
    Text { text: String },
    Notice { text: String },
    Error { text: String },
    Table(TableView),
    Chart(ChartView),
    Banner(BannerFrame),
    Controls(Controls),
    Empty,
}

impl Block {
    pub fn subheader(text: impl Into<String>) -> Self {
        Block::Subheader { text: text.into() }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Block::Text { text: text.into() }
    }

    pub fn notice(text: impl Into<String>) -> Self {
        Block::Notice { text: text.into() }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Block::Error { text: text.into() }
    }
}

/// Handle to a block on a [`Page`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot(usize);

/// Rendering context for one request: an ordered list of blocks.
#[derive(Debug, Clone)]
pub struct Page {
    title: String,
    blocks: Vec<Block>,
}

impl Page {
    pub fn new(title: impl Into<String>) -> Self {
        Page {
            title: title.into(),
            blocks: Vec::new(),
        }
    }

    pub fn push(&mut self, block: Block) -> Slot {
        self.blocks.push(block);
        Slot(self.blocks.len() - 1)
    }

    /// Reserve a position to fill later with [`Page::replace`].
    pub fn placeholder(&mut self) -> Slot {
        self.push(Block::Empty)
    }

    pub fn replace(&mut self, slot: Slot, block: Block) {
        self.blocks[slot.0] = block;
    }

    #[cfg(test)]
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn render(&self, templates: &Templates) -> Result<String> {
        let mut context = Context::new();
        context.insert("title", &self.title);
        context.insert("blocks", &self.blocks);
        Ok(templates.tera.render(PAGE_TEMPLATE, &context)?)
    }
}

pub fn gainers_table(table: &GainersTable) -> TableView {
    TableView {
        columns: table.columns.clone(),
        rows: table.rows.clone(),
        highlighted: true,
    }
}

/// Last `n` bars, oldest first.
pub fn bars_preview(series: &PriceSeries, n: usize) -> TableView {
    TableView {
        columns: ["Date", "Open", "High", "Low", "Close", "Volume"]
            .map(String::from)
            .to_vec(),
        rows: series
            .tail(n)
            .iter()
            .map(|bar| {
                vec![
                    bar.date.to_string(),
                    format!("{:.2}", bar.open),
                    format!("{:.2}", bar.high),
                    format!("{:.2}", bar.low),
                    format!("{:.2}", bar.close),
                    bar.volume.to_string(),
                ]
            })
            .collect(),
        highlighted: false,
    }
}

pub fn forecast_preview(forecast: &ForecastSeries, n: usize) -> TableView {
    let mut columns: Vec<String> = ["ds", "trend", "yhat_lower", "yhat_upper"]
        .map(String::from)
        .to_vec();
    if forecast.has_weekly() {
        columns.push("weekly".into());
    }
    if forecast.has_yearly() {
        columns.push("yearly".into());
    }
    columns.push("yhat".into());

    let rows = forecast
        .tail(n)
        .iter()
        .map(|p| {
            let mut row = vec![
                p.date.to_string(),
                format!("{:.4}", p.trend),
                format!("{:.4}", p.yhat_lower),
                format!("{:.4}", p.yhat_upper),
            ];
            row.extend(p.weekly.map(|v| format!("{v:.4}")));
            row.extend(p.yearly.map(|v| format!("{v:.4}")));
            row.push(format!("{:.4}", p.yhat));
            row
        })
        .collect();

    TableView {
        columns,
        rows,
        highlighted: false,
    }
}

/// Open and close lines with a range slider.
pub fn price_chart(
    id: &str,
    title: &str,
    series: &PriceSeries,
    open_name: &str,
    close_name: &str,
) -> ChartView {
    let dates = dates_of(series);
    let open = Scatter::new(dates.clone(), series.bars.iter().map(|b| b.open).collect())
        .mode(Mode::Lines)
        .name(open_name);
    let close = Scatter::new(dates, series.bars.iter().map(|b| b.close).collect())
        .mode(Mode::Lines)
        .name(close_name);

    let mut plot = Plot::new();
    plot.add_trace(open);
    plot.add_trace(close);
    finish(plot, id, title)
}

/// Observed closes, prediction line and shaded uncertainty band.
pub fn forecast_chart(
    id: &str,
    title: &str,
    history: &PriceSeries,
    forecast: &ForecastSeries,
) -> ChartView {
    let dates: Vec<String> = forecast.points.iter().map(|p| p.date.to_string()).collect();

    let actual = Scatter::new(
        dates_of(history),
        history.bars.iter().map(|b| b.close).collect(),
    )
    .mode(Mode::Markers)
    .name("Actual")
    .marker(Marker::new().size(3).color("black"));
    let lower = Scatter::new(
        dates.clone(),
        forecast.points.iter().map(|p| p.yhat_lower).collect(),
    )
    .mode(Mode::Lines)
    .line(Line::new().width(0.0))
    .show_legend(false)
    .hover_info(plotly::common::HoverInfo::Skip);
    let upper = Scatter::new(
        dates.clone(),
        forecast.points.iter().map(|p| p.yhat_upper).collect(),
    )
    .mode(Mode::Lines)
    .line(Line::new().width(0.0))
    .fill(Fill::ToNextY)
    .fill_color("rgba(0, 114, 178, 0.2)")
    .show_legend(false)
    .hover_info(plotly::common::HoverInfo::Skip);
    let predicted = Scatter::new(dates, forecast.points.iter().map(|p| p.yhat).collect())
        .mode(Mode::Lines)
        .name("Predicted")
        .line(Line::new().color("#0072B2").width(2.0));

    let mut plot = Plot::new();
    plot.add_trace(actual);
    plot.add_trace(lower);
    plot.add_trace(upper);
    plot.add_trace(predicted);
    finish(plot, id, title)
}

/// Trend over every forecast date; weekly by day of week and yearly by day
/// of year, when fitted.
pub fn component_charts(id_prefix: &str, forecast: &ForecastSeries) -> Vec<ChartView> {
    let mut charts = Vec::new();
    let mut component = |name: &str, (labels, values): (Vec<String>, Vec<f64>)| {
        let mut plot = Plot::new();
        plot.add_trace(Scatter::new(labels, values).mode(Mode::Lines).name(name));
        charts.push(finish(plot, &format!("{id_prefix}-{name}"), name));
    };

    component(
        "trend",
        forecast
            .points
            .iter()
            .map(|p| (p.date.to_string(), p.trend))
            .unzip(),
    );
    if forecast.has_weekly() {
        component("weekly", weekly_profile(forecast));
    }
    if forecast.has_yearly() {
        component("yearly", yearly_profile(forecast));
    }
    charts
}

/// Last week of the weekly component, Monday first.
pub fn weekly_profile(forecast: &ForecastSeries) -> (Vec<String>, Vec<f64>) {
    profile(
        forecast.tail(7),
        |date| date.weekday().num_days_from_monday(),
        "%A",
        |p| p.weekly,
    )
}

/// Last year of the yearly component, January 1st first.
pub fn yearly_profile(forecast: &ForecastSeries) -> (Vec<String>, Vec<f64>) {
    profile(forecast.tail(365), |date| date.ordinal0(), "%b %d", |p| p.yearly)
}

fn profile(
    points: &[ForecastPoint],
    position: impl Fn(NaiveDate) -> u32,
    label: &str,
    value: impl Fn(&ForecastPoint) -> Option<f64>,
) -> (Vec<String>, Vec<f64>) {
    let mut days: Vec<(u32, String, f64)> = points
        .iter()
        .filter_map(|p| Some((position(p.date), p.date.format(label).to_string(), value(p)?)))
        .collect();
    days.sort_by_key(|(position, _, _)| *position);
    days.into_iter().map(|(_, label, value)| (label, value)).unzip()
}

fn dates_of(series: &PriceSeries) -> Vec<String> {
    series.bars.iter().map(|b| b.date.to_string()).collect()
}

fn finish(mut plot: Plot, id: &str, title: &str) -> ChartView {
    plot.set_layout(
        Layout::new()
            .title(Title::with_text(title))
            .x_axis(Axis::new().range_slider(RangeSlider::new().visible(true))),
    );
    ChartView {
        id: id.to_string(),
        html: plot.to_inline_html(Some(id)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PriceBar;
    use chrono::Days;

    fn series(n: u64) -> PriceSeries {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        PriceSeries {
            ticker: "MSFT".into(),
            bars: (0..n)
                .map(|i| PriceBar {
                    date: start + Days::new(i),
                    open: 100.0 + i as f64,
                    high: 101.0 + i as f64,
                    low: 99.0 + i as f64,
                    close: 100.5 + i as f64,
                    volume: 1_000 + i,
                })
                .collect(),
        }
    }

    fn forecast_of(history: &PriceSeries) -> ForecastSeries {
        ForecastSeries {
            ticker: history.ticker.clone(),
            points: history
                .bars
                .iter()
                .map(|b| ForecastPoint {
                    date: b.date,
                    yhat: b.close,
                    yhat_lower: b.close - 1.0,
                    yhat_upper: b.close + 1.0,
                    trend: b.close,
                    yearly: None,
                    weekly: Some(0.25),
                })
                .collect(),
        }
    }

    #[test]
    fn preview_shows_last_five_bars_in_order() {
        let view = bars_preview(&series(8), PREVIEW_ROWS);
        assert_eq!(view.rows.len(), 5);
        assert_eq!(view.rows[0][0], "2024-01-04");
        assert_eq!(view.rows[4][0], "2024-01-08");
        assert_eq!(view.rows[4][4], "107.50");
        assert_eq!(view.columns.len(), 6);
    }

    #[test]
    fn forecast_preview_lists_fitted_components_only() {
        let view = forecast_preview(&forecast_of(&series(3)), PREVIEW_ROWS);
        assert_eq!(
            view.columns,
            vec!["ds", "trend", "yhat_lower", "yhat_upper", "weekly", "yhat"]
        );
        assert!(view.rows.iter().all(|row| row.len() == view.columns.len()));
    }

    #[test]
    fn placeholder_is_replaced_in_place() {
        let mut page = Page::new("Stock Forecast App");
        page.push(Block::subheader("first"));
        let slot = page.placeholder();
        page.push(Block::subheader("last"));
        assert_eq!(page.blocks()[1], Block::Empty);

        page.replace(slot, Block::text("Loading data... done!"));
        assert_eq!(page.blocks()[1], Block::text("Loading data... done!"));
        assert_eq!(page.blocks().len(), 3);
    }

    #[test]
    fn rendered_page_escapes_scraped_text() {
        let templates = Templates::new().unwrap();
        let mut page = Page::new("Stock Forecast App");
        page.push(Block::Table(gainers_table(&GainersTable {
            columns: vec!["Company".into()],
            rows: vec![vec!["<script>alert(1)</script>".into()]],
        })));
        page.push(Block::error("gainers unavailable"));

        let html = page.render(&templates).unwrap();
        assert!(html.contains("<title>Stock Forecast App</title>"));
        assert!(html.contains("&lt;script&gt;alert(1)&lt;&#x2F;script&gt;"));
        assert!(!html.contains("<script>alert(1)</script>"));
        assert!(html.contains("gainers unavailable"));
    }

    #[test]
    fn charts_embed_plotly_markup_unescaped() {
        let history = series(10);
        let chart = price_chart(
            "raw-chart",
            "Time Series Data with Rangeslider",
            &history,
            "Stock Open",
            "Stock Close",
        );
        assert!(chart.html.contains("raw-chart"));
        assert!(chart.html.contains("Stock Close"));
        assert!(chart.html.contains("rangeslider"));

        let mut page = Page::new("t");
        page.push(Block::Chart(chart.clone()));
        let html = page.render(&Templates::new().unwrap()).unwrap();
        assert!(html.contains(&chart.html));
    }

    #[test]
    fn component_charts_follow_fitted_components() {
        let history = series(4);
        let charts = component_charts("components", &forecast_of(&history));
        let ids: Vec<_> = charts.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["components-trend", "components-weekly"]);

        let chart = forecast_chart("forecast", "Forecast", &history, &forecast_of(&history));
        assert!(chart.html.contains("Predicted"));
        assert!(chart.html.contains("tonexty"));
    }

    #[test]
    fn weekly_component_is_plotted_by_day_of_week() {
        // 2024-01-01 is a Monday; weekly value is the weekday index
        let mut forecast = forecast_of(&series(10));
        for p in &mut forecast.points {
            p.weekly = Some(p.date.weekday().num_days_from_monday() as f64);
        }

        let (labels, values) = weekly_profile(&forecast);
        assert_eq!(labels.len(), 7);
        assert_eq!(labels[0], "Monday");
        assert_eq!(labels[6], "Sunday");
        assert_eq!(values, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn yearly_component_is_plotted_by_day_of_year() {
        let start = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let points = (0..800u64)
            .map(|i| {
                let date = start + Days::new(i);
                ForecastPoint {
                    date,
                    yhat: 0.0,
                    yhat_lower: 0.0,
                    yhat_upper: 0.0,
                    trend: 0.0,
                    yearly: Some(date.ordinal0() as f64),
                    weekly: None,
                }
            })
            .collect();
        let forecast = ForecastSeries {
            ticker: "GOOG".into(),
            points,
        };

        let (labels, values) = yearly_profile(&forecast);
        assert_eq!(labels.len(), 365);
        assert_eq!(labels[0], "Jan 01");
        assert!(values.windows(2).all(|w| w[0] < w[1]));
        let ids: Vec<_> = component_charts("components", &forecast)
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec!["components-trend", "components-yearly"]);
    }
}
