// src/gainers.rs
use crate::error::{DashboardError, Result};
use crate::models::GainersTable;
use log::{debug, info, warn};
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};

const WHAT: &str = "gainers table";

/// Download the gainers page and turn its table into rows.
pub async fn fetch_gainers(client: &Client, url: &str) -> Result<GainersTable> {
    info!("Fetching gainers page {}", url);
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| DashboardError::network(url, e))?;

    if !response.status().is_success() {
        warn!("Gainers page answered HTTP {}", response.status());
        return Err(DashboardError::network(
            url,
            format!("HTTP {}", response.status()),
        ));
    }

    let body = response
        .text()
        .await
        .map_err(|e| DashboardError::network(url, e))?;
    let table = parse_gainers(&body)?;
    if let Some(top) = table.records().next() {
        debug!("Top gainer: {:?}", top);
    }
    info!(
        "Scraped {} gainers across {} columns",
        table.rows.len(),
        table.columns.len()
    );
    Ok(table)
}

/// `th` cells name the columns; every `tr` holding `td` cells is a row.
pub fn parse_gainers(html: &str) -> Result<GainersTable> {
    let document = Html::parse_document(html);
    let th = selector("th")?;
    let tr = selector("tr")?;
    let td = selector("td")?;

    let columns: Vec<String> = document.select(&th).map(cell_text).collect();
    if columns.is_empty() {
        return Err(DashboardError::parse(WHAT, "no header cells found"));
    }

    let mut rows = Vec::new();
    for row in document.select(&tr) {
        let cells: Vec<String> = row.select(&td).map(cell_text).collect();
        if cells.is_empty() {
            continue;
        }
        if cells.len() != columns.len() {
            return Err(DashboardError::parse(
                WHAT,
                format!(
                    "row {} has {} cells, expected {}",
                    rows.len() + 1,
                    cells.len(),
                    columns.len()
                ),
            ));
        }
        rows.push(cells);
    }

    Ok(GainersTable { columns, rows })
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| DashboardError::parse("selector", format!("{e:?}")))
}

fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text().collect::<String>().trim().to_string()
}
