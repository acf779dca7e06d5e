// src/main.rs
mod api;
mod banner;
mod cache;
mod config;
mod dashboard;
mod error;
mod forecast;
mod gainers;
mod market;
mod models;
mod render;

use crate::banner::BannerSchedule;
use crate::cache::CachedLoader;
use crate::config::Settings;
use crate::dashboard::Dashboard;
use crate::market::YahooChartProvider;
use crate::models::BANNER_ITEMS;
use crate::render::Templates;
use clap::Parser;
use env_logger::Builder;
use log::{error, info, LevelFilter};
use std::sync::Arc;
use tokio::time::Duration;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let settings = Settings::parse();

    Builder::new()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .format_timestamp_secs()
        .init();

    info!("Starting the stock forecast dashboard...");
    let client = match settings.http_client() {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to build HTTP client: {}", e);
            return;
        }
    };
    let templates = match Templates::new() {
        Ok(templates) => templates,
        Err(e) => {
            error!("Failed to load page templates: {}", e);
            return;
        }
    };

    let provider = Arc::new(YahooChartProvider::new(
        client.clone(),
        settings.quote_base_url.as_str(),
    ));
    let loader = CachedLoader::new(provider);

    let banner = banner::spawn(
        BANNER_ITEMS.map(String::from).to_vec(),
        BannerSchedule {
            intro: Duration::from_millis(settings.banner_intro_ms),
            cycle: Duration::from_millis(settings.banner_cycle_ms),
            rounds: settings.banner_rounds,
        },
    );

    info!("Banner rotating from {}", banner.current().text);

    let dashboard = Arc::new(Dashboard::new(
        client,
        settings.gainers_url.as_str(),
        settings.history_start,
        loader,
        banner.subscribe(),
        templates,
    ));
    let routes = api::routes(dashboard);

    let (addr, server) = match warp::serve(routes).try_bind_with_graceful_shutdown(
        settings.bind,
        async {
            tokio::signal::ctrl_c().await.ok();
        },
    ) {
        Ok(bound) => bound,
        Err(e) => {
            error!("Failed to bind {}: {}", settings.bind, e);
            return;
        }
    };

    info!("Server running on http://{}", addr);
    server.await;

    banner.stop().await;
    info!("Shut down.");
}
