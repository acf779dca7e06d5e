// src/config.rs
use chrono::NaiveDate;
use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;

pub const GAINERS_URL: &str = "https://www.ndtv.com/business/marketdata/stocks-gainers/nifty_weekly";
pub const QUOTE_BASE_URL: &str = "https://query1.finance.yahoo.com";

/// Runtime settings. Every flag can also come from the environment (or `.env`).
#[derive(Parser, Debug, Clone)]
#[command(version, about = "Stock forecast dashboard", long_about = None)]
pub struct Settings {
    /// Address the dashboard listens on.
    #[arg(long, env = "DASHBOARD_BIND", default_value = "127.0.0.1:3030")]
    pub bind: SocketAddr,

    /// Page holding the weekly top gainers table.
    #[arg(long, env = "GAINERS_URL", default_value = GAINERS_URL)]
    pub gainers_url: String,

    /// Base URL of the chart endpoint used for daily bars.
    #[arg(long, env = "QUOTE_BASE_URL", default_value = QUOTE_BASE_URL)]
    pub quote_base_url: String,

    /// First day of price history to download.
    #[arg(long, env = "HISTORY_START", default_value = "2015-01-01")]
    pub history_start: NaiveDate,

    #[arg(long, env = "HTTP_TIMEOUT_SECS", default_value_t = 30)]
    pub http_timeout_secs: u64,

    #[arg(
        long,
        env = "HTTP_USER_AGENT",
        default_value = "Mozilla/5.0 (X11; Linux x86_64) stock-forecast/0.1"
    )]
    pub user_agent: String,

    /// Delay between banner items during the first sweep.
    #[arg(long, env = "BANNER_INTRO_MS", default_value_t = 500)]
    pub banner_intro_ms: u64,

    /// Delay between banner items after the first sweep.
    #[arg(long, env = "BANNER_CYCLE_MS", default_value_t = 1500)]
    pub banner_cycle_ms: u64,

    /// Sweeps after the intro before the banner stops rotating.
    #[arg(long, env = "BANNER_ROUNDS", default_value_t = 1000)]
    pub banner_rounds: u32,
}

impl Settings {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn http_client(&self) -> reqwest::Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(self.http_timeout())
            .user_agent(self.user_agent.as_str())
            .build()
    }
}
