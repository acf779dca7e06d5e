// src/cache.rs
use crate::error::Result;
use crate::market::MarketDataProvider;
use crate::models::PriceSeries;
use chrono::NaiveDate;
use log::debug;
use moka::future::Cache;
use std::sync::Arc;

type LoadKey = (String, NaiveDate, NaiveDate);

/// Memoised loader: one download per `(ticker, start, end)` for the life of
/// the process. Unbounded, never evicts, failures are not stored.
#[derive(Clone)]
pub struct CachedLoader {
    provider: Arc<dyn MarketDataProvider>,
    cache: Cache<LoadKey, Arc<PriceSeries>>,
}

impl CachedLoader {
    pub fn new(provider: Arc<dyn MarketDataProvider>) -> Self {
        CachedLoader {
            provider,
            cache: Cache::builder().build(),
        }
    }

    pub async fn load(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Arc<PriceSeries>> {
        let key = (ticker.to_string(), start, end);
        if let Some(hit) = self.cache.get(&key).await {
            debug!("Cache hit for {} [{}, {}]", ticker, start, end);
            return Ok(hit);
        }

        let provider = self.provider.clone();
        self.cache
            .try_get_with(key, async move {
                provider
                    .daily_bars(ticker, start, end)
                    .await
                    .map(Arc::new)
            })
            .await
            .map_err(|e| (*e).clone())
    }

    #[cfg(test)]
    pub async fn contains(&self, ticker: &str, start: NaiveDate, end: NaiveDate) -> bool {
        self.cache
            .get(&(ticker.to_string(), start, end))
            .await
            .is_some()
    }
}
