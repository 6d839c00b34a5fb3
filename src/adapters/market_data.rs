//! Market data providers

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::domain::{PriceBar, PriceSeries};
use crate::error::{HedgeflowError, Result};

/// Daily OHLCV source
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Daily bars for `ticker` in `[start, end]`. An empty result is
    /// `DataUnavailable`, never an empty series.
    async fn get_prices(&self, ticker: &str, start: NaiveDate, end: NaiveDate)
        -> Result<PriceSeries>;
}

/// Deterministic random walk, one bar per calendar day
#[derive(Debug, Clone)]
pub struct SyntheticMarketData {
    seed: u64,
}

impl SyntheticMarketData {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    fn rng_for(&self, ticker: &str) -> StdRng {
        let ticker_hash = ticker
            .bytes()
            .fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(u64::from(b)));
        StdRng::seed_from_u64(self.seed ^ ticker_hash)
    }

    pub fn generate(&self, ticker: &str, start: NaiveDate, end: NaiveDate) -> PriceSeries {
        let mut rng = self.rng_for(ticker);
        let mut close: f64 = rng.gen_range(50.0..250.0);

        start
            .iter_days()
            .take_while(|day| *day <= end)
            .filter_map(|day| {
                let timestamp = Utc.from_utc_datetime(&day.and_hms_opt(0, 0, 0)?);
                let open = close;
                close = (open * (1.0 + rng.gen_range(-0.02..0.02))).max(1.0);
                let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.01));
                let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.01));
                let volume = rng.gen_range(1_000_000.0..5_000_000.0_f64).round();
                Some(PriceBar::new(timestamp, open, high, low, close, volume))
            })
            .collect()
    }
}

#[async_trait]
impl MarketDataProvider for SyntheticMarketData {
    async fn get_prices(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PriceSeries> {
        let series = self.generate(ticker, start, end);
        if series.is_empty() {
            return Err(HedgeflowError::DataUnavailable(format!(
                "no price data for {ticker} between {start} and {end}"
            )));
        }
        Ok(series)
    }
}
