//! The funding-rate feed: polls both venue adapters, maintains the
//! latest-known rate per venue and symbol, and persists every observation.
//!
//! One venue failing a refresh never discards the other venue's data, and
//! never discards the failed venue's last-known value; readers see stale
//! data rather than a hole. A differential is only reported for symbols with
//! data from both venues.

use chrono::Utc;
use core_types::{FundingRateSample, Venue};
use database::ArbStore;
use events::RateDiffSnapshot;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use venues::{ExchangeAdapter, Retry};

/// The latest-known funding rate of one venue for one symbol.
#[derive(Debug, Clone, Copy, PartialEq)]
struct RateEntry {
    rate: Decimal,
    observed_at: i64,
}

pub struct RateFeed {
    lighter: Arc<dyn ExchangeAdapter>,
    binance: Arc<dyn ExchangeAdapter>,
    store: Arc<dyn ArbStore>,
    retry: Retry,
    rates: RwLock<HashMap<(Venue, String), RateEntry>>,
}

impl RateFeed {
    pub fn new(
        lighter: Arc<dyn ExchangeAdapter>,
        binance: Arc<dyn ExchangeAdapter>,
        store: Arc<dyn ArbStore>,
        retry: Retry,
    ) -> Self {
        Self {
            lighter,
            binance,
            store,
            retry,
            rates: RwLock::new(HashMap::new()),
        }
    }

    /// Polls both venues once, concurrently. A venue that fails after
    /// retries contributes nothing this round and keeps its previous
    /// entries; the other venue is unaffected.
    pub async fn refresh(&self) {
        let (lighter_rates, binance_rates) = tokio::join!(
            self.retry
                .call_or("lighter.all_funding_rates", HashMap::new(), || {
                    self.lighter.all_funding_rates()
                }),
            self.retry
                .call_or("binance.all_funding_rates", HashMap::new(), || {
                    self.binance.all_funding_rates()
                }),
        );

        let observed_at = Utc::now().timestamp_millis();
        self.absorb(Venue::Lighter, lighter_rates, observed_at).await;
        self.absorb(Venue::Binance, binance_rates, observed_at).await;
    }

    async fn absorb(&self, venue: Venue, rates: HashMap<String, Decimal>, observed_at: i64) {
        if rates.is_empty() {
            debug!(%venue, "no funding rates this round");
            return;
        }

        {
            let mut map = self.rates.write().await;
            for (symbol, rate) in &rates {
                map.insert((venue, symbol.clone()), RateEntry {
                    rate: *rate,
                    observed_at,
                });
            }
        }

        // History feeds the P&L integration window; a persistence hiccup
        // must not take the feed down.
        for (symbol, rate) in rates {
            let sample = FundingRateSample {
                venue,
                symbol,
                rate,
                observed_at,
            };
            if let Err(e) = self.store.append_funding_sample(&sample).await {
                warn!(%venue, symbol = %sample.symbol, error = %e, "failed to persist funding sample");
            }
        }
    }

    /// The current differential for one symbol, `None` until both venues
    /// have reported at least once.
    pub async fn rate_diff(&self, symbol: &str) -> Option<RateDiffSnapshot> {
        let map = self.rates.read().await;
        let lighter = map.get(&(Venue::Lighter, symbol.to_string()))?;
        let binance = map.get(&(Venue::Binance, symbol.to_string()))?;
        Some(RateDiffSnapshot {
            symbol: symbol.to_string(),
            lighter_rate: lighter.rate,
            binance_rate: binance.rate,
            current_diff: lighter.rate - binance.rate,
            observed_at: lighter.observed_at.max(binance.observed_at),
        })
    }

    /// Differentials for every symbol both venues currently cover,
    /// sorted by symbol for stable output.
    pub async fn all_rate_diffs(&self) -> Vec<RateDiffSnapshot> {
        let map = self.rates.read().await;
        let mut diffs: Vec<RateDiffSnapshot> = map
            .iter()
            .filter(|((venue, _), _)| *venue == Venue::Lighter)
            .filter_map(|((_, symbol), lighter)| {
                let binance = map.get(&(Venue::Binance, symbol.clone()))?;
                Some(RateDiffSnapshot {
                    symbol: symbol.clone(),
                    lighter_rate: lighter.rate,
                    binance_rate: binance.rate,
                    current_diff: lighter.rate - binance.rate,
                    observed_at: lighter.observed_at.max(binance.observed_at),
                })
            })
            .collect();
        diffs.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        diffs
    }

    /// The polling loop. Refreshes immediately, then on every tick, until
    /// the token is cancelled.
    pub async fn run(&self, poll_interval: Duration, token: CancellationToken) {
        info!(interval = ?poll_interval, "rate feed started");
        let mut interval = tokio::time::interval(poll_interval);
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("rate feed stopping");
                    return;
                }
                _ = interval.tick() => {
                    self.refresh().await;
                }
            }
        }
    }
}
