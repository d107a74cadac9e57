use crate::error::AdapterError;
use crate::{ExchangeAdapter, VenueOrder, VenueOrderType, VenuePosition};
use async_trait::async_trait;
use configuration::LighterConfig;
use core_types::{PositionSide, Venue};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Client for the Lighter perpetual DEX public REST API.
///
/// Market data (order books, mark prices, funding rates) and account reads
/// are plain REST. Order placement on this venue goes through its signed
/// transaction channel, which this client does not implement; those
/// operations return `Unsupported` so callers degrade explicitly instead of
/// probing for capabilities.
pub struct LighterAdapter {
    client: reqwest::Client,
    base_url: String,
    account_index: u32,
    authenticated: bool,
    // Normalized symbol -> venue market, loaded on connect and refreshed on miss.
    markets: RwLock<HashMap<String, MarketInfo>>,
}

#[derive(Debug, Clone)]
struct MarketInfo {
    market_id: i64,
}

/// One market from `GET /api/v1/orderBooks`.
#[derive(Debug, Deserialize)]
struct OrderBookEntry {
    market_id: i64,
    symbol: String,
    #[serde(default)]
    status: String,
}

#[derive(Debug, Deserialize)]
struct OrderBooksResponse {
    order_books: Vec<OrderBookEntry>,
}

/// One market's detail from `GET /api/v1/orderBookDetails`.
#[derive(Debug, Deserialize)]
struct OrderBookDetail {
    mark_price: Decimal,
}

#[derive(Debug, Deserialize)]
struct OrderBookDetailsResponse {
    order_book_details: Vec<OrderBookDetail>,
}

/// One entry from `GET /api/v1/funding-rates`. The endpoint reports rates
/// across several venues; only `exchange == "lighter"` entries are ours.
#[derive(Debug, Deserialize)]
struct FundingRateEntry {
    exchange: String,
    symbol: String,
    rate: Decimal,
}

#[derive(Debug, Deserialize)]
struct FundingRatesResponse {
    funding_rates: Vec<FundingRateEntry>,
}

#[derive(Debug, Deserialize)]
struct AccountPosition {
    symbol: String,
    // Base-denominated size as a string; sign carries direction.
    position: Decimal,
    unrealized_pnl: Decimal,
}

#[derive(Debug, Deserialize)]
struct AccountEntry {
    available_balance: Decimal,
    #[serde(default)]
    positions: Vec<AccountPosition>,
}

#[derive(Debug, Deserialize)]
struct AccountResponse {
    accounts: Vec<AccountEntry>,
}

/// Collapse a venue symbol like `BTC` or `1000PEPE-USDT` into the canonical
/// `BTCUSDT` form used across the engine.
pub fn normalize_symbol(symbol: &str) -> String {
    let mut normalized: String = symbol
        .chars()
        .filter(|c| *c != '_' && *c != '-')
        .collect::<String>()
        .to_uppercase();
    if !normalized.ends_with("USDT") {
        normalized.push_str("USDT");
    }
    normalized
}

impl LighterAdapter {
    pub fn new(config: &LighterConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            account_index: config.account_index,
            authenticated: !config.api_key_private_key.is_empty(),
            markets: RwLock::new(HashMap::new()),
        }
    }

    async fn load_markets(&self) -> Result<(), AdapterError> {
        let url = format!("{}/api/v1/orderBooks", self.base_url);
        let response: OrderBooksResponse = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let mut markets = self.markets.write().await;
        markets.clear();
        for entry in response.order_books {
            if entry.status == "frozen" {
                continue;
            }
            markets.insert(
                normalize_symbol(&entry.symbol),
                MarketInfo {
                    market_id: entry.market_id,
                },
            );
        }
        debug!(markets = markets.len(), "loaded Lighter markets");
        Ok(())
    }

    async fn market_id(&self, symbol: &str) -> Result<i64, AdapterError> {
        let key = normalize_symbol(symbol);
        if let Some(info) = self.markets.read().await.get(&key) {
            return Ok(info.market_id);
        }
        // Miss may just mean a newly listed market; refresh once.
        self.load_markets().await?;
        self.markets
            .read()
            .await
            .get(&key)
            .map(|info| info.market_id)
            .ok_or_else(|| AdapterError::UnknownSymbol(symbol.to_string()))
    }

    async fn account(&self) -> Result<Option<AccountEntry>, AdapterError> {
        if !self.authenticated {
            return Ok(None);
        }
        let url = format!("{}/api/v1/account", self.base_url);
        let response: AccountResponse = self
            .client
            .get(&url)
            .query(&[
                ("by", "index".to_string()),
                ("value", self.account_index.to_string()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.accounts.into_iter().next())
    }
}

#[async_trait]
impl ExchangeAdapter for LighterAdapter {
    fn venue(&self) -> Venue {
        Venue::Lighter
    }

    async fn connect(&self) -> Result<(), AdapterError> {
        self.load_markets().await
    }

    async fn disconnect(&self) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn funding_rate(&self, symbol: &str) -> Result<Option<Decimal>, AdapterError> {
        let rates = self.all_funding_rates().await?;
        Ok(rates.get(&normalize_symbol(symbol)).copied())
    }

    async fn all_funding_rates(&self) -> Result<HashMap<String, Decimal>, AdapterError> {
        let url = format!("{}/api/v1/funding-rates", self.base_url);
        let response: FundingRatesResponse = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(response
            .funding_rates
            .into_iter()
            .filter(|entry| entry.exchange == "lighter")
            .map(|entry| (normalize_symbol(&entry.symbol), entry.rate))
            .collect())
    }

    async fn price(&self, symbol: &str) -> Result<Option<Decimal>, AdapterError> {
        let market_id = self.market_id(symbol).await?;
        let url = format!("{}/api/v1/orderBookDetails", self.base_url);
        let response: OrderBookDetailsResponse = self
            .client
            .get(&url)
            .query(&[("market_id", market_id)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response
            .order_book_details
            .into_iter()
            .next()
            .map(|detail| detail.mark_price))
    }

    async fn balance(&self) -> Result<Option<Decimal>, AdapterError> {
        Ok(self.account().await?.map(|account| account.available_balance))
    }

    async fn position(&self, symbol: &str) -> Result<Option<VenuePosition>, AdapterError> {
        let Some(account) = self.account().await? else {
            return Ok(None);
        };
        let key = normalize_symbol(symbol);
        let Some(position) = account
            .positions
            .into_iter()
            .find(|p| normalize_symbol(&p.symbol) == key)
        else {
            return Ok(None);
        };
        if position.position.is_zero() {
            return Ok(None);
        }
        let Some(mark_price) = self.price(symbol).await? else {
            return Ok(None);
        };
        Ok(Some(VenuePosition {
            // Quote-denominated exposure, consistent with order amounts.
            amount: (position.position * mark_price).abs(),
            unrealized_pnl: position.unrealized_pnl,
        }))
    }

    async fn create_order(
        &self,
        symbol: &str,
        _side: PositionSide,
        _amount: Decimal,
        _order_type: VenueOrderType,
        _leverage: u32,
    ) -> Result<VenueOrder, AdapterError> {
        if !self.authenticated {
            return Err(AdapterError::NotAuthenticated);
        }
        // Order placement on this venue requires its signed-transaction
        // channel, which this client does not speak.
        warn!(symbol, "order placement unsupported on Lighter client");
        Err(AdapterError::Unsupported("order placement"))
    }

    async fn liquidation_price(&self, _symbol: &str) -> Result<Option<Decimal>, AdapterError> {
        // No public liquidation-price endpoint; explicit unknown.
        Ok(None)
    }

    async fn set_stop_loss_take_profit(
        &self,
        _symbol: &str,
        _side: PositionSide,
        _stop_loss_price: Decimal,
        _take_profit_price: Decimal,
    ) -> Result<(), AdapterError> {
        if !self.authenticated {
            return Err(AdapterError::NotAuthenticated);
        }
        Err(AdapterError::Unsupported("stop-loss/take-profit orders"))
    }
}
