use crate::auth::sign_request;
use crate::error::AdapterError;
use crate::{ExchangeAdapter, VenueOrder, VenueOrderStatus, VenueOrderType, VenuePosition};
use async_trait::async_trait;
use configuration::BinanceConfig;
use core_types::{PositionSide, Venue};
use reqwest::header::{HeaderMap, HeaderValue};
use rust_decimal::Decimal;
use serde::{de::DeserializeOwned, Deserialize};
use std::collections::{BTreeMap, HashMap};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

/// The USD-M futures client for Binance.
///
/// Public market-data endpoints work without credentials; account and order
/// endpoints require a signed request and return `NotAuthenticated` when no
/// API key is configured.
pub struct BinanceAdapter {
    client: reqwest::Client,
    base_url: String,
    api_secret: String,
    authenticated: bool,
}

/// Response from `GET /fapi/v1/premiumIndex`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PremiumIndex {
    symbol: String,
    last_funding_rate: Decimal,
}

/// Response from `GET /fapi/v1/ticker/price`.
#[derive(Debug, Deserialize)]
struct TickerPrice {
    price: Decimal,
}

/// A single asset's balance from `GET /fapi/v2/balance`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BalanceEntry {
    asset: String,
    available_balance: Decimal,
}

/// A single position from `GET /fapi/v2/positionRisk`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PositionRisk {
    position_amt: Decimal,
    un_realized_profit: Decimal,
    liquidation_price: Decimal,
    mark_price: Decimal,
}

/// Response from a successful `POST /fapi/v1/order`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResponse {
    order_id: i64,
    status: String,
    avg_price: Decimal,
    cum_quote: Decimal,
}

/// An error payload from the Binance API.
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    code: i64,
    msg: String,
}

impl BinanceAdapter {
    pub fn new(config: &BinanceConfig) -> Self {
        let base_url = if config.testnet {
            "https://testnet.binancefuture.com".to_string()
        } else {
            "https://fapi.binance.com".to_string()
        };

        let mut headers = HeaderMap::new();
        let authenticated = !config.api_key.is_empty() && !config.api_secret.is_empty();
        if authenticated {
            headers.insert(
                "X-MBX-APIKEY",
                HeaderValue::from_str(&config.api_key).expect("Invalid API Key"),
            );
        }

        Self {
            client: reqwest::Client::builder()
                .default_headers(headers)
                .build()
                .expect("Failed to build reqwest client"),
            base_url,
            api_secret: config.api_secret.clone(),
            authenticated,
        }
    }

    fn signed_url(&self, path: &str, params: &mut BTreeMap<&str, String>) -> String {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before epoch")
            .as_millis();
        params.insert("timestamp", timestamp.to_string());

        let query_string = serde_qs::to_string(params).unwrap_or_default();
        let signature = sign_request(&self.api_secret, &query_string);
        format!("{}{}?{}&signature={}", self.base_url, path, query_string, signature)
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, AdapterError> {
        let status = response.status();
        if status.as_u16() == 429 {
            return Err(AdapterError::RateLimited);
        }
        let text = response.text().await?;
        if status.is_success() {
            serde_json::from_str::<T>(&text).map_err(|e| AdapterError::Deserialization(e.to_string()))
        } else {
            let api_error: ApiErrorResponse = serde_json::from_str(&text).map_err(|e| {
                AdapterError::Deserialization(format!(
                    "Failed to deserialize error response: {}. Original text: {}",
                    e, text
                ))
            })?;
            Err(AdapterError::VenueRejection {
                code: api_error.code,
                message: api_error.msg,
            })
        }
    }

    async fn get_signed<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &mut BTreeMap<&str, String>,
    ) -> Result<T, AdapterError> {
        if !self.authenticated {
            return Err(AdapterError::NotAuthenticated);
        }
        let url = self.signed_url(path, params);
        let response = self.client.get(&url).send().await?;
        Self::decode(response).await
    }

    async fn post_signed<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &mut BTreeMap<&str, String>,
    ) -> Result<T, AdapterError> {
        if !self.authenticated {
            return Err(AdapterError::NotAuthenticated);
        }
        let url = self.signed_url(path, params);
        let response = self.client.post(&url).send().await?;
        Self::decode(response).await
    }

    async fn position_risk(&self, symbol: &str) -> Result<Option<PositionRisk>, AdapterError> {
        let mut params = BTreeMap::new();
        params.insert("symbol", symbol.to_string());
        let positions: Vec<PositionRisk> =
            self.get_signed("/fapi/v2/positionRisk", &mut params).await?;
        Ok(positions.into_iter().next())
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<(), AdapterError> {
        #[derive(Deserialize)]
        struct LeverageResponse {
            #[allow(dead_code)]
            leverage: i32,
        }
        let mut params = BTreeMap::new();
        params.insert("symbol", symbol.to_string());
        params.insert("leverage", leverage.to_string());
        self.post_signed::<LeverageResponse>("/fapi/v1/leverage", &mut params)
            .await?;
        Ok(())
    }
}

fn order_side(side: PositionSide) -> &'static str {
    match side {
        PositionSide::Long => "BUY",
        PositionSide::Short => "SELL",
    }
}

fn map_status(status: &str) -> VenueOrderStatus {
    match status {
        "FILLED" => VenueOrderStatus::Filled,
        "NEW" | "PARTIALLY_FILLED" => VenueOrderStatus::Open,
        _ => VenueOrderStatus::Rejected,
    }
}

#[async_trait]
impl ExchangeAdapter for BinanceAdapter {
    fn venue(&self) -> Venue {
        Venue::Binance
    }

    async fn connect(&self) -> Result<(), AdapterError> {
        // REST-only client; verify reachability with an unauthenticated ping.
        let url = format!("{}/fapi/v1/ping", self.base_url);
        self.client.get(&url).send().await?.error_for_status()?;
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn funding_rate(&self, symbol: &str) -> Result<Option<Decimal>, AdapterError> {
        let url = format!("{}/fapi/v1/premiumIndex", self.base_url);
        let response = self.client.get(&url).query(&[("symbol", symbol)]).send().await?;
        let index: PremiumIndex = Self::decode(response).await?;
        Ok(Some(index.last_funding_rate))
    }

    async fn all_funding_rates(&self) -> Result<HashMap<String, Decimal>, AdapterError> {
        // Without a symbol parameter the endpoint returns every perpetual.
        let url = format!("{}/fapi/v1/premiumIndex", self.base_url);
        let response = self.client.get(&url).send().await?;
        let indices: Vec<PremiumIndex> = Self::decode(response).await?;
        Ok(indices
            .into_iter()
            .map(|i| (i.symbol, i.last_funding_rate))
            .collect())
    }

    async fn price(&self, symbol: &str) -> Result<Option<Decimal>, AdapterError> {
        let url = format!("{}/fapi/v1/ticker/price", self.base_url);
        let response = self.client.get(&url).query(&[("symbol", symbol)]).send().await?;
        let ticker: TickerPrice = Self::decode(response).await?;
        Ok(Some(ticker.price))
    }

    async fn balance(&self) -> Result<Option<Decimal>, AdapterError> {
        if !self.authenticated {
            return Ok(None);
        }
        let mut params = BTreeMap::new();
        let balances: Vec<BalanceEntry> = self.get_signed("/fapi/v2/balance", &mut params).await?;
        Ok(balances
            .into_iter()
            .find(|b| b.asset == "USDT")
            .map(|b| b.available_balance))
    }

    async fn position(&self, symbol: &str) -> Result<Option<VenuePosition>, AdapterError> {
        if !self.authenticated {
            return Ok(None);
        }
        let Some(risk) = self.position_risk(symbol).await? else {
            return Ok(None);
        };
        if risk.position_amt.is_zero() {
            return Ok(None);
        }
        Ok(Some(VenuePosition {
            // Quote-denominated exposure, consistent with order amounts.
            amount: (risk.position_amt * risk.mark_price).abs(),
            unrealized_pnl: risk.un_realized_profit,
        }))
    }

    async fn create_order(
        &self,
        symbol: &str,
        side: PositionSide,
        amount: Decimal,
        order_type: VenueOrderType,
        leverage: u32,
    ) -> Result<VenueOrder, AdapterError> {
        if amount <= Decimal::ZERO {
            return Err(AdapterError::InvalidOrder(format!(
                "non-positive amount: {amount}"
            )));
        }

        self.set_leverage(symbol, leverage).await?;

        // Amounts are quote-denominated throughout the core; convert to the
        // base quantity the venue expects at the current price.
        let price = self
            .price(symbol)
            .await?
            .ok_or_else(|| AdapterError::UnknownSymbol(symbol.to_string()))?;
        let quantity = (amount / price).round_dp(3);
        if quantity.is_zero() {
            return Err(AdapterError::InvalidOrder(format!(
                "amount {amount} rounds to zero quantity at price {price}"
            )));
        }

        let mut params = BTreeMap::new();
        params.insert("symbol", symbol.to_string());
        params.insert("side", order_side(side).to_string());
        params.insert(
            "type",
            match order_type {
                VenueOrderType::Market => "MARKET".to_string(),
                VenueOrderType::Limit => "LIMIT".to_string(),
            },
        );
        params.insert("quantity", quantity.to_string());
        params.insert("newOrderRespType", "RESULT".to_string());

        let response: OrderResponse = self.post_signed("/fapi/v1/order", &mut params).await?;
        debug!(symbol, order_id = response.order_id, status = %response.status, "Binance order placed");

        Ok(VenueOrder {
            order_ref: response.order_id.to_string(),
            status: map_status(&response.status),
            price: response.avg_price,
            filled_amount: response.cum_quote,
        })
    }

    async fn liquidation_price(&self, symbol: &str) -> Result<Option<Decimal>, AdapterError> {
        if !self.authenticated {
            return Ok(None);
        }
        let Some(risk) = self.position_risk(symbol).await? else {
            return Ok(None);
        };
        if risk.liquidation_price.is_zero() {
            return Ok(None);
        }
        Ok(Some(risk.liquidation_price))
    }

    async fn set_stop_loss_take_profit(
        &self,
        symbol: &str,
        side: PositionSide,
        stop_loss_price: Decimal,
        take_profit_price: Decimal,
    ) -> Result<(), AdapterError> {
        // Closing a long sells; closing a short buys.
        let close_side = order_side(side.opposite());

        for (kind, trigger) in [
            ("STOP_MARKET", stop_loss_price),
            ("TAKE_PROFIT_MARKET", take_profit_price),
        ] {
            let mut params = BTreeMap::new();
            params.insert("symbol", symbol.to_string());
            params.insert("side", close_side.to_string());
            params.insert("type", kind.to_string());
            params.insert("stopPrice", trigger.to_string());
            params.insert("closePosition", "true".to_string());
            self.post_signed::<OrderResponse>("/fapi/v1/order", &mut params)
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(map_status("FILLED"), VenueOrderStatus::Filled);
        assert_eq!(map_status("NEW"), VenueOrderStatus::Open);
        assert_eq!(map_status("PARTIALLY_FILLED"), VenueOrderStatus::Open);
        assert_eq!(map_status("REJECTED"), VenueOrderStatus::Rejected);
        assert_eq!(map_status("EXPIRED"), VenueOrderStatus::Rejected);
    }

    #[test]
    fn sides_map_to_binance_vocabulary() {
        assert_eq!(order_side(PositionSide::Long), "BUY");
        assert_eq!(order_side(PositionSide::Short), "SELL");
    }
}
