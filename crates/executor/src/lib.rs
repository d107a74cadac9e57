//! The execution coordinator: turns a detected opportunity into a live
//! paired position and unwinds it again, in bounded per-cycle batches.
//!
//! Both venue placements of a cycle are dispatched concurrently; a leg's
//! failure costs that leg one cycle's fill, never the whole order. The fill
//! skew between the legs is checked at every cycle boundary and the cycle
//! pauses while it exceeds the configured limit, so persisted imbalance
//! checkpoints never exceed `max_imbalance + amount_per_cycle`.
//!
//! The order state machine is strictly one-way:
//! `opening -> open -> closing -> closed`, with `opening -> failed` as the
//! only escape. A failed close leaves the order `closing` for a retry.

use chrono::Utc;
use configuration::{ExecutionConfig, TradingConfig};
use core_types::{
    generate_order_id, ArbitrageOrder, OrderStatus, PositionSide, StrategyType, TradeAction,
    TradeFill, Venue, VenueLeg,
};
use database::{ArbStore, DbError};
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use venues::{AdapterError, ExchangeAdapter, VenueOrderStatus, VenueOrderType};

#[derive(Error, Debug)]
pub enum ExecError {
    #[error("persistence failure: {0}")]
    Store(#[from] DbError),

    #[error("venue failure: {0}")]
    Venue(#[from] AdapterError),

    #[error("order {order_id} is {status}, not open")]
    NotOpen {
        order_id: String,
        status: OrderStatus,
    },

    #[error("order {0} made no progress over consecutive cycles; aborting")]
    Stalled(String),
}

/// Pacing and batch limits for the execution cycle.
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    /// Quote amount attempted per leg per cycle.
    pub amount_per_cycle: Decimal,
    /// Fill-skew limit; a strictly greater imbalance pauses the cycle.
    pub max_imbalance: Decimal,
    pub cycle_delay: Duration,
    pub imbalance_pause: Duration,
    /// Oversized per-cycle amount for emergency unwinds.
    pub emergency_close_amount: Decimal,
}

impl ExecutorSettings {
    pub fn from_config(trading: &TradingConfig, execution: &ExecutionConfig) -> Self {
        Self {
            amount_per_cycle: trading.position_size_per_order,
            max_imbalance: trading.max_imbalance,
            cycle_delay: Duration::from_millis(execution.cycle_delay_ms),
            imbalance_pause: Duration::from_millis(execution.imbalance_pause_ms),
            emergency_close_amount: execution.emergency_close_amount,
        }
    }
}

/// Everything needed to open one paired position. Protective prices are
/// computed by the caller from the price at signal time.
#[derive(Debug, Clone)]
pub struct OpenRequest {
    pub symbol: String,
    pub strategy_type: StrategyType,
    /// Target quote amount per leg.
    pub target_amount: Decimal,
    pub leverage: u32,
    pub entry_rate_diff: Option<Decimal>,
    pub stop_loss_price: Option<Decimal>,
    pub take_profit_price: Option<Decimal>,
}

/// Cycles with neither leg filling, or spent pausing on imbalance, before
/// the attempt is abandoned.
const MAX_STALLED_CYCLES: u32 = 3;

pub struct ExecutionCoordinator {
    lighter: Arc<dyn ExchangeAdapter>,
    binance: Arc<dyn ExchangeAdapter>,
    store: Arc<dyn ArbStore>,
    settings: ExecutorSettings,
    // Fast lookup only; the DB row stays authoritative.
    active: RwLock<HashSet<String>>,
}

impl ExecutionCoordinator {
    pub fn new(
        lighter: Arc<dyn ExchangeAdapter>,
        binance: Arc<dyn ExchangeAdapter>,
        store: Arc<dyn ArbStore>,
        settings: ExecutorSettings,
    ) -> Self {
        Self {
            lighter,
            binance,
            store,
            settings,
            active: RwLock::new(HashSet::new()),
        }
    }

    pub fn settings(&self) -> &ExecutorSettings {
        &self.settings
    }

    /// Whether the coordinator is currently driving this order.
    pub async fn is_active(&self, order_id: &str) -> bool {
        self.active.read().await.contains(order_id)
    }

    /// Opens a paired position, batching fills until both legs reach the
    /// target. Returns the new order id; on failure the order is marked
    /// `failed` and the error is returned.
    pub async fn open_position(&self, request: OpenRequest) -> Result<String, ExecError> {
        let order_id = generate_order_id(&request.symbol);
        let (lighter_side, binance_side) = request.strategy_type.sides();
        info!(
            order_id,
            symbol = %request.symbol,
            %lighter_side,
            %binance_side,
            target = %request.target_amount,
            "opening paired position"
        );

        let now = Utc::now();
        let mut order = ArbitrageOrder {
            order_id: order_id.clone(),
            symbol: request.symbol.clone(),
            strategy_type: request.strategy_type,
            lighter: VenueLeg::new(lighter_side, request.target_amount, request.leverage),
            binance: VenueLeg::new(binance_side, request.target_amount, request.leverage),
            status: OrderStatus::Opening,
            imbalance_amount: Decimal::ZERO,
            stop_loss_price: request.stop_loss_price,
            take_profit_price: request.take_profit_price,
            entry_rate_diff: request.entry_rate_diff,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_order(&order).await?;

        self.active.write().await.insert(order_id.clone());
        let outcome = self.drive_open(&mut order).await;
        self.active.write().await.remove(&order_id);

        match outcome {
            Ok(()) => {
                info!(order_id, "paired position open");
                Ok(order_id)
            }
            Err(e) => {
                error!(order_id, error = %e, "open failed");
                if let Err(se) = self.store.update_status(&order_id, OrderStatus::Failed).await {
                    error!(order_id, error = %se, "could not mark order failed");
                }
                Err(e)
            }
        }
    }

    async fn drive_open(&self, order: &mut ArbitrageOrder) -> Result<(), ExecError> {
        let mut stalled = 0u32;
        loop {
            let imbalance = order.imbalance();
            if imbalance > self.settings.max_imbalance {
                stalled += 1;
                if stalled >= MAX_STALLED_CYCLES {
                    return Err(ExecError::Stalled(order.order_id.clone()));
                }
                warn!(
                    order_id = %order.order_id,
                    %imbalance,
                    limit = %self.settings.max_imbalance,
                    "fill imbalance above limit, pausing cycle"
                );
                sleep(self.settings.imbalance_pause).await;
                continue;
            }

            let slice = self
                .settings
                .amount_per_cycle
                .min(order.lighter.remaining())
                .min(order.binance.remaining());
            if slice <= Decimal::ZERO {
                break;
            }
            debug!(order_id = %order.order_id, %slice, "placing cycle orders");

            let (lighter_side, binance_side) = (order.lighter.side, order.binance.side);
            let leverage = order.lighter.leverage;
            let (lighter_fill, binance_fill) = tokio::join!(
                self.place_leg(
                    Venue::Lighter,
                    &order.order_id,
                    &order.symbol,
                    lighter_side,
                    slice,
                    leverage,
                    TradeAction::Open,
                ),
                self.place_leg(
                    Venue::Binance,
                    &order.order_id,
                    &order.symbol,
                    binance_side,
                    slice,
                    order.binance.leverage,
                    TradeAction::Open,
                ),
            );

            let mut fills = Vec::new();
            for fill in [lighter_fill, binance_fill].into_iter().flatten() {
                let leg = order.leg_mut(fill.venue);
                leg.filled_amount += fill.amount;
                if let Some(order_ref) = &fill.venue_order_ref {
                    leg.order_refs.push(order_ref.clone());
                }
                fills.push(fill);
            }

            if fills.is_empty() {
                stalled += 1;
                if stalled >= MAX_STALLED_CYCLES {
                    return Err(ExecError::Stalled(order.order_id.clone()));
                }
            } else {
                stalled = 0;
            }

            order.imbalance_amount = order.imbalance();
            self.store.update_fill_progress(order, &fills).await?;
            info!(
                order_id = %order.order_id,
                lighter = %order.lighter.filled_amount,
                binance = %order.binance.filled_amount,
                target = %order.lighter.target_amount,
                "fill progress"
            );

            sleep(self.settings.cycle_delay).await;
        }

        if let (Some(stop), Some(take)) = (order.stop_loss_price, order.take_profit_price) {
            self.arm_protective_orders(order, stop, take).await;
        }

        let lighter_entry = self.avg_entry_price(&order.order_id, Venue::Lighter).await?;
        let binance_entry = self.avg_entry_price(&order.order_id, Venue::Binance).await?;
        self.store
            .mark_open(&order.order_id, lighter_entry, binance_entry)
            .await?;
        Ok(())
    }

    /// Unwinds an open position in batches of `amount_per_cycle`. On failure
    /// the order stays `closing` so the close can be retried.
    pub async fn close_position(
        &self,
        order_id: &str,
        amount_per_cycle: Decimal,
    ) -> Result<(), ExecError> {
        let order = self.store.get_order(order_id).await?;
        if order.status != OrderStatus::Open {
            return Err(ExecError::NotOpen {
                order_id: order_id.to_string(),
                status: order.status,
            });
        }
        info!(order_id, symbol = %order.symbol, "closing paired position");
        self.store
            .update_status(order_id, OrderStatus::Closing)
            .await?;

        self.active.write().await.insert(order_id.to_string());
        let outcome = self.drive_close(&order, amount_per_cycle).await;
        self.active.write().await.remove(order_id);

        outcome?;
        self.store
            .update_status(order_id, OrderStatus::Closed)
            .await?;
        info!(order_id, "paired position closed");
        Ok(())
    }

    /// Closes with the oversized emergency batch amount.
    pub async fn emergency_close(&self, order_id: &str) -> Result<(), ExecError> {
        self.close_position(order_id, self.settings.emergency_close_amount)
            .await
    }

    async fn drive_close(
        &self,
        order: &ArbitrageOrder,
        amount_per_cycle: Decimal,
    ) -> Result<(), ExecError> {
        // Live venue amounts drive the unwind; an unknown position reads as
        // already flat.
        let mut lighter_amount = self
            .lighter
            .position(&order.symbol)
            .await?
            .map(|p| p.amount)
            .unwrap_or_default();
        let mut binance_amount = self
            .binance
            .position(&order.symbol)
            .await?
            .map(|p| p.amount)
            .unwrap_or_default();
        info!(
            order_id = %order.order_id,
            lighter = %lighter_amount,
            binance = %binance_amount,
            "live position amounts"
        );

        let lighter_close_side = order.lighter.side.opposite();
        let binance_close_side = order.binance.side.opposite();

        let mut stalled = 0u32;
        while lighter_amount > Decimal::ZERO || binance_amount > Decimal::ZERO {
            let slice = amount_per_cycle.min(lighter_amount).min(binance_amount);
            if slice <= Decimal::ZERO {
                break;
            }
            debug!(order_id = %order.order_id, %slice, "placing close orders");

            let (lighter_fill, binance_fill) = tokio::join!(
                self.place_leg(
                    Venue::Lighter,
                    &order.order_id,
                    &order.symbol,
                    lighter_close_side,
                    slice,
                    1,
                    TradeAction::Close,
                ),
                self.place_leg(
                    Venue::Binance,
                    &order.order_id,
                    &order.symbol,
                    binance_close_side,
                    slice,
                    1,
                    TradeAction::Close,
                ),
            );

            let mut any_fill = false;
            for fill in [lighter_fill, binance_fill].into_iter().flatten() {
                match fill.venue {
                    Venue::Lighter => lighter_amount -= fill.amount,
                    Venue::Binance => binance_amount -= fill.amount,
                }
                self.store.append_trade(&fill).await?;
                any_fill = true;
            }

            if any_fill {
                stalled = 0;
            } else {
                stalled += 1;
                if stalled >= MAX_STALLED_CYCLES {
                    return Err(ExecError::Stalled(order.order_id.clone()));
                }
            }
            info!(
                order_id = %order.order_id,
                lighter_remaining = %lighter_amount,
                binance_remaining = %binance_amount,
                "close progress"
            );

            sleep(self.settings.cycle_delay).await;
        }
        Ok(())
    }

    async fn place_leg(
        &self,
        venue: Venue,
        order_id: &str,
        symbol: &str,
        side: PositionSide,
        amount: Decimal,
        leverage: u32,
        action: TradeAction,
    ) -> Option<TradeFill> {
        let adapter = match venue {
            Venue::Lighter => &self.lighter,
            Venue::Binance => &self.binance,
        };
        match adapter
            .create_order(symbol, side, amount, VenueOrderType::Market, leverage)
            .await
        {
            Ok(result)
                if result.status == VenueOrderStatus::Filled
                    && result.filled_amount > Decimal::ZERO =>
            {
                Some(TradeFill {
                    order_id: order_id.to_string(),
                    venue,
                    symbol: symbol.to_string(),
                    side,
                    action,
                    price: result.price,
                    amount: result.filled_amount,
                    fee: Decimal::ZERO,
                    venue_order_ref: Some(result.order_ref),
                    timestamp: Utc::now().timestamp_millis(),
                })
            }
            Ok(result) => {
                warn!(%venue, symbol, status = ?result.status, "order accepted but not filled");
                None
            }
            Err(e) => {
                error!(%venue, symbol, error = %e, "order placement failed");
                None
            }
        }
    }

    /// Venue-side protective orders are best effort; a venue that cannot
    /// hold them is covered by the stop/take monitor instead.
    async fn arm_protective_orders(&self, order: &ArbitrageOrder, stop: Decimal, take: Decimal) {
        for (adapter, side) in [
            (&self.lighter, order.lighter.side),
            (&self.binance, order.binance.side),
        ] {
            if let Err(e) = adapter
                .set_stop_loss_take_profit(&order.symbol, side, stop, take)
                .await
            {
                warn!(
                    venue = %adapter.venue(),
                    symbol = %order.symbol,
                    error = %e,
                    "could not arm protective orders"
                );
            }
        }
    }

    /// Volume-weighted average price across one venue's open fills.
    async fn avg_entry_price(
        &self,
        order_id: &str,
        venue: Venue,
    ) -> Result<Option<Decimal>, ExecError> {
        let trades = self.store.trades_for_order(order_id).await?;
        let mut total_amount = Decimal::ZERO;
        let mut total_value = Decimal::ZERO;
        for trade in trades
            .iter()
            .filter(|t| t.venue == venue && t.action == TradeAction::Open)
        {
            total_amount += trade.amount;
            total_value += trade.price * trade.amount;
        }
        if total_amount.is_zero() {
            return Ok(None);
        }
        Ok(Some(total_value / total_amount))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use database::MemoryRepository;
    use rust_decimal_macros::dec;
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use venues::{VenueOrder, VenuePosition};

    /// Per-call scripted outcome for `create_order`.
    #[derive(Debug, Clone, Copy)]
    enum Scripted {
        Fill(Decimal),
        Fail,
    }

    struct FakeExchange {
        venue: Venue,
        script: Mutex<VecDeque<Scripted>>,
        default_price: Decimal,
        position_amount: Mutex<Option<Decimal>>,
        order_counter: AtomicU32,
        protective_calls: AtomicU32,
    }

    impl FakeExchange {
        fn new(venue: Venue, script: Vec<Scripted>) -> Self {
            Self {
                venue,
                script: Mutex::new(script.into()),
                default_price: dec!(100),
                position_amount: Mutex::new(None),
                order_counter: AtomicU32::new(0),
                protective_calls: AtomicU32::new(0),
            }
        }

        fn with_position(self, amount: Decimal) -> Self {
            *self.position_amount.lock().unwrap() = Some(amount);
            self
        }
    }

    #[async_trait]
    impl ExchangeAdapter for FakeExchange {
        fn venue(&self) -> Venue {
            self.venue
        }
        async fn connect(&self) -> Result<(), AdapterError> {
            Ok(())
        }
        async fn disconnect(&self) -> Result<(), AdapterError> {
            Ok(())
        }
        async fn funding_rate(&self, _symbol: &str) -> Result<Option<Decimal>, AdapterError> {
            Ok(None)
        }
        async fn all_funding_rates(&self) -> Result<HashMap<String, Decimal>, AdapterError> {
            Ok(HashMap::new())
        }
        async fn price(&self, _symbol: &str) -> Result<Option<Decimal>, AdapterError> {
            Ok(Some(self.default_price))
        }
        async fn balance(&self) -> Result<Option<Decimal>, AdapterError> {
            Ok(None)
        }
        async fn position(&self, _symbol: &str) -> Result<Option<VenuePosition>, AdapterError> {
            Ok(self
                .position_amount
                .lock()
                .unwrap()
                .map(|amount| VenuePosition {
                    amount,
                    unrealized_pnl: Decimal::ZERO,
                }))
        }
        async fn create_order(
            &self,
            _symbol: &str,
            _side: PositionSide,
            amount: Decimal,
            _order_type: VenueOrderType,
            _leverage: u32,
        ) -> Result<VenueOrder, AdapterError> {
            let next = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Scripted::Fill(self.default_price));
            match next {
                Scripted::Fill(price) => {
                    let n = self.order_counter.fetch_add(1, Ordering::SeqCst);
                    Ok(VenueOrder {
                        order_ref: format!("{}-{}", self.venue, n),
                        status: VenueOrderStatus::Filled,
                        price,
                        filled_amount: amount,
                    })
                }
                Scripted::Fail => Err(AdapterError::RateLimited),
            }
        }
        async fn liquidation_price(&self, _symbol: &str) -> Result<Option<Decimal>, AdapterError> {
            Ok(None)
        }
        async fn set_stop_loss_take_profit(
            &self,
            _symbol: &str,
            _side: PositionSide,
            _stop_loss_price: Decimal,
            _take_profit_price: Decimal,
        ) -> Result<(), AdapterError> {
            self.protective_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn fast_settings(max_imbalance: Decimal) -> ExecutorSettings {
        ExecutorSettings {
            amount_per_cycle: dec!(50),
            max_imbalance,
            cycle_delay: Duration::from_millis(1),
            imbalance_pause: Duration::from_millis(1),
            emergency_close_amount: dec!(1000),
        }
    }

    fn request(target: Decimal) -> OpenRequest {
        OpenRequest {
            symbol: "BTCUSDT".to_string(),
            strategy_type: StrategyType::LighterShortBinanceLong,
            target_amount: target,
            leverage: 3,
            entry_rate_diff: Some(dec!(0.0003)),
            stop_loss_price: Some(dec!(80)),
            take_profit_price: Some(dec!(120)),
        }
    }

    fn coordinator(
        lighter: FakeExchange,
        binance: FakeExchange,
        settings: ExecutorSettings,
    ) -> (ExecutionCoordinator, Arc<MemoryRepository>) {
        let store = Arc::new(MemoryRepository::new());
        let coordinator = ExecutionCoordinator::new(
            Arc::new(lighter),
            Arc::new(binance),
            store.clone(),
            settings,
        );
        (coordinator, store)
    }

    #[tokio::test]
    async fn full_fill_opens_with_vwap_entries() {
        // Two cycles of 50 each; Lighter fills at 100 then 110.
        let lighter = FakeExchange::new(
            Venue::Lighter,
            vec![Scripted::Fill(dec!(100)), Scripted::Fill(dec!(110))],
        );
        let binance = FakeExchange::new(Venue::Binance, vec![]);
        let (coordinator, store) = coordinator(lighter, binance, fast_settings(dec!(200)));

        let order_id = coordinator.open_position(request(dec!(100))).await.unwrap();
        let order = store.get_order(&order_id).await.unwrap();

        assert_eq!(order.status, OrderStatus::Open);
        assert_eq!(order.lighter.filled_amount, dec!(100));
        assert_eq!(order.binance.filled_amount, dec!(100));
        assert_eq!(order.lighter.entry_price, Some(dec!(105)));
        assert_eq!(order.binance.entry_price, Some(dec!(100)));
        assert_eq!(order.imbalance_amount, Decimal::ZERO);
        assert_eq!(order.lighter.order_refs.len(), 2);

        let trades = store.trades_for_order(&order_id).await.unwrap();
        assert_eq!(trades.len(), 4);
        assert!(trades.iter().all(|t| t.action == TradeAction::Open));
    }

    #[tokio::test]
    async fn lagging_venue_keeps_imbalance_at_the_boundary() {
        // Binance misses the first cycle; imbalance reaches exactly 50,
        // which is not strictly greater than the limit, so the cycle
        // proceeds instead of pausing.
        let lighter = FakeExchange::new(Venue::Lighter, vec![]);
        let binance = FakeExchange::new(
            Venue::Binance,
            vec![Scripted::Fail, Scripted::Fill(dec!(100))],
        );
        let (coordinator, store) = coordinator(lighter, binance, fast_settings(dec!(50)));

        let order_id = coordinator.open_position(request(dec!(100))).await.unwrap();
        let order = store.get_order(&order_id).await.unwrap();

        assert_eq!(order.status, OrderStatus::Open);
        assert_eq!(order.lighter.filled_amount, dec!(100));
        assert_eq!(order.binance.filled_amount, dec!(50));
        assert_eq!(order.imbalance_amount, dec!(50));
    }

    #[tokio::test]
    async fn persistent_imbalance_fails_the_order() {
        // Binance never fills; once the skew exceeds the limit the cycle
        // pauses, and after the pause budget the open is abandoned.
        let lighter = FakeExchange::new(Venue::Lighter, vec![]);
        let binance = FakeExchange::new(
            Venue::Binance,
            vec![Scripted::Fail, Scripted::Fail, Scripted::Fail, Scripted::Fail],
        );
        let (coordinator, store) = coordinator(lighter, binance, fast_settings(dec!(40)));

        let result = coordinator.open_position(request(dec!(200))).await;
        assert!(matches!(result, Err(ExecError::Stalled(_))));

        let orders = store.orders_by_status(&[OrderStatus::Failed]).await.unwrap();
        assert_eq!(orders.len(), 1);
        // The persisted checkpoint still reflects the skew at abandonment.
        assert_eq!(orders[0].imbalance_amount, dec!(50));
    }

    #[tokio::test]
    async fn both_legs_dead_fails_the_order() {
        let lighter = FakeExchange::new(
            Venue::Lighter,
            vec![Scripted::Fail, Scripted::Fail, Scripted::Fail],
        );
        let binance = FakeExchange::new(
            Venue::Binance,
            vec![Scripted::Fail, Scripted::Fail, Scripted::Fail],
        );
        let (coordinator, store) = coordinator(lighter, binance, fast_settings(dec!(200)));

        let result = coordinator.open_position(request(dec!(100))).await;
        assert!(matches!(result, Err(ExecError::Stalled(_))));
        let orders = store.orders_by_status(&[OrderStatus::Failed]).await.unwrap();
        assert_eq!(orders.len(), 1);
    }

    #[tokio::test]
    async fn close_requires_open_status() {
        let lighter = FakeExchange::new(Venue::Lighter, vec![]);
        let binance = FakeExchange::new(Venue::Binance, vec![]);
        let (coordinator, store) = coordinator(lighter, binance, fast_settings(dec!(200)));

        let order_id = coordinator.open_position(request(dec!(50))).await.unwrap();
        store
            .update_status(&order_id, OrderStatus::Closing)
            .await
            .unwrap();

        let result = coordinator.close_position(&order_id, dec!(50)).await;
        assert!(matches!(result, Err(ExecError::NotOpen { .. })));
    }

    #[tokio::test]
    async fn close_unwinds_live_amounts_and_records_trades() {
        let lighter = FakeExchange::new(Venue::Lighter, vec![]).with_position(dec!(100));
        let binance = FakeExchange::new(Venue::Binance, vec![]).with_position(dec!(100));
        let (coordinator, store) = coordinator(lighter, binance, fast_settings(dec!(200)));

        let order_id = coordinator.open_position(request(dec!(100))).await.unwrap();
        coordinator.close_position(&order_id, dec!(50)).await.unwrap();

        let order = store.get_order(&order_id).await.unwrap();
        assert_eq!(order.status, OrderStatus::Closed);

        let trades = store.trades_for_order(&order_id).await.unwrap();
        let close_trades: Vec<_> = trades
            .iter()
            .filter(|t| t.action == TradeAction::Close)
            .collect();
        // Two cycles of 50 per venue.
        assert_eq!(close_trades.len(), 4);
        // Close sides are the opposite of entry.
        assert!(close_trades
            .iter()
            .filter(|t| t.venue == Venue::Lighter)
            .all(|t| t.side == PositionSide::Long));
        assert!(close_trades
            .iter()
            .filter(|t| t.venue == Venue::Binance)
            .all(|t| t.side == PositionSide::Short));
    }

    #[tokio::test]
    async fn close_with_one_flat_venue_finishes_immediately() {
        // Lighter reads flat; the batched unwind has nothing to pair, so the
        // order is closed without placing orders.
        let lighter = FakeExchange::new(Venue::Lighter, vec![]);
        let binance = FakeExchange::new(Venue::Binance, vec![]).with_position(dec!(100));
        let (coordinator, store) = coordinator(lighter, binance, fast_settings(dec!(200)));

        let order_id = coordinator.open_position(request(dec!(100))).await.unwrap();
        let open_trades = store.trades_for_order(&order_id).await.unwrap().len();

        coordinator.close_position(&order_id, dec!(50)).await.unwrap();
        let order = store.get_order(&order_id).await.unwrap();
        assert_eq!(order.status, OrderStatus::Closed);
        assert_eq!(
            store.trades_for_order(&order_id).await.unwrap().len(),
            open_trades
        );
    }
}
