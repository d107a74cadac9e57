//! Background risk monitoring for live paired positions.
//!
//! Four independent loops watch different failure surfaces on different
//! cadences: fill imbalance and drawdown, stop-loss/take-profit triggers,
//! liquidation proximity and account balances. Every finding is raised as an
//! advisory [`events::Alert`]: logged, persisted as a system-log row and
//! broadcast to subscribers. Unless `risk.auto_close` is enabled the monitors
//! never touch the close path themselves; `emergency_close_all` is the only
//! corrective action and it runs only when explicitly invoked.

use std::sync::Arc;
use std::time::Duration;

use configuration::RiskConfig;
use core_types::{ArbitrageOrder, OrderStatus, PositionSide};
use database::{ArbStore, DbError};
use events::{alert, Alert, AlertKind, WsMessage};
use executor::ExecutionCoordinator;
use rust_decimal::Decimal;
use serde_json::json;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use venues::{ExchangeAdapter, Retry};

#[derive(Debug, Error)]
pub enum RiskError {
    #[error("Store error: {0}")]
    Store(#[from] DbError),
}

/// Which protective level a price crossed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    StopLoss,
    TakeProfit,
}

/// Fill skew as a fraction of the combined live amount. `None` when both
/// venues read flat.
pub fn imbalance_ratio(lighter_amount: Decimal, binance_amount: Decimal) -> Option<Decimal> {
    let total = lighter_amount + binance_amount;
    if total <= Decimal::ZERO {
        return None;
    }
    Some((lighter_amount - binance_amount).abs() / total)
}

/// Checks the current price against an order's protective levels. The levels
/// are expressed for the Lighter leg, so direction follows that side: a long
/// stops below and takes above, a short the other way around. Stop-loss wins
/// when both would fire.
pub fn stop_take_trigger(
    side: PositionSide,
    current_price: Decimal,
    stop_loss: Option<Decimal>,
    take_profit: Option<Decimal>,
) -> Option<TriggerKind> {
    if let Some(stop) = stop_loss {
        let hit = match side {
            PositionSide::Long => current_price <= stop,
            PositionSide::Short => current_price >= stop,
        };
        if hit {
            return Some(TriggerKind::StopLoss);
        }
    }
    if let Some(take) = take_profit {
        let hit = match side {
            PositionSide::Long => current_price >= take,
            PositionSide::Short => current_price <= take,
        };
        if hit {
            return Some(TriggerKind::TakeProfit);
        }
    }
    None
}

/// Whether the current price sits inside the buffered zone around a venue's
/// liquidation price.
pub fn liquidation_breached(
    side: PositionSide,
    current_price: Decimal,
    liquidation_price: Decimal,
    buffer_pct: Decimal,
) -> bool {
    match side {
        PositionSide::Long => current_price <= liquidation_price * (Decimal::ONE + buffer_pct),
        PositionSide::Short => current_price >= liquidation_price * (Decimal::ONE - buffer_pct),
    }
}

/// The risk watchdog. Holds read access to both venues and the store, plus
/// the coordinator for the emergency close path.
pub struct RiskMonitor {
    lighter: Arc<dyn ExchangeAdapter>,
    binance: Arc<dyn ExchangeAdapter>,
    store: Arc<dyn ArbStore>,
    coordinator: Arc<ExecutionCoordinator>,
    config: RiskConfig,
    retry: Retry,
    events: broadcast::Sender<WsMessage>,
}

impl RiskMonitor {
    pub fn new(
        lighter: Arc<dyn ExchangeAdapter>,
        binance: Arc<dyn ExchangeAdapter>,
        store: Arc<dyn ArbStore>,
        coordinator: Arc<ExecutionCoordinator>,
        config: RiskConfig,
        retry: Retry,
        events: broadcast::Sender<WsMessage>,
    ) -> Self {
        Self {
            lighter,
            binance,
            store,
            coordinator,
            config,
            retry,
            events,
        }
    }

    /// Runs all four monitoring loops until the token is cancelled.
    pub async fn run(&self, token: CancellationToken) {
        info!(auto_close = self.config.auto_close, "risk monitor started");
        tokio::join!(
            self.position_loop(token.clone()),
            self.stop_take_loop(token.clone()),
            self.liquidation_loop(token.clone()),
            self.balance_loop(token),
        );
        info!("risk monitor stopped");
    }

    async fn position_loop(&self, token: CancellationToken) {
        let mut ticker = interval(Duration::from_secs(self.config.position_check_secs));
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {}
            }
            match self
                .store
                .orders_by_status(&[OrderStatus::Open, OrderStatus::Opening])
                .await
            {
                Ok(orders) => {
                    for order in &orders {
                        self.check_position_risk(order).await;
                    }
                }
                Err(e) => error!(error = %e, "loading orders for position check failed"),
            }
        }
    }

    async fn stop_take_loop(&self, token: CancellationToken) {
        let mut ticker = interval(Duration::from_secs(self.config.stop_check_secs));
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {}
            }
            match self.store.orders_by_status(&[OrderStatus::Open]).await {
                Ok(orders) => {
                    for order in &orders {
                        self.check_stop_take(order).await;
                    }
                }
                Err(e) => error!(error = %e, "loading orders for stop/take check failed"),
            }
        }
    }

    async fn liquidation_loop(&self, token: CancellationToken) {
        let mut ticker = interval(Duration::from_secs(self.config.liquidation_check_secs));
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {}
            }
            match self.store.orders_by_status(&[OrderStatus::Open]).await {
                Ok(orders) => {
                    for order in &orders {
                        self.check_liquidation(order).await;
                    }
                }
                Err(e) => error!(error = %e, "loading orders for liquidation check failed"),
            }
        }
    }

    async fn balance_loop(&self, token: CancellationToken) {
        let mut ticker = interval(Duration::from_secs(self.config.balance_check_secs));
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {}
            }
            self.check_balances().await;
        }
    }

    /// Compares both live legs of one order: fill skew against the imbalance
    /// ceiling and combined unrealized P&L against the drawdown alarm.
    pub async fn check_position_risk(&self, order: &ArbitrageOrder) {
        let symbol = order.symbol.clone();
        let lighter = self
            .retry
            .call_or("lighter position", None, || self.lighter.position(&symbol))
            .await;
        let binance = self
            .retry
            .call_or("binance position", None, || self.binance.position(&symbol))
            .await;
        let (Some(lighter), Some(binance)) = (lighter, binance) else {
            return;
        };

        if let Some(ratio) = imbalance_ratio(lighter.amount, binance.amount) {
            if ratio > self.config.max_imbalance_ratio {
                self.raise(alert(
                    AlertKind::HighImbalance,
                    "risk",
                    format!(
                        "Position imbalance on {}: ratio {ratio:.4} (lighter {}, binance {})",
                        order.order_id, lighter.amount, binance.amount
                    ),
                    json!({
                        "order_id": order.order_id,
                        "imbalance_ratio": ratio,
                        "lighter_amount": lighter.amount,
                        "binance_amount": binance.amount,
                    }),
                ))
                .await;
            }
        }

        let total_pnl = lighter.unrealized_pnl + binance.unrealized_pnl;
        let alarm_level = -order.total_entry_amount() * self.config.loss_alert_ratio;
        if total_pnl < alarm_level {
            self.raise(alert(
                AlertKind::HighLoss,
                "risk",
                format!(
                    "Unrealized loss on {}: {total_pnl} against entry {}",
                    order.order_id,
                    order.total_entry_amount()
                ),
                json!({
                    "order_id": order.order_id,
                    "unrealized_pnl": total_pnl,
                }),
            ))
            .await;
        }
    }

    /// Checks one order's protective levels against the current Lighter price.
    pub async fn check_stop_take(&self, order: &ArbitrageOrder) {
        let symbol = order.symbol.clone();
        let Some(price) = self
            .retry
            .call_or("lighter price", None, || self.lighter.price(&symbol))
            .await
        else {
            return;
        };

        let trigger = stop_take_trigger(
            order.lighter.side,
            price,
            order.stop_loss_price,
            order.take_profit_price,
        );
        let Some(trigger) = trigger else { return };

        let (kind, level) = match trigger {
            TriggerKind::StopLoss => (AlertKind::StopLossTriggered, order.stop_loss_price),
            TriggerKind::TakeProfit => (AlertKind::TakeProfitTriggered, order.take_profit_price),
        };
        self.raise(alert(
            kind,
            "risk",
            format!(
                "{kind:?} on {}: price {price} crossed {}",
                order.order_id,
                level.unwrap_or_default()
            ),
            json!({
                "order_id": order.order_id,
                "current_price": price,
                "trigger_price": level,
            }),
        ))
        .await;

        if self.config.auto_close {
            self.close_for_trigger(&order.order_id).await;
        }
    }

    /// Flags either venue whose liquidation price sits within the configured
    /// buffer of the current price.
    pub async fn check_liquidation(&self, order: &ArbitrageOrder) {
        let symbol = order.symbol.clone();
        let Some(price) = self
            .retry
            .call_or("lighter price", None, || self.lighter.price(&symbol))
            .await
        else {
            return;
        };

        let legs: [(&str, &Arc<dyn ExchangeAdapter>, PositionSide); 2] = [
            ("lighter", &self.lighter, order.lighter.side),
            ("binance", &self.binance, order.binance.side),
        ];
        let mut breached = false;
        for (name, adapter, side) in legs {
            let liq = self
                .retry
                .call_or("liquidation price", None, || {
                    adapter.liquidation_price(&symbol)
                })
                .await;
            let Some(liq) = liq else { continue };
            if liquidation_breached(side, price, liq, self.config.liquidation_buffer_pct) {
                breached = true;
                self.raise(alert(
                    AlertKind::LiquidationRisk,
                    "risk",
                    format!(
                        "{name} near liquidation on {}: price {price}, liquidation {liq}",
                        order.order_id
                    ),
                    json!({
                        "order_id": order.order_id,
                        "venue": name,
                        "current_price": price,
                        "liquidation_price": liq,
                    }),
                ))
                .await;
            }
        }

        if breached && self.config.auto_close {
            self.close_for_trigger(&order.order_id).await;
        }
    }

    /// Alerts when either venue's available balance drops below the floor.
    pub async fn check_balances(&self) {
        let checks: [(&str, &Arc<dyn ExchangeAdapter>); 2] =
            [("lighter", &self.lighter), ("binance", &self.binance)];
        for (name, adapter) in checks {
            let balance = self
                .retry
                .call_or("balance", None, || adapter.balance())
                .await;
            let Some(balance) = balance else { continue };
            if balance < self.config.min_balance {
                self.raise(alert(
                    AlertKind::LowBalance,
                    "risk",
                    format!("{name} balance low: {balance}"),
                    json!({ "venue": name, "balance": balance }),
                ))
                .await;
            }
        }
    }

    /// Unwinds every open order with the oversized emergency batch amount.
    /// Per-order failures are logged and skipped; returns how many orders
    /// reached `Closed`.
    pub async fn emergency_close_all(&self) -> Result<usize, RiskError> {
        warn!("emergency close of all open positions requested");
        let orders = self.store.orders_by_status(&[OrderStatus::Open]).await?;
        let mut closed = 0;
        for order in &orders {
            match self.coordinator.emergency_close(&order.order_id).await {
                Ok(()) => closed += 1,
                Err(e) => error!(order_id = %order.order_id, error = %e, "emergency close failed"),
            }
        }
        self.raise(alert(
            AlertKind::EmergencyClose,
            "risk",
            format!("Emergency close completed: {closed}/{} orders", orders.len()),
            json!({ "closed": closed, "total": orders.len() }),
        ))
        .await;
        Ok(closed)
    }

    async fn close_for_trigger(&self, order_id: &str) {
        let amount = self.coordinator.settings().amount_per_cycle;
        if let Err(e) = self.coordinator.close_position(order_id, amount).await {
            error!(order_id, error = %e, "auto close failed");
        }
    }

    /// Logs, persists and broadcasts one alert. Persistence failures are
    /// logged and swallowed so a dead store never silences the monitors.
    async fn raise(&self, alert: Alert) {
        warn!(kind = alert.kind.as_str(), "{}", alert.message);
        if let Err(e) = self
            .store
            .append_system_log("WARNING", &alert.module, &alert.message, &alert.details)
            .await
        {
            error!(error = %e, "persisting risk alert failed");
        }
        let _ = self.events.send(WsMessage::Alert(alert));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use core_types::{generate_order_id, StrategyType, Venue, VenueLeg};
    use database::MemoryRepository;
    use executor::ExecutorSettings;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;
    use venues::{AdapterError, VenueOrder, VenueOrderStatus, VenueOrderType, VenuePosition};

    struct FakeExchange {
        venue: Venue,
        balance: Option<Decimal>,
        position: Option<VenuePosition>,
        price: Option<Decimal>,
        liquidation: Option<Decimal>,
    }

    impl FakeExchange {
        fn new(venue: Venue) -> Self {
            Self {
                venue,
                balance: None,
                position: None,
                price: Some(dec!(100)),
                liquidation: None,
            }
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
            Ok(self.price)
        }
        async fn balance(&self) -> Result<Option<Decimal>, AdapterError> {
            Ok(self.balance)
        }
        async fn position(&self, _symbol: &str) -> Result<Option<VenuePosition>, AdapterError> {
            Ok(self.position)
        }
        async fn create_order(
            &self,
            _symbol: &str,
            _side: PositionSide,
            amount: Decimal,
            _order_type: VenueOrderType,
            _leverage: u32,
        ) -> Result<VenueOrder, AdapterError> {
            Ok(VenueOrder {
                order_ref: "fill".to_string(),
                status: VenueOrderStatus::Filled,
                price: dec!(100),
                filled_amount: amount,
            })
        }
        async fn liquidation_price(&self, _symbol: &str) -> Result<Option<Decimal>, AdapterError> {
            Ok(self.liquidation)
        }
        async fn set_stop_loss_take_profit(
            &self,
            _symbol: &str,
            _side: PositionSide,
            _stop_loss_price: Decimal,
            _take_profit_price: Decimal,
        ) -> Result<(), AdapterError> {
            Ok(())
        }
    }

    fn risk_config() -> RiskConfig {
        RiskConfig {
            max_imbalance_ratio: dec!(0.2),
            loss_alert_ratio: dec!(0.5),
            liquidation_buffer_pct: dec!(0.05),
            min_balance: dec!(100),
            auto_close: false,
            position_check_secs: 5,
            stop_check_secs: 1,
            liquidation_check_secs: 10,
            balance_check_secs: 60,
            imbalance_sync_secs: 30,
        }
    }

    fn open_order() -> ArbitrageOrder {
        ArbitrageOrder {
            order_id: generate_order_id("BTCUSDT"),
            symbol: "BTCUSDT".to_string(),
            strategy_type: StrategyType::LighterShortBinanceLong,
            lighter: VenueLeg::new(PositionSide::Short, dec!(300), 3),
            binance: VenueLeg::new(PositionSide::Long, dec!(300), 3),
            status: OrderStatus::Open,
            imbalance_amount: Decimal::ZERO,
            stop_loss_price: None,
            take_profit_price: None,
            entry_rate_diff: Some(dec!(0.0003)),
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    fn monitor(
        lighter: FakeExchange,
        binance: FakeExchange,
        store: Arc<MemoryRepository>,
        config: RiskConfig,
    ) -> (RiskMonitor, broadcast::Receiver<WsMessage>) {
        let lighter: Arc<dyn ExchangeAdapter> = Arc::new(lighter);
        let binance: Arc<dyn ExchangeAdapter> = Arc::new(binance);
        let coordinator = Arc::new(ExecutionCoordinator::new(
            lighter.clone(),
            binance.clone(),
            store.clone(),
            ExecutorSettings {
                amount_per_cycle: dec!(100),
                max_imbalance: dec!(200),
                cycle_delay: Duration::from_millis(1),
                imbalance_pause: Duration::from_millis(1),
                emergency_close_amount: dec!(1000),
            },
        ));
        let (tx, rx) = broadcast::channel(16);
        let retry = Retry::new(1, Duration::from_millis(1), Duration::from_millis(1));
        (
            RiskMonitor::new(lighter, binance, store, coordinator, config, retry, tx),
            rx,
        )
    }

    #[test]
    fn long_triggers_stop_below_and_take_above() {
        let stop = Some(dec!(80));
        let take = Some(dec!(120));
        assert_eq!(
            stop_take_trigger(PositionSide::Long, dec!(79), stop, take),
            Some(TriggerKind::StopLoss)
        );
        assert_eq!(
            stop_take_trigger(PositionSide::Long, dec!(121), stop, take),
            Some(TriggerKind::TakeProfit)
        );
        assert_eq!(
            stop_take_trigger(PositionSide::Long, dec!(100), stop, take),
            None
        );
    }

    #[test]
    fn short_triggers_mirror_the_long_side() {
        let stop = Some(dec!(120));
        let take = Some(dec!(80));
        assert_eq!(
            stop_take_trigger(PositionSide::Short, dec!(121), stop, take),
            Some(TriggerKind::StopLoss)
        );
        assert_eq!(
            stop_take_trigger(PositionSide::Short, dec!(79), stop, take),
            Some(TriggerKind::TakeProfit)
        );
        assert_eq!(
            stop_take_trigger(PositionSide::Short, dec!(100), stop, take),
            None
        );
    }

    #[test]
    fn imbalance_ratio_needs_live_exposure() {
        assert_eq!(
            imbalance_ratio(dec!(150), dec!(50)),
            Some(dec!(0.5))
        );
        assert_eq!(imbalance_ratio(Decimal::ZERO, Decimal::ZERO), None);
    }

    #[test]
    fn liquidation_buffer_is_direction_aware() {
        // Long with liquidation at 90 and a 5% buffer alarms at 94.5.
        assert!(liquidation_breached(
            PositionSide::Long,
            dec!(94),
            dec!(90),
            dec!(0.05)
        ));
        assert!(!liquidation_breached(
            PositionSide::Long,
            dec!(95),
            dec!(90),
            dec!(0.05)
        ));
        // Short with liquidation at 110 alarms at 104.5.
        assert!(liquidation_breached(
            PositionSide::Short,
            dec!(105),
            dec!(110),
            dec!(0.05)
        ));
        assert!(!liquidation_breached(
            PositionSide::Short,
            dec!(104),
            dec!(110),
            dec!(0.05)
        ));
    }

    #[tokio::test]
    async fn balance_floor_is_strictly_below() {
        let store = Arc::new(MemoryRepository::new());
        let mut lighter = FakeExchange::new(Venue::Lighter);
        lighter.balance = Some(dec!(100));
        let mut binance = FakeExchange::new(Venue::Binance);
        binance.balance = Some(dec!(99.99));
        let (monitor, mut rx) = monitor(lighter, binance, store.clone(), risk_config());

        monitor.check_balances().await;

        let msg = rx.try_recv().expect("one alert");
        match msg {
            WsMessage::Alert(a) => {
                assert_eq!(a.kind, AlertKind::LowBalance);
                assert!(a.message.contains("binance"));
            }
            other => panic!("unexpected message: {other:?}"),
        }
        assert!(rx.try_recv().is_err());
        assert_eq!(store.logs().await.len(), 1);
    }

    #[tokio::test]
    async fn imbalanced_live_legs_raise_an_alert() {
        let store = Arc::new(MemoryRepository::new());
        let order = open_order();
        store.insert_order(&order).await.unwrap();

        let mut lighter = FakeExchange::new(Venue::Lighter);
        lighter.position = Some(VenuePosition {
            amount: dec!(300),
            unrealized_pnl: dec!(1),
        });
        let mut binance = FakeExchange::new(Venue::Binance);
        binance.position = Some(VenuePosition {
            amount: dec!(100),
            unrealized_pnl: dec!(-2),
        });
        let (monitor, mut rx) = monitor(lighter, binance, store, risk_config());

        monitor.check_position_risk(&order).await;

        match rx.try_recv().expect("one alert") {
            WsMessage::Alert(a) => assert_eq!(a.kind, AlertKind::HighImbalance),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[tokio::test]
    async fn deep_drawdown_raises_high_loss() {
        let store = Arc::new(MemoryRepository::new());
        let order = open_order();
        store.insert_order(&order).await.unwrap();

        // Entry is 600 total; a combined -301 crosses the 50% alarm.
        let mut lighter = FakeExchange::new(Venue::Lighter);
        lighter.position = Some(VenuePosition {
            amount: dec!(300),
            unrealized_pnl: dec!(-200),
        });
        let mut binance = FakeExchange::new(Venue::Binance);
        binance.position = Some(VenuePosition {
            amount: dec!(300),
            unrealized_pnl: dec!(-101),
        });
        let (monitor, mut rx) = monitor(lighter, binance, store, risk_config());

        monitor.check_position_risk(&order).await;

        match rx.try_recv().expect("one alert") {
            WsMessage::Alert(a) => assert_eq!(a.kind, AlertKind::HighLoss),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[tokio::test]
    async fn stop_trigger_alerts_without_closing_by_default() {
        let store = Arc::new(MemoryRepository::new());
        let mut order = open_order();
        // Lighter leg is short, so the stop sits above entry.
        order.stop_loss_price = Some(dec!(120));
        order.take_profit_price = Some(dec!(80));
        store.insert_order(&order).await.unwrap();

        let mut lighter = FakeExchange::new(Venue::Lighter);
        lighter.price = Some(dec!(125));
        let binance = FakeExchange::new(Venue::Binance);
        let (monitor, mut rx) = monitor(lighter, binance, store.clone(), risk_config());

        monitor.check_stop_take(&order).await;

        match rx.try_recv().expect("one alert") {
            WsMessage::Alert(a) => assert_eq!(a.kind, AlertKind::StopLossTriggered),
            other => panic!("unexpected message: {other:?}"),
        }
        let stored = store.get_order(&order.order_id).await.unwrap();
        assert_eq!(stored.status, OrderStatus::Open);
    }

    #[tokio::test]
    async fn auto_close_unwinds_on_take_profit() {
        let store = Arc::new(MemoryRepository::new());
        let mut order = open_order();
        order.stop_loss_price = Some(dec!(120));
        order.take_profit_price = Some(dec!(80));
        store.insert_order(&order).await.unwrap();

        let mut lighter = FakeExchange::new(Venue::Lighter);
        lighter.price = Some(dec!(75));
        lighter.position = Some(VenuePosition {
            amount: dec!(300),
            unrealized_pnl: Decimal::ZERO,
        });
        let mut binance = FakeExchange::new(Venue::Binance);
        binance.position = Some(VenuePosition {
            amount: dec!(300),
            unrealized_pnl: Decimal::ZERO,
        });
        let mut config = risk_config();
        config.auto_close = true;
        let (monitor, _rx) = monitor(lighter, binance, store.clone(), config);

        monitor.check_stop_take(&order).await;

        let stored = store.get_order(&order.order_id).await.unwrap();
        assert_eq!(stored.status, OrderStatus::Closed);
    }

    #[tokio::test]
    async fn emergency_close_drains_every_open_order() {
        let store = Arc::new(MemoryRepository::new());
        let first = open_order();
        let second = open_order();
        store.insert_order(&first).await.unwrap();
        store.insert_order(&second).await.unwrap();

        let mut lighter = FakeExchange::new(Venue::Lighter);
        lighter.position = Some(VenuePosition {
            amount: dec!(300),
            unrealized_pnl: Decimal::ZERO,
        });
        let mut binance = FakeExchange::new(Venue::Binance);
        binance.position = Some(VenuePosition {
            amount: dec!(300),
            unrealized_pnl: Decimal::ZERO,
        });
        let (monitor, _rx) = monitor(lighter, binance, store.clone(), risk_config());

        let closed = monitor.emergency_close_all().await.unwrap();
        assert_eq!(closed, 2);
        for id in [first.order_id, second.order_id] {
            let stored = store.get_order(&id).await.unwrap();
            assert_eq!(stored.status, OrderStatus::Closed);
        }
    }
}
