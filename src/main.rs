use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use chrono::Utc;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use analytics::PnlReconciler;
use configuration::{load_config, Config};
use core_types::{OrderStatus, SymbolEntry};
use database::{connect, run_migrations, ArbStore, PgRepository};
use events::WsMessage;
use executor::{ExecutionCoordinator, ExecutorSettings, OpenRequest};
use feed::RateFeed;
use positions::PositionLedger;
use risk::RiskMonitor;
use strategy::{OpportunityDetector, StrategyParams};
use venues::{BinanceAdapter, ExchangeAdapter, LighterAdapter, Retry};

/// The main entry point for the funding-rate arbitrage engine.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = load_config().context("Failed to load config.toml")?;
    let cli = Cli::parse();

    let app = App::init(config).await?;

    match cli.command {
        Commands::Run => app.run().await,
        Commands::Open { symbol, amount } => app.open(&symbol, amount).await,
        Commands::Close { order_id, amount } => app.close(&order_id, amount).await,
        Commands::EmergencyClose => app.emergency_close().await,
        Commands::Rates => app.rates().await,
        Commands::Positions => app.positions().await,
        Commands::History { limit } => app.history(limit).await,
        Commands::Trades { order_id } => app.trades(&order_id).await,
        Commands::Reconcile { order_id } => app.reconcile(&order_id).await,
        Commands::Stats { days } => app.stats(days).await,
        Commands::Symbols => app.symbols().await,
        Commands::SetSymbol { symbol, enabled } => app.set_symbol(&symbol, enabled).await,
    }
}

// ==============================================================================
// CLI Structure
// ==============================================================================

/// A dual-venue funding-rate arbitrage engine for Lighter and Binance futures.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full engine: rate feed, opportunity loop and risk monitors.
    Run,
    /// Open a paired position for a symbol with a qualifying differential.
    Open {
        /// The symbol to open (e.g. "BTCUSDT").
        #[arg(long)]
        symbol: String,
        /// Target quote amount per leg; defaults to the configured size.
        #[arg(long)]
        amount: Option<Decimal>,
    },
    /// Close one open paired position.
    Close {
        #[arg(long)]
        order_id: String,
        /// Per-cycle close amount; defaults to the configured size.
        #[arg(long)]
        amount: Option<Decimal>,
    },
    /// Unwind every open position with the oversized emergency batch.
    EmergencyClose,
    /// Print the current funding-rate differentials.
    Rates,
    /// Print live positions and the exposure summary.
    Positions,
    /// Print recently closed positions.
    History {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Print the recorded fills of one order.
    Trades {
        #[arg(long)]
        order_id: String,
    },
    /// Recompute and print the realized P&L of one closed order.
    Reconcile {
        #[arg(long)]
        order_id: String,
    },
    /// Print aggregate P&L statistics over a trailing window.
    Stats {
        #[arg(long, default_value_t = 30)]
        days: i64,
    },
    /// Print the enabled symbol allowlist.
    Symbols,
    /// Add a symbol to the allowlist, or flip its enabled flag.
    SetSymbol {
        #[arg(long)]
        symbol: String,
        #[arg(long)]
        enabled: bool,
    },
}

// ==============================================================================
// Application wiring
// ==============================================================================

/// Every long-lived component, wired once at startup and shared across
/// whatever command runs.
struct App {
    config: Config,
    lighter: Arc<dyn ExchangeAdapter>,
    binance: Arc<dyn ExchangeAdapter>,
    store: Arc<dyn ArbStore>,
    feed: Arc<RateFeed>,
    detector: OpportunityDetector,
    coordinator: Arc<ExecutionCoordinator>,
    ledger: Arc<PositionLedger>,
    reconciler: PnlReconciler,
    events: broadcast::Sender<WsMessage>,
}

impl App {
    async fn init(config: Config) -> anyhow::Result<Self> {
        let pool = connect().await.context("Failed to connect to the database")?;
        run_migrations(&pool)
            .await
            .context("Failed to run database migrations")?;
        let store: Arc<dyn ArbStore> = Arc::new(PgRepository::new(pool));

        let lighter: Arc<dyn ExchangeAdapter> =
            Arc::new(LighterAdapter::new(&config.venues.lighter));
        let binance: Arc<dyn ExchangeAdapter> =
            Arc::new(BinanceAdapter::new(&config.venues.binance));
        if let Err(e) = lighter.connect().await {
            warn!(error = %e, "lighter connect failed, market data may lag");
        }
        if let Err(e) = binance.connect().await {
            warn!(error = %e, "binance connect failed");
        }

        let feed = Arc::new(RateFeed::new(
            lighter.clone(),
            binance.clone(),
            store.clone(),
            Retry::default(),
        ));
        let detector =
            OpportunityDetector::new(feed.clone(), StrategyParams::from(&config.trading));
        let coordinator = Arc::new(ExecutionCoordinator::new(
            lighter.clone(),
            binance.clone(),
            store.clone(),
            ExecutorSettings::from_config(&config.trading, &config.execution),
        ));
        let ledger = Arc::new(PositionLedger::new(
            lighter.clone(),
            binance.clone(),
            store.clone(),
            Retry::default(),
        ));
        let reconciler = PnlReconciler::new(store.clone());
        let (events, _) = broadcast::channel(256);

        Ok(Self {
            config,
            lighter,
            binance,
            store,
            feed,
            detector,
            coordinator,
            ledger,
            reconciler,
            events,
        })
    }

    fn risk_monitor(&self) -> RiskMonitor {
        RiskMonitor::new(
            self.lighter.clone(),
            self.binance.clone(),
            self.store.clone(),
            self.coordinator.clone(),
            self.config.risk.clone(),
            Retry::default(),
            self.events.clone(),
        )
    }

    // --------------------------------------------------------------------------
    // `run`: the full engine
    // --------------------------------------------------------------------------

    async fn run(self) -> anyhow::Result<()> {
        let poll_interval = Duration::from_secs(self.config.feed.poll_interval_secs);
        let token = CancellationToken::new();
        let mut tasks = Vec::new();

        let feed = self.feed.clone();
        let feed_token = token.child_token();
        tasks.push(tokio::spawn(async move {
            feed.run(poll_interval, feed_token).await;
        }));

        let ledger = self.ledger.clone();
        let sync_interval = Duration::from_secs(self.config.risk.imbalance_sync_secs);
        let sync_token = token.child_token();
        tasks.push(tokio::spawn(async move {
            ledger.run_sync(sync_interval, sync_token).await;
        }));

        let monitor = Arc::new(self.risk_monitor());
        let risk_token = token.child_token();
        tasks.push(tokio::spawn(async move {
            monitor.run(risk_token).await;
        }));

        let publish_token = token.child_token();
        {
            let feed = self.feed.clone();
            let ledger = self.ledger.clone();
            let events = self.events.clone();
            tasks.push(tokio::spawn(async move {
                publish_snapshots(feed, ledger, events, poll_interval, publish_token).await;
            }));
        }

        info!("engine started, press ctrl-c to stop");
        let trade_token = token.child_token();
        tokio::select! {
            _ = self.trade_loop(poll_interval, trade_token) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested");
            }
        }
        token.cancel();
        for task in tasks {
            let _ = task.await;
        }
        info!("engine stopped");
        Ok(())
    }

    /// Detects opportunities and drives the open path, and raises close
    /// advisories for positions whose edge has gone.
    async fn trade_loop(&self, poll_interval: Duration, token: CancellationToken) {
        let mut ticker = tokio::time::interval(poll_interval);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {}
            }
            if let Err(e) = self.trade_cycle().await {
                error!(error = %e, "trade cycle failed");
            }
        }
    }

    async fn trade_cycle(&self) -> anyhow::Result<()> {
        let live = self
            .store
            .orders_by_status(&[OrderStatus::Opening, OrderStatus::Open])
            .await?;

        // Entry: one position per symbol, sized against the committed total.
        // An empty allowlist means every symbol with rates is tradable.
        let allowlist = self.store.list_enabled_symbols().await?;
        let mut committed: Decimal = live.iter().map(|o| o.lighter.target_amount).sum();
        for signal in self.detector.detect_all().await {
            if !allowlist.is_empty() && !allowlist.iter().any(|s| s.symbol == signal.symbol) {
                continue;
            }
            if live.iter().any(|o| o.symbol == signal.symbol) {
                continue;
            }
            let size = self.detector.position_size(committed);
            if size <= Decimal::ZERO {
                info!(symbol = %signal.symbol, "opportunity skipped, exposure cap reached");
                continue;
            }
            match self.open_from_signal(&signal, size).await {
                Ok(order_id) => {
                    // Later signals in the same pass size against the new total.
                    committed += size;
                    info!(order_id, symbol = %signal.symbol, "position opened");
                }
                Err(e) => error!(symbol = %signal.symbol, error = %e, "open failed"),
            }
        }

        // Exit advisories for positions that are already open.
        let now = Utc::now();
        for order in live.iter().filter(|o| o.status == OrderStatus::Open) {
            let diff = self
                .feed
                .rate_diff(&order.symbol)
                .await
                .map(|s| s.current_diff);
            let entry_diff = order.entry_rate_diff.unwrap_or(Decimal::ZERO);
            if let Some(reason) =
                self.detector
                    .should_close(diff, entry_diff, order.holding_hours(now))
            {
                warn!(order_id = %order.order_id, %reason, "close advised");
            }
        }
        Ok(())
    }

    async fn open_from_signal(
        &self,
        signal: &strategy::Signal,
        amount: Decimal,
    ) -> anyhow::Result<String> {
        let (lighter_side, _) = signal.strategy_type.sides();
        let entry_price = self
            .lighter
            .price(&signal.symbol)
            .await?
            .context("No reference price for symbol")?;
        let (stop, take) = self.detector.stop_take_prices(entry_price, lighter_side);

        let order_id = self
            .coordinator
            .open_position(OpenRequest {
                symbol: signal.symbol.clone(),
                strategy_type: signal.strategy_type,
                target_amount: amount,
                leverage: self.config.trading.leverage,
                entry_rate_diff: Some(signal.rate_diff),
                stop_loss_price: Some(stop),
                take_profit_price: Some(take),
            })
            .await?;
        Ok(order_id)
    }

    // --------------------------------------------------------------------------
    // One-shot commands
    // --------------------------------------------------------------------------

    async fn open(&self, symbol: &str, amount: Option<Decimal>) -> anyhow::Result<()> {
        self.feed.refresh().await;
        let signal = self
            .detector
            .detect(symbol)
            .await
            .context("No qualifying rate differential for this symbol")?;
        let amount = amount.unwrap_or(self.config.trading.position_size_per_order);
        let order_id = self.open_from_signal(&signal, amount).await?;
        println!("opened {order_id}");
        Ok(())
    }

    async fn close(&self, order_id: &str, amount: Option<Decimal>) -> anyhow::Result<()> {
        let amount = amount.unwrap_or(self.coordinator.settings().amount_per_cycle);
        self.coordinator.close_position(order_id, amount).await?;
        match self.reconciler.reconcile(order_id).await {
            Ok(record) => println!("{}", serde_json::to_string_pretty(&record)?),
            Err(e) => warn!(order_id, error = %e, "close succeeded but reconciliation failed"),
        }
        Ok(())
    }

    async fn emergency_close(&self) -> anyhow::Result<()> {
        let monitor = self.risk_monitor();
        let closed = monitor.emergency_close_all().await?;
        println!("closed {closed} positions");
        Ok(())
    }

    async fn rates(&self) -> anyhow::Result<()> {
        self.feed.refresh().await;
        let diffs = self.feed.all_rate_diffs().await;
        if diffs.is_empty() {
            println!("no symbol has rates from both venues yet");
            return Ok(());
        }
        println!("{}", serde_json::to_string_pretty(&diffs)?);
        Ok(())
    }

    async fn positions(&self) -> anyhow::Result<()> {
        let views = self.ledger.all_positions().await?;
        let summary = self.ledger.summary().await?;
        println!("{}", serde_json::to_string_pretty(&views)?);
        println!("{}", serde_json::to_string_pretty(&summary)?);
        Ok(())
    }

    async fn history(&self, limit: usize) -> anyhow::Result<()> {
        let orders = self.ledger.history(limit).await?;
        println!("{}", serde_json::to_string_pretty(&orders)?);
        Ok(())
    }

    async fn trades(&self, order_id: &str) -> anyhow::Result<()> {
        let trades = self.ledger.trades(order_id).await?;
        println!("{}", serde_json::to_string_pretty(&trades)?);
        Ok(())
    }

    async fn reconcile(&self, order_id: &str) -> anyhow::Result<()> {
        let record = self.reconciler.reconcile(order_id).await?;
        println!("{}", serde_json::to_string_pretty(&record)?);
        Ok(())
    }

    async fn stats(&self, days: i64) -> anyhow::Result<()> {
        let summary = self.reconciler.total_pnl(days).await?;
        println!("{}", serde_json::to_string_pretty(&summary)?);
        Ok(())
    }

    async fn symbols(&self) -> anyhow::Result<()> {
        let entries = self.store.list_enabled_symbols().await?;
        if entries.is_empty() {
            println!("no allowlist configured, all symbols with rates are tradable");
            return Ok(());
        }
        println!("{}", serde_json::to_string_pretty(&entries)?);
        Ok(())
    }

    async fn set_symbol(&self, symbol: &str, enabled: bool) -> anyhow::Result<()> {
        self.store
            .upsert_symbol(&SymbolEntry {
                symbol: symbol.to_uppercase(),
                lighter_symbol: None,
                binance_symbol: None,
                enabled,
                max_leverage_lighter: None,
                max_leverage_binance: None,
                min_order_size: None,
            })
            .await?;
        println!("{} {}", symbol.to_uppercase(), if enabled { "enabled" } else { "disabled" });
        Ok(())
    }
}

/// Pushes periodic rate and position snapshots to broadcast subscribers.
async fn publish_snapshots(
    feed: Arc<RateFeed>,
    ledger: Arc<PositionLedger>,
    events: broadcast::Sender<WsMessage>,
    interval: Duration,
    token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let _ = events.send(WsMessage::Rates(feed.all_rate_diffs().await));
        match ledger.snapshots().await {
            Ok(snapshots) => {
                let _ = events.send(WsMessage::Positions(snapshots));
            }
            Err(e) => warn!(error = %e, "position snapshot failed"),
        }
    }
}
