//! Basis Bot - Headless Server
//!
//! Streams spot and perpetual prices from Binance, Bybit and Gate.io and
//! alerts on wide spot/futures gaps over Telegram.

mod checker;
mod config;

use checker::{AlertChecker, SharedSettings};
use clap::Parser;
use config::AppConfig;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use basis_alerts::{
    format_deviation_report, format_mute_list, format_status, AlertEvaluator, JsonFileStore,
    MuteRegistry, Notifier, Settings, SettingsStore, SystemClock, TelegramSender,
    REPORT_PER_EXCHANGE_LIMIT,
};
use basis_core::{Exchange, MarketKind};
use basis_engine::DeviationEngine;
use basis_feeds::{FeedConfig, FeedSupervisor, PriceCache};

/// Basis Bot CLI
#[derive(Parser, Debug)]
#[command(name = "basis-bot")]
#[command(about = "Spot/futures deviation monitor with Telegram alerts", long_about = None)]
struct Args {
    /// Directory for settings.json and muted_coins.json
    #[arg(short, long, default_value = "data")]
    data_dir: PathBuf,

    /// Log level: trace, debug, info, warn, error
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Seconds to wait for feeds to close on shutdown
    #[arg(long, default_value_t = 5)]
    grace_secs: u64,

    /// Seconds between reconnect attempts of a feed
    #[arg(long, default_value_t = 5)]
    backoff_secs: u64,

    /// Chat id to register for alerts (repeatable)
    #[arg(long = "chat-id", allow_negative_numbers = true)]
    chat_ids: Vec<i64>,

    /// Seconds between status log lines
    #[arg(long, default_value_t = 300)]
    status_secs: u64,
}

fn init_logging(level: &str) {
    let level = match level {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");
}

fn load_settings(store: &JsonFileStore, extra_chats: &[i64]) -> Settings {
    let mut settings = store.load_settings().unwrap_or_else(|e| {
        warn!("Failed to load settings, using defaults: {}", e);
        Settings::default()
    });

    let added = extra_chats
        .iter()
        .filter(|&&chat_id| settings.register_chat(chat_id))
        .count();
    if added > 0 {
        info!("Registered {} new chat ids", added);
        if let Err(e) = store.save_settings(&settings) {
            warn!("Failed to save settings: {}", e);
        }
    }
    settings
}

/// Periodic status lines: feed states and cache sizes, plus the current
/// report at debug level.
async fn run_status_reporter(
    supervisor: Arc<FeedSupervisor>,
    cache: Arc<PriceCache>,
    engine: DeviationEngine,
    mutes: Arc<MuteRegistry>,
    settings: SharedSettings,
    every: Duration,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(every) => {}
        }

        let settings = settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let feeds: Vec<String> = supervisor
            .states()
            .into_iter()
            .map(|(feed, state)| format!("{}={}", feed, state))
            .collect();
        info!("📊 Feeds | {}", feeds.join(" | "));

        let spot_pairs: Vec<(Exchange, usize)> = Exchange::all()
            .iter()
            .map(|&exchange| (exchange, cache.len(exchange, MarketKind::Spot)))
            .collect();
        let muted = mutes.list();
        info!("{}", format_status(&settings, &spot_pairs, muted.len()));

        let all = engine.get_all_deviations(&settings.enabled_exchanges());
        debug!(
            "{}",
            format_deviation_report(&all, settings.threshold_percent, REPORT_PER_EXCHANGE_LIMIT)
        );
        debug!("{}", format_mute_list(&muted));
    }
}

#[tokio::main]
async fn main() {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    init_logging(&args.log_level);

    let config = AppConfig {
        data_dir: args.data_dir.clone(),
        chat_ids: args.chat_ids.clone(),
        shutdown_grace: Duration::from_secs(args.grace_secs),
        feed: FeedConfig {
            reconnect_delay_ms: args.backoff_secs.saturating_mul(1000),
            ..FeedConfig::default()
        },
        ..AppConfig::default()
    }
    .with_env();

    info!("🚀 Basis Bot starting...");
    info!("  Data dir: {}", config.data_dir.display());
    info!("  Reconnect delay: {:?}", config.feed.reconnect_delay());
    info!("  Shutdown grace: {:?}", config.shutdown_grace);

    let store = Arc::new(JsonFileStore::new(&config.data_dir));
    let settings = load_settings(&store, &config.chat_ids);
    info!(
        "  Threshold: {}% | Interval: {}s | Recipients: {}",
        settings.threshold_percent,
        settings.check_interval_seconds,
        settings.chat_ids.len()
    );
    let enabled = settings.enabled_exchanges();
    let settings: SharedSettings = Arc::new(RwLock::new(settings));

    let mutes = Arc::new(MuteRegistry::with_store(Arc::new(SystemClock), store.clone()));
    info!("  Muted coins: {}", mutes.len());

    let notifier = match &config.bot_token {
        Some(token) => {
            info!("  Telegram: enabled");
            Some(Notifier::new(Arc::new(TelegramSender::new(token.clone()))))
        }
        None => {
            info!(
                "  Telegram: disabled ({} not set), alerts are only logged",
                config::BOT_TOKEN_ENV
            );
            None
        }
    };

    let cache = Arc::new(PriceCache::new());
    let supervisor = Arc::new(
        FeedSupervisor::websocket(cache.clone(), enabled, config.feed.clone())
            .with_grace(config.shutdown_grace),
    );
    match supervisor.start() {
        Ok(launched) => info!("📡 Started {} price feeds", launched),
        Err(e) => warn!("Failed to start feeds: {}", e),
    }

    let engine = DeviationEngine::new(cache.clone());
    let cancel = CancellationToken::new();

    let checker = AlertChecker::new(
        engine.clone(),
        AlertEvaluator::new(mutes.clone()),
        notifier,
        settings.clone(),
    );
    let checker_handle = tokio::spawn(checker.run(cancel.clone()));

    let status_handle = tokio::spawn(run_status_reporter(
        supervisor.clone(),
        cache.clone(),
        engine,
        mutes.clone(),
        settings.clone(),
        Duration::from_secs(args.status_secs.max(1)),
        cancel.clone(),
    ));

    // Handle shutdown
    info!("Press Ctrl+C to stop...");

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
    }

    warn!("Shutdown signal received");
    cancel.cancel();

    let _ = tokio::time::timeout(Duration::from_secs(2), checker_handle).await;
    let _ = tokio::time::timeout(Duration::from_secs(1), status_handle).await;
    supervisor.stop().await;

    info!("📈 Final state:");
    for (feed, state) in supervisor.states() {
        info!("  {}: {} ({} restarts)", feed, state, supervisor.restarts(feed));
    }
    info!("👋 Basis Bot stopped");
}
