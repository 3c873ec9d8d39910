use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use onair::{
    cache_store::{CacheStore, RedisCacheStore},
    config::{Config, parse_duration},
    live_status::{AttemptTracker, LiveStatusRefresher, RefresherSettings, TrackerSettings},
    notifications::{LogNotificationSink, NotificationSink, WebhookNotificationSink},
    schedule::{BlockTtlCalculator, CalculatorSettings, OverrideService, OverrideSettings},
    sources::{HttpScheduleSource, VideoPlatformClient, VideoPlatformSettings},
    utils::local_now,
};

#[derive(Parser)]
#[command(name = "onair")]
#[command(version)]
#[command(about = "Live-status caching and schedule-override resolution engine")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("onair={}", cli.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting onair v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load_from_file(&cli.config)?;
    info!("Configuration loaded from: {}", cli.config);
    let tz = config.timezone()?;

    let store: Arc<dyn CacheStore> = Arc::new(
        RedisCacheStore::new(&config.store)
            .await
            .context("Failed to connect to the cache store")?,
    );

    let http = reqwest::Client::new();
    let source = Arc::new(HttpScheduleSource::new(
        http.clone(),
        &config.schedule.source_url,
    ));
    let provider = Arc::new(VideoPlatformClient::new(VideoPlatformSettings {
        api_url: config.provider.api_url.clone(),
        api_key: config.provider.api_key.clone(),
        batch_size: config.provider.batch_size,
        timeout: parse_duration("provider.timeout", &config.provider.timeout)?,
    })?);

    let overrides = Arc::new(OverrideService::new(
        Arc::clone(&store),
        source.clone(),
        OverrideSettings {
            resolved_cache_ttl: parse_duration(
                "overrides.resolved_cache_ttl",
                &config.overrides.resolved_cache_ttl,
            )?,
        },
        tz,
    ));

    let calculator = Arc::new(BlockTtlCalculator::new(CalculatorSettings {
        merge_gap: chrono_duration("schedule.block_merge_gap", &config.schedule.block_merge_gap)?,
        min_fallback_ttl: chrono_duration(
            "schedule.min_fallback_ttl",
            &config.schedule.min_fallback_ttl,
        )?,
        warn_cooldown: chrono_duration(
            "schedule.anomaly_warn_cooldown",
            &config.schedule.anomaly_warn_cooldown,
        )?,
    }));

    let tracker = Arc::new(AttemptTracker::new(
        Arc::clone(&store),
        TrackerSettings {
            suppression_window: parse_duration(
                "tracker.suppression_window",
                &config.tracker.suppression_window,
            )?,
            record_ttl_cap: parse_duration("tracker.record_ttl_cap", &config.tracker.record_ttl_cap)?,
            escalation_threshold: config.tracker.escalation_threshold,
        },
    ));

    let sink: Arc<dyn NotificationSink> = match &config.notifications.webhook_url {
        Some(url) => {
            info!("Notifications will be delivered to {}", url);
            Arc::new(WebhookNotificationSink::new(http.clone(), url))
        }
        None => Arc::new(LogNotificationSink),
    };

    let (refresher, _handle, queue_rx) = LiveStatusRefresher::new(
        Arc::clone(&store),
        source,
        provider,
        Arc::clone(&overrides),
        calculator,
        tracker,
        sink,
        RefresherSettings {
            primary_interval: parse_duration(
                "refresh.primary_interval",
                &config.refresh.primary_interval,
            )?,
            fixup_interval: parse_duration("refresh.fixup_interval", &config.refresh.fixup_interval)?,
            lock_ttl: parse_duration("refresh.lock_ttl", &config.refresh.lock_ttl)?,
            not_live_ttl: parse_duration("refresh.not_live_ttl", &config.refresh.not_live_ttl)?,
            refresh_threshold_percent: config.refresh.refresh_threshold_percent,
            validation_cooldown: parse_duration(
                "refresh.validation_cooldown",
                &config.refresh.validation_cooldown,
            )?,
            queue_capacity: config.refresh.queue_capacity,
        },
        tz,
    );

    let cancel = CancellationToken::new();

    let refresher_task = tokio::spawn(refresher.run(queue_rx, cancel.clone()));
    let cleanup_task = tokio::spawn(cleanup_loop(
        Arc::clone(&overrides),
        parse_duration("overrides.cleanup_interval", &config.overrides.cleanup_interval)?,
        tz,
        cancel.clone(),
    ));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received");
    cancel.cancel();

    let _ = refresher_task.await;
    let _ = cleanup_task.await;
    info!("Shutdown complete");
    Ok(())
}

/// Hourly sweep deleting overrides past their week boundary
async fn cleanup_loop(
    overrides: Arc<OverrideService>,
    interval: std::time::Duration,
    tz: chrono_tz::Tz,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let today = local_now(tz).date();
                if let Err(e) = overrides.cleanup_expired(today).await {
                    warn!("Override cleanup sweep failed: {}", e);
                }
            }
        }
    }
}

fn chrono_duration(field: &str, value: &str) -> Result<chrono::Duration> {
    let std = parse_duration(field, value)?;
    chrono::Duration::from_std(std)
        .map_err(|e| anyhow::anyhow!("Duration for {} out of range: {}", field, e))
}
