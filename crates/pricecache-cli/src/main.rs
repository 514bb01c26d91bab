//! A command line interface to a price cache.
//!
//! Prices come from a simulated price service that is configured in the `service` section of the
//! configuration file. Every command prints the looked up prices and how long the lookup took,
//! which makes cache hits and expiry visible.

use std::sync::Arc;

use anyhow::{Context, Result};
use pricecache::{StaticPriceService, TransparentCache, logging};
use tokio::time::Instant;

use output::{Report, ReplayRound};
use settings::{Command, Settings};

mod output;
mod settings;

fn main() {
    match execute() {
        Ok(true) => std::process::exit(0),
        Ok(false) => std::process::exit(1),
        Err(error) => {
            logging::ensure_log_error(&error);
            std::process::exit(1);
        }
    }
}

/// Runs the command, returns whether it succeeded.
fn execute() -> Result<bool> {
    let settings = Settings::get()?;
    let config = &settings.config.config;

    let _sentry = sentry::init(sentry::ClientOptions {
        dsn: config.sentry_dsn.clone(),
        release: sentry::release_name!(),
        ..Default::default()
    });

    // SAFETY: No other threads are running yet, the runtime is created below.
    unsafe { logging::init_logging(&config.logging) };

    if let Some(ref statsd) = config.metrics.statsd {
        pricecache::metrics::configure_statsd(
            &config.metrics.prefix,
            statsd.as_str(),
            config.metrics.custom_tags.clone(),
        )?;
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("pricecache-worker")
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    let output_format = settings.output_format;
    let report = runtime.block_on(run(settings))?;
    report.print(output_format)?;

    Ok(!report.is_failure())
}

async fn run(settings: Settings) -> Result<Report> {
    let Settings {
        command, config, ..
    } = settings;

    let service = Arc::new(StaticPriceService::from_prices(
        config.service.latency,
        config.service.prices,
    ));
    let cache = TransparentCache::new(Arc::clone(&service), config.config.cache);
    tracing::debug!(?cache, "created price cache");

    let report = match command {
        Command::Price { item_code } => {
            let start = Instant::now();
            let result = cache.get_price(item_code.as_str()).await;
            Report::Price {
                item_code,
                result,
                elapsed: start.elapsed(),
            }
        }
        Command::Prices {
            item_codes,
            detailed: true,
            ..
        } => {
            let start = Instant::now();
            let lookups = cache.get_prices_detailed(item_codes).await;
            Report::Lookups {
                lookups,
                elapsed: start.elapsed(),
            }
        }
        Command::Prices {
            item_codes,
            strict: true,
            ..
        } => {
            let requested = item_codes.len();
            let start = Instant::now();
            let prices = cache
                .try_get_prices(item_codes)
                .await
                .context("failed to look up all prices")?;
            Report::Prices {
                requested,
                prices,
                elapsed: start.elapsed(),
            }
        }
        Command::Prices { item_codes, .. } => {
            let requested = item_codes.len();
            let start = Instant::now();
            let prices = cache.get_prices(item_codes).await?;
            Report::Prices {
                requested,
                prices,
                elapsed: start.elapsed(),
            }
        }
        Command::Replay {
            item_codes,
            rounds,
            interval,
        } => {
            let mut replayed = Vec::with_capacity(rounds);
            for round in 1..=rounds {
                if round > 1 {
                    tokio::time::sleep(interval).await;
                }

                let calls_before = service.calls();
                let start = Instant::now();
                let prices = cache.get_prices(item_codes.iter().cloned()).await?;
                let elapsed = start.elapsed();
                let service_calls = service.calls() - calls_before;

                tracing::info!(round, service_calls, ?elapsed, "replayed lookups");
                replayed.push(ReplayRound {
                    round,
                    prices,
                    elapsed,
                    service_calls,
                });
            }
            Report::Replay { rounds: replayed }
        }
    };

    Ok(report)
}
