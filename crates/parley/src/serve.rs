// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `parley serve` command implementation.
//!
//! Wires SQLite storage, the OpenAI provider, the CBR rate source and the
//! Telegram channel into the metering pipeline, starts the daily refill
//! scheduler and runs the agent loop until a shutdown signal.

use std::sync::Arc;

use parley_agent::{AgentLoop, MeteringPipeline, RefillScheduler, shutdown};
use parley_config::ParleyConfig;
use parley_core::{
    ChannelAdapter, ParleyError, PluginAdapter, ProviderAdapter, RateSource, StorageAdapter,
};
use parley_cost::CbrRateSource;
use parley_openai::OpenAiProvider;
use parley_storage::SqliteStorage;
use parley_telegram::TelegramChannel;
use tracing::{info, warn};

pub async fn run_serve(config: ParleyConfig) -> Result<(), ParleyError> {
    init_tracing(&config.agent.log_level);

    info!(name = %config.agent.name, "starting parley serve");

    let config = Arc::new(config);

    let storage = {
        let storage = SqliteStorage::new(config.storage.clone());
        storage.initialize().await?;
        Arc::new(storage)
    };
    info!(path = %config.storage.database_path, "storage ready");

    let provider = Arc::new(OpenAiProvider::new(&config.openai)?);
    let rates = Arc::new(CbrRateSource::new(config.billing.rate_source_url.clone())?);

    let mut telegram = TelegramChannel::new(
        config.telegram.clone(),
        config.billing.package.payload.clone(),
    )?;
    telegram.connect().await?;
    if !telegram.capabilities().supports_payments {
        warn!("telegram.payment_provider_token not set, /buy is disabled");
    }
    let channel = Arc::new(telegram);

    let pipeline = Arc::new(MeteringPipeline::new(
        config.clone(),
        storage.clone() as Arc<dyn StorageAdapter>,
        channel.clone() as Arc<dyn ChannelAdapter>,
        provider as Arc<dyn ProviderAdapter>,
        rates as Arc<dyn RateSource>,
    ));

    let cancel = shutdown::install_signal_handler();

    let scheduler = RefillScheduler::new(pipeline.clone(), &config.billing.refill_schedule)?;
    {
        let cancel = cancel.clone();
        tokio::spawn(async move { scheduler.run(cancel).await });
    }
    info!(
        schedule = %config.billing.refill_schedule,
        floor = config.billing.refill_floor,
        "refill scheduler started"
    );

    let agent_loop = AgentLoop::new(
        channel.clone() as Arc<dyn ChannelAdapter>,
        storage as Arc<dyn StorageAdapter>,
        pipeline,
    );
    agent_loop.run(cancel).await?;

    if let Err(e) = channel.shutdown().await {
        warn!(error = %e, "telegram channel shutdown failed");
    }

    info!("parley serve shutdown complete");
    Ok(())
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("parley={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
