// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Daily balance refill on a cron schedule.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use croner::Cron;
use parley_core::ParleyError;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::pipeline::MeteringPipeline;

/// Runs [`MeteringPipeline::refill_now`] at every occurrence of a cron
/// expression (UTC) until cancelled.
pub struct RefillScheduler {
    pipeline: Arc<MeteringPipeline>,
    cron: Cron,
}

impl RefillScheduler {
    pub fn new(pipeline: Arc<MeteringPipeline>, schedule: &str) -> Result<Self, ParleyError> {
        let cron = schedule
            .parse::<Cron>()
            .map_err(|e| ParleyError::Config(format!("invalid refill schedule `{schedule}`: {e}")))?;
        Ok(Self { pipeline, cron })
    }

    /// Next run strictly after `now`.
    pub fn next_run(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.cron.iter_after(now).next()
    }

    pub async fn run(self, cancel: CancellationToken) {
        loop {
            let now = Utc::now();
            let Some(next) = self.next_run(now) else {
                error!("refill schedule has no future occurrence, scheduler stopped");
                return;
            };
            let wait = (next - now).to_std().unwrap_or_default();
            info!(next = %next, "next balance refill scheduled");

            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    match self.pipeline.refill_now().await {
                        Ok(count) => info!(count, "scheduled refill completed"),
                        Err(e) => error!(error = %e, "scheduled refill failed"),
                    }
                }
                _ = cancel.cancelled() => {
                    info!("refill scheduler stopped");
                    return;
                }
            }
        }
    }
}
