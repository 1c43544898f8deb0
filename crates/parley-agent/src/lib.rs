// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Agent loop and usage-metered session management for Parley.
//!
//! The [`AgentLoop`] receives events from a channel adapter and hands each
//! one to the [`MeteringPipeline`] on its own task, so users proceed
//! concurrently while each user's turns are serialized by the
//! [`RequestGate`].

pub mod commands;
pub mod delivery;
pub mod dialogs;
pub mod gate;
pub mod generation;
pub mod notices;
pub mod pipeline;
pub mod refill;
pub mod router;
pub mod shutdown;

use std::sync::Arc;
use std::time::Duration;

use parley_core::{ChannelAdapter, ParleyError, StorageAdapter};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info};

pub use dialogs::DialogStore;
pub use gate::{GatePermit, RequestGate};
pub use generation::Generator;
pub use pipeline::{MeteringPipeline, RejectReason, TurnState};
pub use refill::RefillScheduler;

/// How long shutdown waits for in-flight turns.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Coordinates message flow between the channel and the pipeline.
pub struct AgentLoop {
    channel: Arc<dyn ChannelAdapter>,
    storage: Arc<dyn StorageAdapter>,
    pipeline: Arc<MeteringPipeline>,
    tracker: TaskTracker,
}

impl AgentLoop {
    pub fn new(
        channel: Arc<dyn ChannelAdapter>,
        storage: Arc<dyn StorageAdapter>,
        pipeline: Arc<MeteringPipeline>,
    ) -> Self {
        Self {
            channel,
            storage,
            pipeline,
            tracker: TaskTracker::new(),
        }
    }

    pub fn pipeline(&self) -> &Arc<MeteringPipeline> {
        &self.pipeline
    }

    /// Runs until `cancel` fires or the channel closes, then drains
    /// in-flight turns and closes storage.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), ParleyError> {
        info!("agent loop running");

        loop {
            tokio::select! {
                msg = self.channel.receive() => {
                    match msg {
                        Ok(inbound) => {
                            let pipeline = self.pipeline.clone();
                            self.tracker.spawn(async move { pipeline.handle(inbound).await });
                        }
                        Err(e) => {
                            error!(error = %e, "channel receive error");
                            if e.to_string().contains("closed") {
                                break;
                            }
                        }
                    }
                }
                _ = cancel.cancelled() => {
                    info!("shutdown signal received, stopping agent loop");
                    break;
                }
            }
        }

        shutdown::drain_tasks(&self.tracker, DRAIN_TIMEOUT).await;
        self.storage.close().await?;

        info!("agent loop stopped");
        Ok(())
    }
}
