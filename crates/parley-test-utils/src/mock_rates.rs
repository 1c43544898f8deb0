// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock FX rate source.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use parley_core::types::FxQuote;
use parley_core::{ParleyError, RateSource};

/// Returns a fixed rate stamped with the current time, or always fails.
pub struct MockRateSource {
    rate: Option<f64>,
    calls: AtomicUsize,
}

impl MockRateSource {
    pub fn new(rate: f64) -> Self {
        Self {
            rate: Some(rate),
            calls: AtomicUsize::new(0),
        }
    }

    /// A source whose every lookup fails.
    pub fn failing() -> Self {
        Self {
            rate: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RateSource for MockRateSource {
    async fn current_rate(&self) -> Result<FxQuote, ParleyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.rate {
            Some(rate) => Ok(FxQuote {
                rate,
                as_of: Utc::now(),
            }),
            None => Err(ParleyError::Internal("rate source: mock outage".into())),
        }
    }
}
