// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Currency rate source trait.

use async_trait::async_trait;

use crate::error::ParleyError;
use crate::types::FxQuote;

/// Supplies the local-currency price of one USD, for display only.
#[async_trait]
pub trait RateSource: Send + Sync + 'static {
    /// Fetches the current rate together with its publication time.
    async fn current_rate(&self) -> Result<FxQuote, ParleyError>;
}
