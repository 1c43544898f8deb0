// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metering for the Parley bot.
//!
//! This crate provides:
//! - **Balance ledger**: admission checks, debits floored at zero, credits, refills
//! - **Price sheet**: USD prices and the token cost of voice and image requests
//! - **Rates**: the central-bank USD rate source and a stale-quote refresher

pub mod ledger;
pub mod pricing;
pub mod rates;

pub use ledger::BalanceLedger;
pub use pricing::{PriceLine, PriceSheet};
pub use rates::{CbrRateSource, RateRefresher};
