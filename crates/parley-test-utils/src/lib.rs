// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Parley integration tests.
//!
//! Provides mock adapters and a harness that wires the full metering
//! pipeline over a temporary SQLite database.
//!
//! # Components
//!
//! - [`MockProvider`] - Generation provider with queued replies and a hold switch
//! - [`MockChannel`] - Messaging channel with message injection and capture
//! - [`MockRateSource`] - Fixed or failing FX rate source
//! - [`TestHarness`] - Full pipeline over mocks and a temp database

pub mod harness;
pub mod mock_channel;
pub mod mock_provider;
pub mod mock_rates;

pub use harness::TestHarness;
pub use mock_channel::MockChannel;
pub use mock_provider::MockProvider;
pub use mock_rates::MockRateSource;
