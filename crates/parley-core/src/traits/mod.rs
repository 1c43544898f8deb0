// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions.
//!
//! Channel, provider, and storage adapters extend [`PluginAdapter`] and use
//! `#[async_trait]` so they can be held as trait objects.

pub mod adapter;
pub mod channel;
pub mod provider;
pub mod rates;
pub mod storage;

pub use adapter::PluginAdapter;
pub use channel::ChannelAdapter;
pub use provider::{ChunkStream, ProviderAdapter};
pub use rates::RateSource;
pub use storage::StorageAdapter;
