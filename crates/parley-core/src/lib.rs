// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Parley bot.
//!
//! Holds the error type, the domain model (users, dialogs, turns, personas,
//! generation events) and the adapter traits the metering core is written
//! against. Concrete adapters live in their own crates.

pub mod error;
pub mod traits;
pub mod types;

pub use error::ParleyError;
pub use types::{AdapterType, HealthStatus, MessageId};

pub use traits::{
    ChannelAdapter, ChunkStream, PluginAdapter, ProviderAdapter, RateSource, StorageAdapter,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapter_type_round_trips_through_strings() {
        use std::str::FromStr;

        for variant in [
            AdapterType::Channel,
            AdapterType::Provider,
            AdapterType::Storage,
            AdapterType::RateSource,
        ] {
            let parsed = AdapterType::from_str(&variant.to_string()).expect("should parse back");
            assert_eq!(variant, parsed);
        }
    }

    #[test]
    fn all_traits_are_object_safe() {
        fn _channel(_: &dyn ChannelAdapter) {}
        fn _provider(_: &dyn ProviderAdapter) {}
        fn _storage(_: &dyn StorageAdapter) {}
        fn _rates(_: &dyn RateSource) {}
    }
}
