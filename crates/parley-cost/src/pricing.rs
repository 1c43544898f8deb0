// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! USD price sheet and the token cost of non-chat requests.
//!
//! Chat turns are charged the provider-reported token count. Images cost a
//! fixed number of tokens. Voice transcription is converted from its USD
//! price per minute into the equivalent number of chat tokens.

use parley_config::model::BillingConfig;

/// One row of the `/balance` price table.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceLine {
    pub label: &'static str,
    pub usd: f64,
    pub local: f64,
}

/// Prices in USD, taken from `[billing]`.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSheet {
    chat_per_1000_usd: f64,
    transcription_per_minute_usd: f64,
    image_usd: f64,
    image_cost_tokens: i64,
}

impl PriceSheet {
    pub fn from_config(config: &BillingConfig) -> Self {
        Self {
            chat_per_1000_usd: config.chat_price_per_1000_tokens,
            transcription_per_minute_usd: config.transcription_price_per_minute,
            image_usd: config.image_price,
            image_cost_tokens: config.image_cost_tokens,
        }
    }

    /// Fixed charge for one generated image.
    pub fn image_cost_tokens(&self) -> u64 {
        u64::try_from(self.image_cost_tokens).unwrap_or(0)
    }

    /// Tokens charged for transcribing `duration_secs` of audio.
    ///
    /// `floor(duration * price_per_minute / 60 / (chat_price / 1000))`
    pub fn voice_cost_tokens(&self, duration_secs: u32) -> u64 {
        if self.chat_per_1000_usd <= 0.0 {
            return 0;
        }
        let usd = f64::from(duration_secs) * self.transcription_per_minute_usd / 60.0;
        let tokens = usd / (self.chat_per_1000_usd / 1000.0);
        // Float noise can leave an exact integer just below itself.
        (tokens + 1e-9).floor().max(0.0) as u64
    }

    /// Price table converted at `rate` local units per USD.
    pub fn lines(&self, rate: f64) -> Vec<PriceLine> {
        [
            ("1000 chat tokens", self.chat_per_1000_usd),
            ("1 minute of transcription", self.transcription_per_minute_usd),
            ("1 image", self.image_usd),
        ]
        .into_iter()
        .map(|(label, usd)| PriceLine {
            label,
            usd,
            local: usd * rate,
        })
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sheet() -> PriceSheet {
        PriceSheet::from_config(&BillingConfig::default())
    }

    #[test]
    fn one_minute_of_voice_costs_three_thousand_tokens() {
        // 0.006 USD per minute at 0.002 USD per 1000 tokens.
        assert_eq!(sheet().voice_cost_tokens(60), 3000);
    }

    #[test]
    fn voice_cost_rounds_down() {
        // 7s -> 0.0007 USD -> 350 tokens exactly; 1s -> 50 tokens.
        assert_eq!(sheet().voice_cost_tokens(7), 350);
        assert_eq!(sheet().voice_cost_tokens(1), 50);
        assert_eq!(sheet().voice_cost_tokens(0), 0);
    }

    #[test]
    fn image_cost_comes_from_config() {
        assert_eq!(sheet().image_cost_tokens(), 1000);
    }

    #[test]
    fn price_lines_convert_at_the_given_rate() {
        let lines = sheet().lines(100.0);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].label, "1000 chat tokens");
        assert!((lines[0].local - 0.2).abs() < 1e-9);
        assert!((lines[2].local - 2.0).abs() < 1e-9);
    }
}
