// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `parley check`: prints what a validated configuration resolves to.

use std::fmt::Write;

use parley_config::ParleyConfig;
use parley_cost::PriceSheet;

pub fn run_check(config: &ParleyConfig) {
    println!("{}", summary(config));
}

fn configured(value: &Option<String>) -> &'static str {
    match value {
        Some(v) if !v.is_empty() => "set",
        _ => "missing",
    }
}

/// Human-readable summary of `config`. Secrets are only reported as set or missing.
pub fn summary(config: &ParleyConfig) -> String {
    let mut out = String::new();
    let billing = &config.billing;

    let _ = writeln!(out, "parley: configuration OK");
    let _ = writeln!(out, "  agent:     {} (log level {})", config.agent.name, config.agent.log_level);
    let _ = writeln!(
        out,
        "  telegram:  bot token {}, payments {}, {} allowed user(s)",
        configured(&config.telegram.bot_token),
        configured(&config.telegram.payment_provider_token),
        match config.telegram.allowed_users.len() {
            0 => "all".to_string(),
            n => n.to_string(),
        }
    );
    let _ = writeln!(
        out,
        "  openai:    {} at {}, context window {}",
        config.openai.chat_model, config.openai.base_url, config.openai.context_window
    );
    let _ = writeln!(out, "  storage:   {}", config.storage.database_path);
    let _ = writeln!(
        out,
        "  dialog:    persona {}, new dialog after {}s idle, streaming {}",
        config.dialog.default_persona,
        config.dialog.new_dialog_timeout_secs,
        if config.dialog.streaming { "on" } else { "off" }
    );
    let _ = writeln!(
        out,
        "  billing:   {} tokens on signup, refill to {} at \"{}\", {} admin(s)",
        billing.initial_balance,
        billing.refill_floor,
        billing.refill_schedule,
        billing.admin_ids.len()
    );
    let _ = writeln!(
        out,
        "  package:   {} tokens for {} minor units of {}",
        billing.package.tokens, billing.package.price_minor, billing.package.currency
    );
    for line in PriceSheet::from_config(billing).lines(billing.fallback_usd_rate) {
        let _ = writeln!(
            out,
            "  price:     {} = ${:.3} ({:.2} at fallback rate)",
            line.label, line.usd, line.local
        );
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_hides_secrets() {
        let mut config = ParleyConfig::default();
        config.telegram.bot_token = Some("123:secret".into());

        let text = summary(&config);
        assert!(text.contains("bot token set"));
        assert!(text.contains("payments missing"));
        assert!(!text.contains("123:secret"));
    }

    #[test]
    fn summary_lists_prices_at_fallback_rate() {
        let config = ParleyConfig::default();
        let text = summary(&config);
        assert!(text.contains("1000 chat tokens = $0.002 (0.15 at fallback rate)"));
        assert!(text.contains("all allowed user(s)"));
        assert!(text.contains("refill to 10000 at \"0 7 * * *\""));
    }
}
