//! Cron expression handling.

use std::str::FromStr;

use cron::Schedule;

/// Parse a cron expression, auto-prepending "0 " for 5-field expressions.
///
/// The `cron` crate requires 6 fields (sec min hr dom mon dow), but source
/// configs typically carry 5-field cron (min hr dom mon dow). We detect
/// the field count and adapt.
pub fn parse_cron(expr: &str) -> Result<Schedule, cron::error::Error> {
    let parts: Vec<&str> = expr.split_whitespace().collect();
    if parts.len() == 5 {
        let six_field = format!("0 {}", expr);
        Schedule::from_str(&six_field)
    } else {
        Schedule::from_str(expr)
    }
}

// ── Tests ────────────────────────────────────────────────────────────
