// Numeric helpers shared by the scoring stages

use chrono::{DateTime, Utc};

/// Exponential decay that holds at 1.0 for `grace` units, then falls with time constant `tau`
pub fn decay_after_grace(elapsed: f64, grace: f64, tau: f64) -> f64 {
    if elapsed <= grace {
        1.0
    } else {
        (-(elapsed - grace) / tau).exp().max(0.0)
    }
}

/// Map a non-negative volume onto [0, 1): `x / (x + half)`; `half` is where the result is 0.5
pub fn saturate(value: f64, half: f64) -> f64 {
    if value <= 0.0 {
        0.0
    } else {
        value / (value + half)
    }
}

/// Fraction of `cap` reached by `value`, clamped to [0, 1]
pub fn capped_ratio(value: f64, cap: f64) -> f64 {
    if cap <= 0.0 || value <= 0.0 {
        0.0
    } else {
        (value / cap).min(1.0)
    }
}

/// Fractional days between two instants, never negative
pub fn days_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> f64 {
    ((later - earlier).num_seconds().max(0) as f64) / 86_400.0
}

/// Fractional hours between two instants, never negative
pub fn hours_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> f64 {
    ((later - earlier).num_seconds().max(0) as f64) / 3_600.0
}
