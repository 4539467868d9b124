//! Jitter helpers for exponential backoff.

use rand::Rng;

/// A random offset up to `percent`% of `base`, used to spread out
/// simultaneous retries (the "thundering herd" case where many sources
/// fail at once and would otherwise all retry on the same tick).
pub fn jitter_delay(base: u64, percent: u8) -> u64 {
    if base == 0 {
        return 0;
    }
    let max_jitter = (base * percent as u64) / 100;
    if max_jitter == 0 {
        return 0;
    }
    rand::rng().random_range(0..=max_jitter)
}
