// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sliding-window rate limiting.
//!
//! Each key (client IP or tenant) owns an ordered list of accepted
//! request timestamps trimmed to the window. A request over the limit is
//! rejected without being recorded, so a rejected burst does not extend
//! its own penalty.

use std::collections::HashMap;

/// Per-key request history.
#[derive(Debug, Default)]
pub struct RateHistory {
    windows: HashMap<String, Vec<u64>>,
}

impl RateHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check and record one request at `now_ms`.
    ///
    /// Returns `true` when the request is admitted (and recorded). A
    /// `max` of zero disables the limit for this key class.
    pub fn allow(&mut self, key: &str, now_ms: u64, window_ms: u64, max: u32) -> bool {
        if max == 0 {
            return true;
        }

        let samples = self.windows.entry(key.to_string()).or_default();
        let floor = now_ms.saturating_sub(window_ms);
        samples.retain(|&ts| ts > floor);

        if samples.len() >= max as usize {
            return false;
        }
        samples.push(now_ms);
        true
    }

    /// Accepted samples currently inside the window for a key.
    pub fn count(&self, key: &str, now_ms: u64, window_ms: u64) -> usize {
        let floor = now_ms.saturating_sub(window_ms);
        self.windows
            .get(key)
            .map(|samples| samples.iter().filter(|&&ts| ts > floor).count())
            .unwrap_or(0)
    }

    /// Drop keys whose samples have all aged out, bounding memory.
    pub fn prune(&mut self, now_ms: u64, window_ms: u64) {
        let floor = now_ms.saturating_sub(window_ms);
        self.windows.retain(|_, samples| {
            samples.retain(|&ts| ts > floor);
            !samples.is_empty()
        });
    }
}

#[cfg(test)]
#[path = "rate_limit_tests.rs"]
mod tests;
