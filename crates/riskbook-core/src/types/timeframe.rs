//! Strategy timeframes.
//!
//! A position carries the timeframe of the strategy that opened it; trigger
//! thresholds (trailing activation, ladder levels) are configured per timeframe.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Timeframe of the strategy that opened a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    Minute1,
    #[serde(rename = "5m")]
    Minute5,
    #[serde(rename = "15m")]
    Minute15,
    #[serde(rename = "30m")]
    Minute30,
    #[serde(rename = "1h")]
    #[default]
    Hour1,
    #[serde(rename = "4h")]
    Hour4,
    #[serde(rename = "1d")]
    Daily,
}

const KEYS: [(Timeframe, &str); 7] = [
    (Timeframe::Minute1, "1m"),
    (Timeframe::Minute5, "5m"),
    (Timeframe::Minute15, "15m"),
    (Timeframe::Minute30, "30m"),
    (Timeframe::Hour1, "1h"),
    (Timeframe::Hour4, "4h"),
    (Timeframe::Daily, "1d"),
];

impl Timeframe {
    /// Configuration key, e.g. `"15m"`.
    pub fn key(&self) -> &'static str {
        KEYS.iter()
            .find(|(tf, _)| tf == self)
            .map(|(_, key)| *key)
            .unwrap_or("1h")
    }

    pub fn all() -> impl Iterator<Item = Timeframe> {
        KEYS.iter().map(|(tf, _)| *tf)
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_lowercase();
        KEYS.iter()
            .find(|(_, k)| *k == key)
            .map(|(tf, _)| *tf)
            .ok_or_else(|| format!("Unknown timeframe '{}', expected one of 1m, 5m, 15m, 30m, 1h, 4h, 1d", s))
    }
}
