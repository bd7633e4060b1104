// =============================================================================
// Shared types used across the scalp engine
// =============================================================================

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Candle interval as labelled by the exchange.
///
/// Labels are case-sensitive: `1m` is one minute, `1M` is one month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Interval {
    M1,
    M3,
    M5,
    M15,
    M30,
    H1,
    H2,
    H4,
    H6,
    H12,
    D1,
    D3,
    W1,
    Mo1,
}

impl Interval {
    pub const ALL: [Interval; 14] = [
        Self::M1,
        Self::M3,
        Self::M5,
        Self::M15,
        Self::M30,
        Self::H1,
        Self::H2,
        Self::H4,
        Self::H6,
        Self::H12,
        Self::D1,
        Self::D3,
        Self::W1,
        Self::Mo1,
    ];

    /// The exchange label, e.g. `"15m"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::M1 => "1m",
            Self::M3 => "3m",
            Self::M5 => "5m",
            Self::M15 => "15m",
            Self::M30 => "30m",
            Self::H1 => "1h",
            Self::H2 => "2h",
            Self::H4 => "4h",
            Self::H6 => "6h",
            Self::H12 => "12h",
            Self::D1 => "1d",
            Self::D3 => "3d",
            Self::W1 => "1w",
            Self::Mo1 => "1M",
        }
    }
}

impl Default for Interval {
    fn default() -> Self {
        Self::H1
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|iv| iv.as_str() == s)
            .ok_or_else(|| format!("unknown interval: {s}"))
    }
}

impl TryFrom<String> for Interval {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Interval> for String {
    fn from(iv: Interval) -> Self {
        iv.as_str().to_string()
    }
}

/// Identity of one live kline stream: `(symbol, interval)`.
///
/// The symbol is stored upper-cased so `btcusdt` and `BTCUSDT` share a key.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct StreamKey {
    pub symbol: String,
    pub interval: Interval,
}

impl StreamKey {
    pub fn new(symbol: &str, interval: Interval) -> Self {
        Self {
            symbol: symbol.trim().to_uppercase(),
            interval,
        }
    }

    /// Exchange stream name, e.g. `btcusdt@kline_1m`.
    pub fn stream_name(&self) -> String {
        format!("{}@kline_{}", self.symbol.to_lowercase(), self.interval)
    }
}

impl std::fmt::Display for StreamKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.symbol, self.interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_labels_roundtrip() {
        for iv in Interval::ALL {
            assert_eq!(iv.as_str().parse::<Interval>().unwrap(), iv);
        }
    }

    #[test]
    fn minute_and_month_are_distinct() {
        assert_eq!("1m".parse::<Interval>().unwrap(), Interval::M1);
        assert_eq!("1M".parse::<Interval>().unwrap(), Interval::Mo1);
        assert!("2m".parse::<Interval>().is_err());
    }

    #[test]
    fn stream_key_normalises_symbol() {
        let a = StreamKey::new("btcusdt", Interval::M1);
        let b = StreamKey::new("BTCUSDT", Interval::M1);
        assert_eq!(a, b);
        assert_eq!(a.stream_name(), "btcusdt@kline_1m");
        assert_eq!(a.to_string(), "BTCUSDT@1m");
    }

    #[test]
    fn interval_serde_uses_label() {
        let json = serde_json::to_string(&Interval::M15).unwrap();
        assert_eq!(json, "\"15m\"");
        let iv: Interval = serde_json::from_str("\"1w\"").unwrap();
        assert_eq!(iv, Interval::W1);
    }
}
