use serde::{Deserialize, Serialize};

use crate::error::KlineParseError;
use crate::types::Interval;

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

/// One OHLCV bar. `time` is the bar's open time in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Kline {
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Kline {
    /// Build a bar and check the OHLCV invariants: OHLC finite and strictly
    /// positive, volume finite and non-negative.
    pub fn validated(
        time: i64,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Result<Self, KlineParseError> {
        for (field, value) in [("o", open), ("h", high), ("l", low), ("c", close)] {
            if !value.is_finite() {
                return Err(KlineParseError::NotFinite(field));
            }
            if value <= 0.0 {
                return Err(KlineParseError::NonPositive { field, value });
            }
        }
        if !volume.is_finite() {
            return Err(KlineParseError::NotFinite("v"));
        }
        if volume < 0.0 {
            return Err(KlineParseError::Negative { field: "v", value: volume });
        }

        Ok(Self {
            time,
            open,
            high,
            low,
            close,
            volume,
        })
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }
}

/// A kline decoded from the live stream together with the identity the
/// exchange stamped on it, when present.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamKline {
    pub symbol: Option<String>,
    pub interval: Option<Interval>,
    pub kline: Kline,
}

// ---------------------------------------------------------------------------
// Wire decoding
// ---------------------------------------------------------------------------

/// The exchange sends numeric values as JSON strings inside kline objects;
/// plain numbers are accepted too.
pub(crate) fn parse_number(
    val: Option<&serde_json::Value>,
    field: &'static str,
) -> Result<f64, KlineParseError> {
    match val {
        None | Some(serde_json::Value::Null) => Err(KlineParseError::MissingField(field)),
        Some(serde_json::Value::String(s)) => {
            s.trim()
                .parse::<f64>()
                .map_err(|_| KlineParseError::NotNumeric {
                    field,
                    raw: s.clone(),
                })
        }
        Some(serde_json::Value::Number(n)) => n.as_f64().ok_or(KlineParseError::NotNumeric {
            field,
            raw: n.to_string(),
        }),
        Some(other) => Err(KlineParseError::NotNumeric {
            field,
            raw: other.to_string(),
        }),
    }
}

/// Open time in milliseconds, as an integer or an integral string.
fn parse_open_time_ms(
    val: Option<&serde_json::Value>,
    field: &'static str,
) -> Result<i64, KlineParseError> {
    match val {
        None | Some(serde_json::Value::Null) => Err(KlineParseError::MissingField(field)),
        Some(serde_json::Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
            .ok_or(KlineParseError::NotNumeric {
                field,
                raw: n.to_string(),
            }),
        Some(serde_json::Value::String(s)) => {
            s.trim()
                .parse::<i64>()
                .map_err(|_| KlineParseError::NotNumeric {
                    field,
                    raw: s.clone(),
                })
        }
        Some(other) => Err(KlineParseError::NotNumeric {
            field,
            raw: other.to_string(),
        }),
    }
}

/// Parse one live-stream text frame.
///
/// Accepts both the single-stream payload and the combined-stream envelope:
/// ```json
/// { "e": "kline", "s": "BTCUSDT", "k": { "t": 1700000000000, "i": "1m", "o": "…", … } }
/// { "stream": "btcusdt@kline_1m", "data": { "s": "BTCUSDT", "k": { … } } }
/// ```
pub fn parse_stream_message(text: &str) -> Result<StreamKline, KlineParseError> {
    let root: serde_json::Value =
        serde_json::from_str(text).map_err(|e| KlineParseError::InvalidJson(e.to_string()))?;

    let data = root.get("data").unwrap_or(&root);
    let k = data.get("k").ok_or(KlineParseError::MissingField("k"))?;
    if !k.is_object() {
        return Err(KlineParseError::MissingField("k"));
    }

    let time_ms = parse_open_time_ms(k.get("t"), "k.t")?;
    let kline = Kline::validated(
        time_ms / 1000,
        parse_number(k.get("o"), "k.o")?,
        parse_number(k.get("h"), "k.h")?,
        parse_number(k.get("l"), "k.l")?,
        parse_number(k.get("c"), "k.c")?,
        parse_number(k.get("v"), "k.v")?,
    )?;

    let symbol = data
        .get("s")
        .and_then(|v| v.as_str())
        .map(|s| s.to_uppercase());
    let interval = k
        .get("i")
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse::<Interval>().ok());

    Ok(StreamKline {
        symbol,
        interval,
        kline,
    })
}

/// Parse one row of the REST klines response:
/// `[openTimeMs, open, high, low, close, volume, closeTime, …]`.
pub fn parse_rest_row(row: &serde_json::Value) -> Result<Kline, KlineParseError> {
    let arr = row.as_array().ok_or(KlineParseError::MissingField("row"))?;

    let time_ms = parse_open_time_ms(arr.first(), "[0] openTime")?;
    Kline::validated(
        time_ms / 1000,
        parse_number(arr.get(1), "[1] open")?,
        parse_number(arr.get(2), "[2] high")?,
        parse_number(arr.get(3), "[3] low")?,
        parse_number(arr.get(4), "[4] close")?,
        parse_number(arr.get(5), "[5] volume")?,
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(o: &str, h: &str, l: &str, c: &str, v: &str) -> String {
        format!(
            r#"{{"e":"kline","s":"BTCUSDT","k":{{"t":1700000040000,"T":1700000099999,"i":"1m","o":{o},"h":{h},"l":{l},"c":{c},"v":{v},"x":false}}}}"#
        )
    }

    #[test]
    fn parse_single_stream_payload() {
        let msg = parse_stream_message(&frame(
            "\"37000.00\"",
            "\"37050.00\"",
            "\"36990.00\"",
            "\"37020.00\"",
            "\"123.456\"",
        ))
        .expect("should parse");
        assert_eq!(msg.symbol.as_deref(), Some("BTCUSDT"));
        assert_eq!(msg.interval, Some(Interval::M1));
        assert_eq!(msg.kline.time, 1_700_000_040);
        assert!((msg.kline.close - 37020.0).abs() < f64::EPSILON);
        assert!((msg.kline.volume - 123.456).abs() < 1e-12);
    }

    #[test]
    fn parse_combined_envelope() {
        let json = r#"{
            "stream": "ethusdt@kline_5m",
            "data": {
                "e": "kline",
                "s": "ETHUSDT",
                "k": { "t": 1700000100000, "i": "5m",
                       "o": "2000.1", "h": "2010.0", "l": "1990.5", "c": "2005.2", "v": "10" }
            }
        }"#;
        let msg = parse_stream_message(json).expect("should parse");
        assert_eq!(msg.symbol.as_deref(), Some("ETHUSDT"));
        assert_eq!(msg.interval, Some(Interval::M5));
        assert_eq!(msg.kline.time, 1_700_000_100);
    }

    #[test]
    fn rejects_missing_field() {
        let json = r#"{"k":{"t":1,"o":"1","h":"1","l":"1","v":"1"}}"#;
        assert_eq!(
            parse_stream_message(json),
            Err(KlineParseError::MissingField("k.c"))
        );
    }

    #[test]
    fn rejects_non_numeric_and_nan() {
        let bad = frame("\"abc\"", "\"2\"", "\"1\"", "\"1.5\"", "\"1\"");
        assert!(matches!(
            parse_stream_message(&bad),
            Err(KlineParseError::NotNumeric { field: "k.o", .. })
        ));

        let nan = frame("\"NaN\"", "\"2\"", "\"1\"", "\"1.5\"", "\"1\"");
        assert_eq!(
            parse_stream_message(&nan),
            Err(KlineParseError::NotFinite("o"))
        );
    }

    #[test]
    fn rejects_non_positive_ohlc() {
        let zero_low = frame("\"1\"", "\"2\"", "\"0\"", "\"1.5\"", "\"1\"");
        assert!(matches!(
            parse_stream_message(&zero_low),
            Err(KlineParseError::NonPositive { field: "l", .. })
        ));
    }

    #[test]
    fn rejects_garbage_and_non_kline_events() {
        assert!(matches!(
            parse_stream_message("not json"),
            Err(KlineParseError::InvalidJson(_))
        ));
        assert_eq!(
            parse_stream_message(r#"{"result":null,"id":1}"#),
            Err(KlineParseError::MissingField("k"))
        );
    }

    #[test]
    fn parse_rest_row_converts_ms_to_seconds() {
        let row: serde_json::Value = serde_json::from_str(
            r#"[1700000000000,"100.0","101.5","99.5","100.7","12.5",1700000059999,"0",10,"0","0","0"]"#,
        )
        .unwrap();
        let k = parse_rest_row(&row).unwrap();
        assert_eq!(k.time, 1_700_000_000);
        assert!((k.open - 100.0).abs() < f64::EPSILON);
        assert!((k.high - 101.5).abs() < f64::EPSILON);
        assert!((k.low - 99.5).abs() < f64::EPSILON);
        assert!((k.close - 100.7).abs() < f64::EPSILON);
        assert!((k.volume - 12.5).abs() < f64::EPSILON);
    }

    #[test]
    fn parse_rest_row_rejects_short_rows() {
        let row: serde_json::Value = serde_json::from_str(r#"[1700000000000,"1","2"]"#).unwrap();
        assert!(parse_rest_row(&row).is_err());
    }
}
