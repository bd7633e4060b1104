// =============================================================================
// Binance REST Client: public market data only
// =============================================================================
//
// Two endpoints, both unauthenticated:
//   GET /api/v3/klines       historical bars for the bootstrap
//   GET /api/v3/ticker/24hr  24h tickers, used to rank USDT pairs by volume
//
// `try_*` methods return the typed `FeedError`. The plain methods never fail:
// history degrades to an empty Vec and symbol discovery to a fixed fallback
// list, with the reason logged.
// =============================================================================

use std::time::Duration;

use tracing::{debug, instrument, warn};

use crate::error::FeedError;
use crate::market_data::{kline::parse_number, parse_rest_row, Kline};
use crate::types::Interval;

pub const DEFAULT_REST_BASE_URL: &str = "https://api.binance.com";
pub const DEFAULT_SYMBOL_LIMIT: usize = 50;

/// Returned by [`MarketDataClient::fetch_popular_symbols`] when the ticker
/// endpoint is unavailable.
pub const FALLBACK_SYMBOLS: [&str; 5] = ["BTCUSDT", "ETHUSDT", "BNBUSDT", "SOLUSDT", "XRPUSDT"];

#[derive(Debug, Clone)]
pub struct MarketDataClient {
    base_url: String,
    client: reqwest::Client,
}

impl MarketDataClient {
    // -------------------------------------------------------------------------
    // Construction
    // -------------------------------------------------------------------------

    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, FeedError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();

        debug!(base_url = %base_url, "MarketDataClient initialised");

        Ok(Self { base_url, client })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // -------------------------------------------------------------------------
    // Historical klines
    // -------------------------------------------------------------------------

    /// GET /api/v3/klines, oldest bar first.
    ///
    /// Rows that fail validation are skipped individually; the rest of the
    /// response is kept.
    #[instrument(skip(self), name = "binance::fetch_history")]
    pub async fn try_fetch_history(
        &self,
        symbol: &str,
        interval: Interval,
        limit: u32,
    ) -> Result<Vec<Kline>, FeedError> {
        let url = format!(
            "{}/api/v3/klines?symbol={}&interval={}&limit={}",
            self.base_url,
            symbol.to_uppercase(),
            interval,
            limit
        );

        let body = self.get_json(&url).await?;
        let rows = body
            .as_array()
            .ok_or_else(|| FeedError::Decode("klines response is not an array".to_string()))?;

        let mut bars = Vec::with_capacity(rows.len());
        for (idx, row) in rows.iter().enumerate() {
            match parse_rest_row(row) {
                Ok(bar) => bars.push(bar),
                Err(e) => warn!(symbol, idx, error = %e, "skipping malformed kline row"),
            }
        }

        debug!(symbol, %interval, count = bars.len(), "klines fetched");
        Ok(bars)
    }

    /// Like [`try_fetch_history`](Self::try_fetch_history) but any failure
    /// yields an empty history.
    pub async fn fetch_history(&self, symbol: &str, interval: Interval, limit: u32) -> Vec<Kline> {
        match self.try_fetch_history(symbol, interval, limit).await {
            Ok(bars) => bars,
            Err(e) => {
                warn!(symbol, %interval, error = %e, "history fetch failed, starting empty");
                Vec::new()
            }
        }
    }

    // -------------------------------------------------------------------------
    // Symbol discovery
    // -------------------------------------------------------------------------

    /// GET /api/v3/ticker/24hr, USDT pairs ranked by quote volume.
    #[instrument(skip(self), name = "binance::fetch_popular_symbols")]
    pub async fn try_fetch_popular_symbols(&self, limit: usize) -> Result<Vec<String>, FeedError> {
        let url = format!("{}/api/v3/ticker/24hr", self.base_url);
        let body = self.get_json(&url).await?;
        let symbols = rank_usdt_symbols(&body, limit)?;

        debug!(count = symbols.len(), "popular symbols fetched");
        Ok(symbols)
    }

    pub async fn fetch_popular_symbols(&self, limit: usize) -> Vec<String> {
        match self.try_fetch_popular_symbols(limit).await {
            Ok(symbols) if !symbols.is_empty() => symbols,
            Ok(_) => {
                warn!("ticker response had no USDT pairs, using fallback symbols");
                fallback_symbols()
            }
            Err(e) => {
                warn!(error = %e, "symbol discovery failed, using fallback symbols");
                fallback_symbols()
            }
        }
    }

    // -------------------------------------------------------------------------
    // Internal helpers
    // -------------------------------------------------------------------------

    async fn get_json(&self, url: &str) -> Result<serde_json::Value, FeedError> {
        let resp = self.client.get(url).send().await?;
        let status = resp.status();

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(FeedError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let text = resp.text().await?;
        serde_json::from_str(&text).map_err(|e| FeedError::Decode(e.to_string()))
    }
}

pub fn fallback_symbols() -> Vec<String> {
    FALLBACK_SYMBOLS.iter().map(|s| s.to_string()).collect()
}

/// Keep symbols ending in `USDT`, order by `quoteVolume` descending, take
/// `limit`. A ticker with an unreadable volume ranks as zero.
pub fn rank_usdt_symbols(
    tickers: &serde_json::Value,
    limit: usize,
) -> Result<Vec<String>, FeedError> {
    let arr = tickers
        .as_array()
        .ok_or_else(|| FeedError::Decode("ticker response is not an array".to_string()))?;

    let mut pairs: Vec<(String, f64)> = arr
        .iter()
        .filter_map(|t| {
            let symbol = t.get("symbol")?.as_str()?;
            if !symbol.ends_with("USDT") {
                return None;
            }
            let volume = parse_number(t.get("quoteVolume"), "quoteVolume")
                .ok()
                .filter(|v| v.is_finite())
                .unwrap_or(0.0);
            Some((symbol.to_string(), volume))
        })
        .collect();

    // stable, so equal volumes keep exchange order
    pairs.sort_by(|a, b| b.1.total_cmp(&a.1));
    pairs.truncate(limit);

    Ok(pairs.into_iter().map(|(s, _)| s).collect())
}
