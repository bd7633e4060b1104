use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;
use futures_util::{FutureExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info};

use crate::error::FeedError;
use crate::types::StreamKey;

pub const DEFAULT_WS_BASE_URL: &str = "wss://stream.binance.com:9443/ws";

/// Text frames from one live connection. The stream ending means the remote
/// closed the connection.
pub type FrameStream = BoxStream<'static, Result<String, FeedError>>;

/// Opens the push channel for one stream key.
pub trait StreamConnector: Send + Sync + 'static {
    fn connect(&self, key: &StreamKey) -> BoxFuture<'static, Result<FrameStream, FeedError>>;
}

/// Connects to the exchange's raw single-stream WebSocket endpoint,
/// `{ws_base_url}/{symbol}@kline_{interval}`.
#[derive(Debug, Clone)]
pub struct BinanceConnector {
    ws_base_url: String,
}

impl BinanceConnector {
    pub fn new(ws_base_url: impl Into<String>) -> Self {
        Self {
            ws_base_url: ws_base_url.into(),
        }
    }

    fn url_for(&self, key: &StreamKey) -> String {
        format!(
            "{}/{}",
            self.ws_base_url.trim_end_matches('/'),
            key.stream_name()
        )
    }
}

impl StreamConnector for BinanceConnector {
    fn connect(&self, key: &StreamKey) -> BoxFuture<'static, Result<FrameStream, FeedError>> {
        let url = self.url_for(key);
        let key = key.clone();

        async move {
            info!(url = %url, key = %key, "connecting to kline WebSocket");

            let (ws_stream, _response) = connect_async(url.as_str())
                .await
                .map_err(|e| FeedError::Connection(e.to_string()))?;

            info!(key = %key, "kline WebSocket connected");

            // Ping / Pong / Binary frames are skipped; tungstenite answers
            // pings on its own. A Close frame ends the stream right after.
            let frames = ws_stream.filter_map(move |msg| {
                let key = key.clone();
                async move {
                    match msg {
                        Ok(Message::Text(text)) => Some(Ok(text)),
                        Ok(Message::Close(frame)) => {
                            debug!(key = %key, frame = ?frame, "close frame received");
                            None
                        }
                        Ok(_) => None,
                        Err(e) => Some(Err(FeedError::Connection(e.to_string()))),
                    }
                }
            });

            Ok(frames.boxed())
        }
        .boxed()
    }
}
