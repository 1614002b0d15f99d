//! WebSocket client: authenticated dial, subscription commands, typed frames.

pub mod models;

use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use crate::auth::{signed_headers, Account, HEADER_ACCESS_KEY, HEADER_ACCESS_SIGNATURE, HEADER_ACCESS_TIMESTAMP};
use crate::errors::{ExchangeError, Result};

pub use models::{
    Channel, Command, ExchangeSocketMessage, SubscribeParams, UnsubscribeParams, UpdateAction,
    UpdateSubscriptionParams,
};

const WS_PATH: &str = "/trade-api/ws/v2";

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// A connected WebSocket session. `connect` performs the signed handshake;
/// every subsequent command carries a monotonically increasing `id` so
/// responses (`ok`/`error`) can be correlated to the request that caused
/// them.
pub struct ExchangeWebsocketClient {
    stream: Option<WsStream>,
    next_id: AtomicU64,
    ws_url: String,
    account: Option<Account>,
}

impl ExchangeWebsocketClient {
    pub fn new(ws_url: impl Into<String>, account: Option<Account>) -> Self {
        Self {
            stream: None,
            next_id: AtomicU64::new(1),
            ws_url: ws_url.into(),
            account,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Dial the exchange, signing the handshake request if an [`Account`] is
    /// configured. The signed path is always [`WS_PATH`] regardless of the
    /// configured `ws_url`'s path component.
    pub async fn connect(&mut self) -> Result<()> {
        let mut request = self.ws_url.clone().into_client_request()?;

        if let Some(account) = &self.account {
            let (key_id, timestamp, signature) = signed_headers(account, "GET", WS_PATH)?;
            let headers = request.headers_mut();
            headers.insert(HEADER_ACCESS_KEY, key_id.parse().map_err(|_| ExchangeError::Signing("invalid key id header".into()))?);
            headers.insert(
                HEADER_ACCESS_TIMESTAMP,
                timestamp.parse().map_err(|_| ExchangeError::Signing("invalid timestamp header".into()))?,
            );
            headers.insert(
                HEADER_ACCESS_SIGNATURE,
                signature.parse().map_err(|_| ExchangeError::Signing("invalid signature header".into()))?,
            );
        }

        let (stream, response) = tokio_tungstenite::connect_async(request).await?;
        debug!(status = %response.status(), "websocket handshake complete");
        self.stream = Some(stream);
        Ok(())
    }

    fn allocate_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    async fn send_command(&mut self, command: Command) -> Result<u64> {
        let stream = self.stream.as_mut().ok_or(ExchangeError::NotConnected)?;
        let id = match &command {
            Command::Subscribe { id, .. } => *id,
            Command::Unsubscribe { id, .. } => *id,
            Command::UpdateSubscription { id, .. } => *id,
        };
        let payload = serde_json::to_string(&command).map_err(|e| ExchangeError::Parse(e, String::new()))?;
        stream.send(Message::Text(payload)).await?;
        Ok(id)
    }

    /// Subscribe to `channels` for `market_tickers`, returning the request id
    /// the resulting `subscribed`/`error` frame will carry.
    pub async fn subscribe(&mut self, channels: Vec<Channel>, market_tickers: Vec<String>) -> Result<u64> {
        let id = self.allocate_id();
        self.send_command(Command::Subscribe {
            id,
            params: SubscribeParams { channels, market_tickers },
        })
        .await
    }

    pub async fn unsubscribe(&mut self, sids: Vec<u64>) -> Result<u64> {
        let id = self.allocate_id();
        self.send_command(Command::Unsubscribe {
            id,
            params: UnsubscribeParams { sids },
        })
        .await
    }

    pub async fn update_subscription(
        &mut self,
        sid: u64,
        market_tickers: Vec<String>,
        action: UpdateAction,
    ) -> Result<u64> {
        let id = self.allocate_id();
        self.send_command(Command::UpdateSubscription {
            id,
            params: UpdateSubscriptionParams { sid, market_tickers, action },
        })
        .await
    }

    /// Await and decode the next frame. Returns `Ok(None)` when the peer
    /// closes the stream cleanly. Ping frames are answered with a matching
    /// Pong and otherwise swallowed; callers never see them.
    pub async fn next_message(&mut self) -> Result<Option<ExchangeSocketMessage>> {
        loop {
            let stream = self.stream.as_mut().ok_or(ExchangeError::NotConnected)?;
            match stream.next().await {
                None => return Ok(None),
                Some(Ok(Message::Text(text))) => return Ok(Some(ExchangeSocketMessage::parse(&text))),
                Some(Ok(Message::Ping(payload))) => {
                    stream.send(Message::Pong(payload)).await?;
                    continue;
                }
                Some(Ok(Message::Pong(_))) => continue,
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "websocket closed by peer");
                    return Ok(None);
                }
                Some(Ok(other)) => {
                    warn!(?other, "ignoring non-text websocket frame");
                    continue;
                }
                Some(Err(e)) => return Err(ExchangeError::WebSocket(e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_id_is_monotonic() {
        let client = ExchangeWebsocketClient::new("wss://example.invalid/ws", None);
        let first = client.allocate_id();
        let second = client.allocate_id();
        let third = client.allocate_id();
        assert_eq!([first, second, third], [1, 2, 3]);
    }

    #[tokio::test]
    async fn test_commands_require_connection() {
        let mut client = ExchangeWebsocketClient::new("wss://example.invalid/ws", None);
        let result = client.subscribe(vec![Channel::Trade], vec!["FOO".into()]).await;
        assert!(matches!(result, Err(ExchangeError::NotConnected)));
    }
}
