//! Duplex message transport used by the feed
//!
//! The feed only needs `connect`, `receive` and `close`. Keeping these
//! behind traits lets the connection loop run against a scripted stream in
//! tests and against `tokio-tungstenite` in production.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream,
};
use tracing::debug;

use marketfeed_core::{FeedError, FeedResult};

/// An established stream of application frames
#[async_trait]
pub trait Connection: Send {
    /// Wait for the next application payload.
    ///
    /// Control frames are handled internally. A closed stream is reported
    /// as [`FeedError::ConnectionClosed`].
    async fn receive(&mut self) -> FeedResult<Vec<u8>>;

    /// Close the stream. Errors while closing are ignored.
    async fn close(&mut self);
}

/// Opens [`Connection`]s to an address
#[async_trait]
pub trait Connector: Send + Sync {
    type Connection: Connection + 'static;

    async fn connect(&self, address: &str) -> FeedResult<Self::Connection>;
}

// ============================================================================
// tokio-tungstenite transport
// ============================================================================

/// WebSocket connector backed by `tokio-tungstenite`
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteConnector;

/// WebSocket stream opened by [`TungsteniteConnector`]
pub struct TungsteniteConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Connector for TungsteniteConnector {
    type Connection = TungsteniteConnection;

    async fn connect(&self, address: &str) -> FeedResult<Self::Connection> {
        let (stream, response) = connect_async(address)
            .await
            .map_err(|e| FeedError::connect(e.to_string()))?;

        debug!("[Gemini WS] Handshake response status: {:?}", response.status());
        Ok(TungsteniteConnection { stream })
    }
}

#[async_trait]
impl Connection for TungsteniteConnection {
    async fn receive(&mut self) -> FeedResult<Vec<u8>> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    return Ok(text.as_str().as_bytes().to_vec());
                }
                Some(Ok(Message::Binary(data))) => {
                    return Ok(data.to_vec());
                }
                Some(Ok(Message::Ping(data))) => {
                    // Respond to ping
                    self.stream
                        .send(Message::Pong(data))
                        .await
                        .map_err(|e| FeedError::receive(format!("failed to send pong: {}", e)))?;
                }
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame
                        .map(|f| format!("{} {}", f.code, f.reason))
                        .unwrap_or_else(|| "no close frame".to_string());
                    return Err(FeedError::closed(reason));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(FeedError::receive(e.to_string())),
                None => return Err(FeedError::closed("stream ended")),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            debug!("[Gemini WS] Error while closing stream: {}", e);
        }
    }
}

impl std::fmt::Debug for TungsteniteConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TungsteniteConnection").finish_non_exhaustive()
    }
}
