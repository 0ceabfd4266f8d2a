//! Transport seam between the background loop and the network.
//!
//! The background thread drives these futures on a current-thread runtime,
//! so implementations need not be `Send`.

use crate::RelayError;
use futures_util::{SinkExt, StreamExt};
use std::future::Future;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

/// Opens transports. Shared across sessions by one connection manager.
pub trait Connector: Send + Sync + 'static {
    type Transport: Transport;

    fn connect(&self, url: &str) -> impl Future<Output = Result<Self::Transport, RelayError>>;
}

/// One live bidirectional connection carrying text frames.
pub trait Transport: Sized {
    fn send(&mut self, frame: String) -> impl Future<Output = Result<(), RelayError>>;

    /// Next text frame. `None` once the remote has closed.
    fn recv(&mut self) -> impl Future<Output = Option<Result<String, RelayError>>>;

    /// Tear the connection down. Consumes the transport, so it runs once.
    fn close(self) -> impl Future<Output = Result<(), RelayError>>;
}

/// Websocket connector.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl Connector for WsConnector {
    type Transport = WsTransport;

    async fn connect(&self, url: &str) -> Result<WsTransport, RelayError> {
        let (stream, response) = tokio_tungstenite::connect_async(url).await?;
        tracing::debug!("websocket handshake complete: {}", response.status());
        Ok(WsTransport { stream })
    }
}

/// Websocket transport over tokio-tungstenite.
pub struct WsTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl Transport for WsTransport {
    async fn send(&mut self, frame: String) -> Result<(), RelayError> {
        self.stream.send(Message::Text(frame.into())).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, RelayError>> {
        loop {
            let msg = match self.stream.next().await? {
                Ok(msg) => msg,
                Err(e) => return Some(Err(e.into())),
            };
            match msg {
                Message::Text(text) => return Some(Ok(text.to_string())),
                // Invalid UTF-8 is replaced rather than rejected, so the frame
                // decodes as malformed instead of ending the session.
                Message::Binary(data) => {
                    return Some(Ok(String::from_utf8_lossy(&data).into_owned()));
                }
                Message::Close(frame) => {
                    tracing::debug!("server sent close frame: {:?}", frame);
                    return None;
                }
                // Pings are answered by tungstenite.
                _ => continue,
            }
        }
    }

    async fn close(mut self) -> Result<(), RelayError> {
        match self.stream.close(None).await {
            Ok(())
            | Err(tungstenite::Error::ConnectionClosed)
            | Err(tungstenite::Error::AlreadyClosed) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
