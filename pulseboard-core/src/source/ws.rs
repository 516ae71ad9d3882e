//! WebSocket push transport (`/api/clients`)
//!
//! The client drives the channel: every `request_refresh` sends the text
//! `get` and the server answers with one full live frame.

use super::komari::base_url;
use super::{LiveChannel, LiveTransport};
use crate::config::TransportMode;
use crate::error::TransportError;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};
use url::Url;

const REFRESH_COMMAND: &str = "get";

/// Derive the push endpoint from the REST base URL.
///
/// Only http(s) and ws(s) bases can carry a WebSocket.
pub fn live_url(base: &str) -> Result<Url, TransportError> {
    let mut url = base_url(base).map_err(|e| TransportError::Unsupported(e.to_string()))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(TransportError::Unsupported(format!("scheme {other}"))),
    };
    url.set_scheme(scheme)
        .map_err(|_| TransportError::Unsupported(format!("scheme {scheme}")))?;
    url.join("api/clients").map_err(|e| TransportError::Unsupported(e.to_string()))
}

#[derive(Debug, Clone)]
pub struct WsTransport {
    target: Result<Url, TransportError>,
}

impl WsTransport {
    pub fn new(base: &str, mode: TransportMode) -> Self {
        let target = match mode {
            TransportMode::Poll => Err(TransportError::Unsupported("disabled by configuration".into())),
            TransportMode::Auto => live_url(base),
        };
        Self { target }
    }
}

#[async_trait]
impl LiveTransport for WsTransport {
    async fn open(&self) -> Result<Box<dyn LiveChannel>, TransportError> {
        let url = self.target.clone()?;
        let (stream, _resp) = connect_async(url.as_str()).await?;
        info!("Live channel open on {}", url);
        Ok(Box::new(WsChannel { stream }))
    }
}

pub struct WsChannel {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl LiveChannel for WsChannel {
    async fn request_refresh(&mut self) -> Result<(), TransportError> {
        self.stream.send(Message::Text(REFRESH_COMMAND.into())).await?;
        Ok(())
    }

    async fn next_frame(&mut self) -> Option<Result<String, TransportError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.as_str().to_owned())),
                Ok(Message::Binary(bytes)) => return Some(Ok(String::from_utf8_lossy(&bytes).into_owned())),
                Ok(Message::Close(frame)) => {
                    debug!("Live channel closed by server: {:?}", frame);
                    return None;
                }
                Ok(_) => continue,
                Err(e) => return Some(Err(e.into())),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            debug!("Live channel close: {}", e);
        }
    }
}
