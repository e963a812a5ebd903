//! WebSocket plumbing shared by the exchange adapters.

use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::application::ports::ConnectorError;

/// Client socket as returned by `connect_async`.
pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Open a WebSocket to `url`.
pub async fn dial(exchange: &str, url: &str) -> Result<WsStream, ConnectorError> {
    tracing::info!(exchange, url, "Connecting to exchange stream");

    let (ws_stream, _response) = tokio_tungstenite::connect_async(url)
        .await
        .map_err(|e| ConnectorError::Connect {
            exchange: exchange.to_owned(),
            url: url.to_owned(),
            message: e.to_string(),
        })?;

    Ok(ws_stream)
}
