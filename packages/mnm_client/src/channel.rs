//! Persistent push channel over WebSocket.
//!
//! The channel is two tasks around a split socket. The reader turns frames
//! into session events; the writer drains the session's outbound queue.
//! Closing is terminal: nothing here reconnects.

use futures::{SinkExt, StreamExt};
use reqwest::Url;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, tungstenite};
use tracing::{debug, info, warn};

use crate::error::ChannelError;
use crate::session::SessionHandle;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connect to `url` and bind the socket to a session.
///
/// On failure the session sees a transport error followed by a close, as it
/// would for a socket that dropped after connecting.
pub async fn connect(
    url: &Url,
    session: SessionHandle,
    outbound: mpsc::Receiver<String>,
) -> Result<(), ChannelError> {
    info!(%url, "ws connecting");
    let ws_stream = match tokio_tungstenite::connect_async(url.as_str()).await {
        Ok((ws_stream, _)) => ws_stream,
        Err(e) => {
            session.transport_error(e.to_string());
            session.closed();
            return Err(ChannelError::from_tungstenite(e));
        }
    };
    attach(ws_stream, session, outbound);
    Ok(())
}

fn attach(ws_stream: WsStream, session: SessionHandle, outbound: mpsc::Receiver<String>) {
    let (ws_write, ws_read) = ws_stream.split();

    // Opened must reach the session before any pushed payload.
    session.opened();

    tokio::spawn(write_loop(ws_write, outbound));
    tokio::spawn(read_loop(ws_read, session));
}

async fn read_loop(mut ws_read: futures::stream::SplitStream<WsStream>, session: SessionHandle) {
    while let Some(msg) = ws_read.next().await {
        match msg {
            Ok(tungstenite::Message::Text(text)) => session.push(text.as_str()),
            Ok(tungstenite::Message::Binary(data)) => match std::str::from_utf8(&data) {
                Ok(text) => session.push(text),
                Err(e) => warn!(error = %e, "ws binary frame is not UTF-8, ignored"),
            },
            Ok(tungstenite::Message::Close(frame)) => {
                debug!(?frame, "ws close frame");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                session.transport_error(e.to_string());
                break;
            }
        }
    }
    session.closed();
}

async fn write_loop(
    mut ws_write: futures::stream::SplitSink<WsStream, tungstenite::Message>,
    mut outbound: mpsc::Receiver<String>,
) {
    while let Some(json) = outbound.recv().await {
        if let Err(e) = ws_write.send(tungstenite::Message::Text(json.into())).await {
            warn!(error = %e, "ws send failed");
            return;
        }
    }
    // Session finished; close our side.
    let _ = ws_write.close().await;
}
