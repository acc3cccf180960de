//! Error types for the push channel, fetches, and record decoding.

use std::time::Duration;

use tokio_tungstenite::tungstenite;

/// A packed record stream could not be decoded.
///
/// Any of these aborts processing of the whole response; no partial
/// record mapping is ever delivered.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("record stream truncated at offset {offset}: wanted {wanted} bytes, {available} available")]
    Truncated {
        offset: usize,
        wanted: usize,
        available: usize,
    },

    #[error("invalid header length {text:?} at offset {offset}")]
    BadLength { offset: usize, text: String },

    #[error("invalid record header at offset {offset}: {source}")]
    BadHeader {
        offset: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// A fetch on the request/response channel failed.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("fetch returned status {status}")]
    Status { status: u16, body: String },

    #[error("fetch transport failure: {0}")]
    Transport(String),

    #[error("fetch did not complete within {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl FetchError {
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => Self::Status {
                status: status.as_u16(),
                body: err.to_string(),
            },
            None => Self::Transport(err.to_string()),
        }
    }

    /// Text handed to the error collaborator.
    ///
    /// Status failures report the response body, as the server puts its
    /// human-readable reason there.
    pub fn report_text(&self) -> String {
        match self {
            Self::Status { body, .. } => body.clone(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("server is unavailable")]
    Unavailable,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ChannelError {
    pub fn from_tungstenite(err: tungstenite::Error) -> Self {
        let is_connect = match &err {
            tungstenite::Error::Io(io_err) => matches!(
                io_err.kind(),
                std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
            ),
            _ => false,
        };
        if is_connect {
            Self::Unavailable
        } else {
            Self::Other(err.into())
        }
    }
}
