//! Request/response fetches: path construction and the HTTP fetcher.

use std::future::Future;

use bytes::Bytes;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::Url;
use tracing::debug;

use crate::error::FetchError;

/// Open one message of the current thread (single-record stream).
pub const THREAD_MESSAGE: &str = "mn";
/// Open messages of the current thread (multi-record stream).
pub const THREAD_MESSAGES: &str = "mo";
/// Attachment content.
pub const ATTACHMENT: &str = "an";
/// Form definition.
pub const FORM: &str = "/f";
/// Notice log of a service; the id names the service.
pub const NOTICE_LOG: &str = "nlo";

/// How a successful response body is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    /// Body goes to the renderer as-is.
    Raw,
    /// Body is a packed stream holding one record.
    SingleRecord,
    /// Body is a packed stream of records.
    MultiRecord,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub token: String,
    pub id: Option<String>,
    /// Acknowledge the opened message with `thread_open` once decoded.
    pub open: bool,
}

impl FetchRequest {
    pub fn new(token: impl Into<String>, id: Option<String>) -> Self {
        Self {
            token: token.into(),
            id,
            open: false,
        }
    }

    pub fn open_thread(id: impl Into<String>) -> Self {
        Self {
            token: THREAD_MESSAGE.to_string(),
            id: Some(id.into()),
            open: true,
        }
    }

    pub fn notice_log(service: impl Into<String>) -> Self {
        Self::new(NOTICE_LOG, Some(service.into()))
    }

    pub fn kind(&self) -> ResponseKind {
        match self.token.as_str() {
            THREAD_MESSAGE => ResponseKind::SingleRecord,
            THREAD_MESSAGES => ResponseKind::MultiRecord,
            _ => ResponseKind::Raw,
        }
    }

    /// Request target, relative to the service page URL.
    ///
    /// - notice log: `/<id>?nl`
    /// - path-style tokens (leading `/`): `<token>/<id>`
    /// - everything else: `?<token>` or `?<token>=<id>`
    pub fn path(&self) -> String {
        let id = self.id.as_deref().map(encode_component).unwrap_or_default();
        if self.token == NOTICE_LOG {
            format!("/{id}?nl")
        } else if self.token.starts_with('/') {
            format!("{}/{}", self.token, id)
        } else if id.is_empty() {
            format!("?{}", self.token)
        } else {
            format!("?{}={}", self.token, id)
        }
    }
}

/// Everything `encodeURIComponent` escapes: all but `A-Z a-z 0-9 - _ . ! ~ * ' ( )`.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

pub fn encode_component(input: &str) -> String {
    utf8_percent_encode(input, COMPONENT).to_string()
}

/// Issues GET requests on the request/response channel.
///
/// Non-success statuses come back as [`FetchError::Status`] carrying the body.
pub trait Fetcher: Clone + Send + Sync + 'static {
    fn fetch(&self, path: &str) -> impl Future<Output = Result<Bytes, FetchError>> + Send;
}

#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    page_url: Url,
}

impl HttpFetcher {
    pub fn new(page_url: Url) -> Self {
        Self {
            client: reqwest::Client::new(),
            page_url,
        }
    }

    pub fn page_url(&self) -> &Url {
        &self.page_url
    }
}

impl Fetcher for HttpFetcher {
    async fn fetch(&self, path: &str) -> Result<Bytes, FetchError> {
        let url = self
            .page_url
            .join(path)
            .map_err(|e| FetchError::Transport(format!("invalid fetch path {path:?}: {e}")))?;
        debug!(%url, "fetch");

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(FetchError::from_reqwest)?;
        let status = resp.status();
        let body = resp.bytes().await.map_err(FetchError::from_reqwest)?;

        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }
        Ok(body)
    }
}
