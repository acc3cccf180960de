//! Client transport core for the mnm messaging service.
//!
//! Owns the persistent push channel and the request/response fetch channel,
//! gates push processing on outstanding fetches, and decodes the packed
//! record streams returned for thread fetches.

pub mod channel;
pub mod config;
pub mod envelope;
pub mod error;
pub mod fetch;
pub mod gate;
pub mod record;
pub mod render;
pub mod session;
pub mod token;

pub use envelope::Envelope;
pub use error::{ChannelError, DecodeError, FetchError};
pub use fetch::{FetchRequest, Fetcher, HttpFetcher};
pub use record::{DecodedRecord, RecordHeader, RecordId, decode_multi, decode_single};
pub use render::{JsonLinesRenderer, RenderUpdate, Renderer};
pub use session::{ChannelState, Session, SessionHandle};
