//! The UI-facing collaborator that receives decoded results and session events.

use std::collections::BTreeMap;

use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;

use crate::record::{DecodedRecord, RecordId};

/// Data delivered to the renderer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RenderUpdate {
    /// Everything after `_n` in a push payload.
    NameSet { names: Vec<Value> },
    /// Raw response body of a non-record fetch, tagged with its token and id argument.
    Raw {
        token: String,
        #[serde(serialize_with = "serialize_text")]
        body: Bytes,
        id: Option<String>,
    },
    /// The single message fetched by `mn`.
    Message { token: String, record: DecodedRecord },
    /// All messages fetched by `mo`, keyed by id.
    Messages {
        token: String,
        records: BTreeMap<RecordId, DecodedRecord>,
    },
}

fn serialize_text<S: serde::Serializer>(bytes: &Bytes, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&String::from_utf8_lossy(bytes))
}

/// Callbacks the session invokes; all run on the session's event loop.
pub trait Renderer: Send + 'static {
    fn render(&mut self, update: RenderUpdate);

    /// Error text for the user: `_e` messages, failed fetches, transport errors.
    fn error(&mut self, message: &str);

    /// The push channel closed; the session is over.
    fn quit(&mut self);

    fn thread_change(&mut self);
}

/// Writes render updates as JSON lines to stdout and errors to stderr.
#[derive(Debug, Default)]
pub struct JsonLinesRenderer;

impl Renderer for JsonLinesRenderer {
    fn render(&mut self, update: RenderUpdate) {
        match serde_json::to_string(&update) {
            Ok(line) => println!("{line}"),
            Err(e) => tracing::error!(error = %e, "failed to serialize render update"),
        }
    }

    fn error(&mut self, message: &str) {
        eprintln!("error: {message}");
    }

    fn quit(&mut self) {
        eprintln!("disconnected");
    }

    fn thread_change(&mut self) {
        println!(r#"{{"kind":"thread_change"}}"#);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn raw_update_serializes_body_as_text() {
        let update = RenderUpdate::Raw {
            token: "an".to_string(),
            body: Bytes::from_static(b"file"),
            id: Some("a1".to_string()),
        };
        assert_eq!(
            serde_json::to_value(&update).unwrap(),
            json!({"kind": "raw", "token": "an", "body": "file", "id": "a1"})
        );
    }

    #[test]
    fn name_set_update() {
        let update = RenderUpdate::NameSet {
            names: vec![json!("a"), json!("b")],
        };
        assert_eq!(
            serde_json::to_value(&update).unwrap(),
            json!({"kind": "name_set", "names": ["a", "b"]})
        );
    }
}
