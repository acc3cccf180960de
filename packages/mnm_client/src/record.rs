//! Packed record stream decoding.
//!
//! Wire format, repeated with no outer framing:
//!
//! `[4 hex digits: header length][JSON header][1 separator byte][header.Len body bytes][attachment chunks]`
//!
//! Attachment chunks follow the body only for records sent by `self` that
//! list attachments in `SubHead.Attach`; each descriptor consumes its `Size`
//! bytes in order. The server terminates each stored record with a newline,
//! which is skipped when present.

use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::DecodeError;

/// Attachment names carrying this prefix are reply form fields.
pub const REPLY_FIELD_PREFIX: &str = "r:";

/// Sender value marking records written by the local user.
pub const FROM_SELF: &str = "self";

const LENGTH_DIGITS: usize = 4;
const RECORD_TERMINATOR: u8 = b'\n';

pub type Result<T> = std::result::Result<T, DecodeError>;

/// Record id, normalized to text whether the header carries a string or a number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(serde_json::Number),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(s) => Self(s),
            Raw::Number(n) => Self(n.to_string()),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentDescriptor {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "FfKey", default)]
    pub ff_key: String,
    #[serde(rename = "Size")]
    pub size: usize,
}

impl AttachmentDescriptor {
    pub fn is_reply_field(&self) -> bool {
        self.name.starts_with(REPLY_FIELD_PREFIX)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubHead {
    #[serde(rename = "ThreadId", default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<RecordId>,
    #[serde(rename = "Attach", default, skip_serializing_if = "Option::is_none")]
    pub attach: Option<Vec<AttachmentDescriptor>>,
    /// Fields this layer does not interpret (Subject, Alias, Cc, ...).
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordHeader {
    #[serde(rename = "Id")]
    pub id: RecordId,
    #[serde(rename = "Len")]
    pub len: usize,
    #[serde(rename = "From", default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(rename = "SubHead", default, skip_serializing_if = "Option::is_none")]
    pub sub_head: Option<SubHead>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl RecordHeader {
    pub fn is_from_self(&self) -> bool {
        self.from.as_deref() == Some(FROM_SELF)
    }

    pub fn attachments(&self) -> &[AttachmentDescriptor] {
        self.sub_head
            .as_ref()
            .and_then(|s| s.attach.as_deref())
            .unwrap_or(&[])
    }

    /// Thread this record belongs to; a record without a thread id starts its own thread.
    pub fn thread_id(&self) -> &str {
        self.sub_head
            .as_ref()
            .and_then(|s| s.thread_id.as_ref())
            .map(RecordId::as_str)
            .filter(|t| !t.is_empty())
            .unwrap_or(self.id.as_str())
    }
}

/// One record from a packed stream: header fields plus body and reply form-fill chunks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedRecord {
    #[serde(flatten)]
    pub header: RecordHeader,
    #[serde(serialize_with = "serialize_lossy")]
    pub msg_data: Bytes,
    #[serde(
        serialize_with = "serialize_lossy_map",
        skip_serializing_if = "Option::is_none"
    )]
    pub form_fill: Option<BTreeMap<String, Bytes>>,
}

impl DecodedRecord {
    pub fn id(&self) -> &RecordId {
        &self.header.id
    }

    pub fn msg_text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.msg_data)
    }
}

fn serialize_lossy<S: Serializer>(bytes: &Bytes, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_str(&String::from_utf8_lossy(bytes))
}

fn serialize_lossy_map<S: Serializer>(
    map: &Option<BTreeMap<String, Bytes>>,
    s: S,
) -> std::result::Result<S::Ok, S::Error> {
    use serde::ser::SerializeMap;
    match map {
        None => s.serialize_none(),
        Some(map) => {
            let mut out = s.serialize_map(Some(map.len()))?;
            for (k, v) in map {
                out.serialize_entry(k, &String::from_utf8_lossy(v))?;
            }
            out.end()
        }
    }
}

/// Bounds-checked reader over a response body.
///
/// Slices share the underlying buffer; nothing is copied.
pub struct RecordCursor {
    buf: Bytes,
    pos: usize,
}

impl RecordCursor {
    pub fn new(buf: Bytes) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_at_end(&self) -> bool {
        self.pos >= self.buf.len()
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<Bytes> {
        if n > self.remaining() {
            return Err(DecodeError::Truncated {
                offset: self.pos,
                wanted: n,
                available: self.remaining(),
            });
        }
        let out = self.buf.slice(self.pos..self.pos + n);
        self.pos += n;
        Ok(out)
    }

    pub fn read_hex_length(&mut self) -> Result<usize> {
        let offset = self.pos;
        let digits = self.read_bytes(LENGTH_DIGITS)?;
        let bad = || DecodeError::BadLength {
            offset,
            text: String::from_utf8_lossy(&digits).into_owned(),
        };
        if !digits.iter().all(u8::is_ascii_hexdigit) {
            return Err(bad());
        }
        let text = std::str::from_utf8(&digits).map_err(|_| bad())?;
        usize::from_str_radix(text, 16).map_err(|_| bad())
    }

    /// Consume `byte` if it is next; returns whether it was.
    pub fn skip_if(&mut self, byte: u8) -> bool {
        if self.buf.get(self.pos) == Some(&byte) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Decode the record starting at the cursor.
    pub fn read_record(&mut self) -> Result<DecodedRecord> {
        let header_len = self.read_hex_length()?;
        let header_offset = self.pos;
        let raw_header = self.read_bytes(header_len)?;
        let header: RecordHeader =
            serde_json::from_slice(&raw_header).map_err(|source| DecodeError::BadHeader {
                offset: header_offset,
                source,
            })?;
        self.read_bytes(1)?; // separator

        let msg_data = self.read_bytes(header.len)?;

        let mut form_fill: Option<BTreeMap<String, Bytes>> = None;
        if header.is_from_self() {
            for attach in header.attachments() {
                let chunk = self.read_bytes(attach.size)?;
                if attach.is_reply_field() {
                    form_fill
                        .get_or_insert_with(BTreeMap::new)
                        .insert(attach.ff_key.clone(), chunk);
                }
            }
        }

        self.skip_if(RECORD_TERMINATOR);

        Ok(DecodedRecord {
            header,
            msg_data,
            form_fill,
        })
    }
}

/// Decode a single-record stream (`mn`). Bytes after the first record are ignored.
pub fn decode_single(body: Bytes) -> Result<DecodedRecord> {
    RecordCursor::new(body).read_record()
}

/// Decode a multi-record stream (`mo`) into a mapping keyed by record id.
///
/// A later record with a repeated id replaces the earlier one.
pub fn decode_multi(body: Bytes) -> Result<BTreeMap<RecordId, DecodedRecord>> {
    let mut cursor = RecordCursor::new(body);
    let mut records = BTreeMap::new();
    while !cursor.is_at_end() {
        let record = cursor.read_record()?;
        records.insert(record.header.id.clone(), record);
    }
    Ok(records)
}
