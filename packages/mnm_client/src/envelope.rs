//! Outbound envelopes sent over the push channel.
//!
//! Every envelope serializes as `{"op": "<op>", "<payload key>": {...}}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `act` codes carried by touch payloads (ASCII codes of `s`, `t`, `u`).
pub const TOUCH_SEEN: u8 = b's';
pub const TOUCH_TAG: u8 = b't';
pub const TOUCH_UNTAG: u8 = b'u';

/// `thread.new` values for `thread_save`.
pub const THREAD_NEW: u8 = 1;
pub const THREAD_REPLY: u8 = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Envelope {
    Open,
    ConfigUpdate { config: Value },
    OhiAdd { ohi: Ohi },
    OhiDrop { ohi: Ohi },
    PingSave { ping: Ping },
    PingDiscard { ping: Ping },
    PingSend { ping: Ping },
    AcceptSend { accept: Accept },
    AdrsbkSearch { adrsbk: AdrsbkQuery },
    NoticeSeen { notice: NoticeRef },
    NavigateThread { navigate: Navigate },
    NavigateHistory { navigate: Navigate },
    NavigateLink { navigate: Navigate },
    /// Draft payload is free-form (alias, cc, data, attach, formFill, ...).
    ThreadSave { thread: Value },
    ThreadSend { thread: ThreadRef },
    ThreadDiscard { thread: ThreadRef },
    ThreadClose { touch: Touch },
    ThreadTag { touch: Touch },
    ThreadOpen { touch: Touch },
    ForwardSave { forward: Forward },
    ForwardSend { forward: Forward },
    TabAdd { tab: Tab },
    TabSelect { tab: Tab },
    TabPin { tab: Tab },
    TabDrop { tab: Tab },
    SortSelect { sort: Sort },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ohi {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    pub uid: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ping {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qid: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Accept {
    pub qid: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdrsbkQuery {
    #[serde(rename = "type")]
    pub kind: i8,
    pub term: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoticeRef {
    pub msgid: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Navigate {
    #[serde(rename = "threadId", default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(rename = "msgId", default, skip_serializing_if = "Option::is_none")]
    pub msg_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadRef {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Touch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub act: Option<u8>,
    pub msgid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tagid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threadid: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forward {
    #[serde(rename = "threadId")]
    pub thread_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cc: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qid: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Tab {
    #[serde(rename = "type")]
    pub kind: i8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub term: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub posfor: Option<i8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pos: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sort {
    #[serde(rename = "type")]
    pub kind: i8,
    pub field: String,
}

impl Envelope {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn ping_send(qid: impl Into<String>) -> Self {
        Self::PingSend {
            ping: Ping {
                qid: Some(qid.into()),
                ..Default::default()
            },
        }
    }

    pub fn invite_accept(qid: impl Into<String>) -> Self {
        Self::AcceptSend {
            accept: Accept { qid: qid.into() },
        }
    }

    pub fn ohi_add(alias: impl Into<String>, uid: impl Into<String>) -> Self {
        Self::OhiAdd {
            ohi: Ohi {
                alias: Some(alias.into()),
                uid: uid.into(),
            },
        }
    }

    pub fn ohi_drop(uid: impl Into<String>) -> Self {
        Self::OhiDrop {
            ohi: Ohi {
                alias: None,
                uid: uid.into(),
            },
        }
    }

    pub fn notice_seen(msgid: impl Into<String>) -> Self {
        Self::NoticeSeen {
            notice: NoticeRef {
                msgid: msgid.into(),
            },
        }
    }

    pub fn navigate_thread(thread_id: impl Into<String>) -> Self {
        Self::NavigateThread {
            navigate: Navigate {
                thread_id: Some(thread_id.into()),
                ..Default::default()
            },
        }
    }

    pub fn navigate_history(history: i32) -> Self {
        Self::NavigateHistory {
            navigate: Navigate {
                history: Some(history),
                ..Default::default()
            },
        }
    }

    /// Build from a link of the form `...#<threadId>&<msgId>`; a missing msgId means the thread's first message.
    pub fn navigate_link(link: &str) -> Self {
        let fragment = link.split_once('#').map_or(link, |(_, f)| f);
        let mut parts = fragment.split('&');
        let thread_id = parts.next().unwrap_or_default().to_string();
        let msg_id = parts
            .next()
            .filter(|m| !m.is_empty())
            .map_or_else(|| thread_id.clone(), str::to_string);
        Self::NavigateLink {
            navigate: Navigate {
                thread_id: Some(thread_id),
                msg_id: Some(msg_id),
                history: None,
            },
        }
    }

    /// New thread from a draft object (alias, cc, data, attach, formFill).
    pub fn thread_new(draft: Value) -> Self {
        Self::thread_save_with(draft, Some(THREAD_NEW))
    }

    pub fn thread_reply(draft: Value) -> Self {
        Self::thread_save_with(draft, Some(THREAD_REPLY))
    }

    /// Update an existing draft; any `new` marker is removed.
    pub fn thread_save(draft: Value) -> Self {
        Self::thread_save_with(draft, None)
    }

    fn thread_save_with(mut draft: Value, new: Option<u8>) -> Self {
        if let Value::Object(map) = &mut draft {
            match new {
                Some(n) => {
                    map.insert("new".to_string(), Value::from(n));
                }
                None => {
                    map.remove("new");
                }
            }
        }
        Self::ThreadSave { thread: draft }
    }

    pub fn thread_send(id: impl Into<String>) -> Self {
        Self::ThreadSend {
            thread: ThreadRef { id: id.into() },
        }
    }

    pub fn thread_discard(id: impl Into<String>) -> Self {
        Self::ThreadDiscard {
            thread: ThreadRef { id: id.into() },
        }
    }

    pub fn thread_close(msgid: impl Into<String>) -> Self {
        Self::ThreadClose {
            touch: Touch {
                act: None,
                msgid: msgid.into(),
                tagid: None,
                threadid: None,
            },
        }
    }

    pub fn thread_tag(msgid: impl Into<String>, tagid: impl Into<String>) -> Self {
        Self::tag_touch(TOUCH_TAG, msgid.into(), tagid.into())
    }

    pub fn thread_untag(msgid: impl Into<String>, tagid: impl Into<String>) -> Self {
        Self::tag_touch(TOUCH_UNTAG, msgid.into(), tagid.into())
    }

    fn tag_touch(act: u8, msgid: String, tagid: String) -> Self {
        Self::ThreadTag {
            touch: Touch {
                act: Some(act),
                msgid,
                tagid: Some(tagid),
                threadid: None,
            },
        }
    }

    /// Mark a message seen after it was opened.
    pub fn thread_open(msgid: impl Into<String>, threadid: impl Into<String>) -> Self {
        Self::ThreadOpen {
            touch: Touch {
                act: Some(TOUCH_SEEN),
                msgid: msgid.into(),
                tagid: None,
                threadid: Some(threadid.into()),
            },
        }
    }

    pub fn forward_save(thread_id: impl Into<String>, cc: Value) -> Self {
        Self::ForwardSave {
            forward: Forward {
                thread_id: thread_id.into(),
                cc: Some(cc),
                qid: None,
            },
        }
    }

    pub fn forward_send(thread_id: impl Into<String>, qid: impl Into<String>) -> Self {
        Self::ForwardSend {
            forward: Forward {
                thread_id: thread_id.into(),
                cc: None,
                qid: Some(qid.into()),
            },
        }
    }

    pub fn tab_pin(kind: i8) -> Self {
        Self::TabPin {
            tab: Tab {
                kind,
                ..Default::default()
            },
        }
    }

    pub fn tab_drop(kind: i8) -> Self {
        Self::TabDrop {
            tab: Tab {
                kind,
                ..Default::default()
            },
        }
    }

    pub fn sort_select(kind: i8, field: impl Into<String>) -> Self {
        Self::SortSelect {
            sort: Sort {
                kind,
                field: field.into(),
            },
        }
    }
}
