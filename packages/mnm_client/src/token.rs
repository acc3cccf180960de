//! Push payload tokenizer.
//!
//! A push payload is a JSON array read left to right. Most elements are bare
//! fetch tokens; a few markers consume the element after them, and `_n`
//! swallows the rest of the array.

use serde_json::Value;

/// Name-set update; the remainder of the payload is the name set.
pub const NAME_SET: &str = "_n";
/// The open thread changed.
pub const THREAD_CHANGE: &str = "_t";
/// The next element is an error message.
pub const ERROR: &str = "_e";
/// New push batch; also refreshes the subscribed notice log.
pub const NEW_BATCH: &str = "/v";

/// Tokens whose next element is an id argument.
pub const ID_TOKENS: [&str; 3] = ["mn", "an", "fn"];

/// One step of processing a push payload.
#[derive(Debug, Clone, PartialEq)]
pub enum PushAction {
    NameSet(Vec<Value>),
    ThreadChange,
    Error(String),
    Fetch { token: String, id: Option<String> },
}

#[derive(Debug, thiserror::Error)]
pub enum TokenizeError {
    #[error("push payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("push payload is not a JSON array")]
    NotArray,

    #[error("push element {index} is not a string token")]
    NotToken { index: usize },
}

/// Split a raw push payload into the ordered actions it requests.
pub fn tokenize(payload: &str) -> Result<Vec<PushAction>, TokenizeError> {
    let Value::Array(items) = serde_json::from_str::<Value>(payload)? else {
        return Err(TokenizeError::NotArray);
    };
    tokenize_items(items)
}

pub fn tokenize_items(items: Vec<Value>) -> Result<Vec<PushAction>, TokenizeError> {
    let mut actions = Vec::new();
    let mut iter = items.into_iter().enumerate();

    while let Some((index, item)) = iter.next() {
        let Value::String(token) = item else {
            return Err(TokenizeError::NotToken { index });
        };
        match token.as_str() {
            NAME_SET => {
                actions.push(PushAction::NameSet(iter.by_ref().map(|(_, v)| v).collect()));
                break;
            }
            THREAD_CHANGE => actions.push(PushAction::ThreadChange),
            ERROR => {
                let message = iter.next().map(|(_, v)| value_text(v)).unwrap_or_default();
                actions.push(PushAction::Error(message));
            }
            _ => {
                let id = if ID_TOKENS.contains(&token.as_str()) {
                    iter.next().map(|(_, v)| value_text(v))
                } else {
                    None
                };
                actions.push(PushAction::Fetch { token, id });
            }
        }
    }

    Ok(actions)
}

/// Id and message arguments are usually strings; anything else is used in its JSON form.
fn value_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}
