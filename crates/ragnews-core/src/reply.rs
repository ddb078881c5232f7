use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::api::{ApiResponse, ResponseBody};
use crate::models::{Citation, Message};

/// Content used when a successful response carries no answer text
pub const NO_ANSWER: &str = "No answer.";

/// Outcome of a chat request, reduced to what the conversation shows
#[derive(Clone, Debug, PartialEq)]
pub enum ChatReply {
    Answer {
        content: String,
        sources: Vec<Citation>,
    },
    /// Still rendered as an assistant message, plus an error banner
    Failure { content: String, banner: String },
}

impl ChatReply {
    /// Interpret a chat response.
    ///
    /// Success requires a 2xx status and a usable body (present and not
    /// falsy: null, false, zero or an empty string). Failure content prefers a textual body, then a string
    /// `answer` field, then a generic status message.
    pub fn from_response(response: &ApiResponse) -> Self {
        if response.ok && has_usable_body(response) {
            let content = response
                .str_field("answer")
                .or_else(|| textual_body(response))
                .unwrap_or(NO_ANSWER)
                .to_string();
            let sources = Citation::list_from_value(response.field("sources"));
            return Self::Answer { content, sources };
        }

        let content = textual_body(response)
            .filter(|text| !text.is_empty())
            .or_else(|| {
                response
                    .field("answer")
                    .and_then(Value::as_str)
                    .filter(|answer| !answer.is_empty())
            })
            .map(str::to_string)
            .unwrap_or_else(|| format!("Request failed ({}).", response.status));

        Self::Failure {
            content,
            banner: format!("Chat error ({})", response.status),
        }
    }

    /// Assistant message for this reply and the error banner to show, if any
    pub fn into_message(self, at: DateTime<Utc>) -> (Message, Option<String>) {
        match self {
            Self::Answer { content, sources } => (Message::assistant(content, sources, at), None),
            Self::Failure { content, banner } => {
                (Message::assistant(content, Vec::new(), at), Some(banner))
            }
        }
    }
}

/// The whole body when it is a string, whether sent as text or as a JSON string
fn textual_body(response: &ApiResponse) -> Option<&str> {
    match &response.body {
        Some(ResponseBody::Text(text)) => Some(text),
        Some(ResponseBody::Json(Value::String(text))) => Some(text),
        _ => None,
    }
}

/// Falsy payloads (`null`, `false`, `0`, empty string) carry no reply
fn has_usable_body(response: &ApiResponse) -> bool {
    match &response.body {
        None => false,
        Some(ResponseBody::Text(text)) => !text.is_empty(),
        Some(ResponseBody::Json(value)) => match value {
            Value::Null => false,
            Value::Bool(flag) => *flag,
            Value::Number(n) => n.as_f64() != Some(0.0),
            Value::String(text) => !text.is_empty(),
            Value::Array(_) | Value::Object(_) => true,
        },
    }
}
