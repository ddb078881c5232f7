//! Server-push channel for incremental answers.
//!
//! The stream is a separate capability from the request/response send path;
//! the conversation controller does not consume it.

use eventsource_stream::Eventsource;
use futures::StreamExt;
use futures::stream::BoxStream;
use serde_json::Value;

use crate::error::{ApiError, ApiResult};

/// JSON fields that may carry incremental answer text, in lookup order
const DELTA_FIELDS: [&str; 5] = ["token", "delta", "content", "answer", "text"];

/// Type alias for server-push event streams
pub type ChatStream = BoxStream<'static, ApiResult<StreamEvent>>;

/// One Server-Sent Event
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamEvent {
    /// Event name; `message` when the server did not name it
    pub event: String,
    pub data: String,
    pub id: Option<String>,
}

impl StreamEvent {
    pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            data: data.into(),
            id: None,
        }
    }

    /// `done`/`end` events or a `[DONE]` sentinel close the answer
    pub fn is_terminal(&self) -> bool {
        matches!(self.event.as_str(), "done" | "end") || self.data.trim() == "[DONE]"
    }

    pub fn is_error(&self) -> bool {
        self.event == "error"
    }

    pub fn json(&self) -> Option<Value> {
        serde_json::from_str(&self.data).ok()
    }

    /// Incremental text carried by this event, if any.
    ///
    /// Plain data is returned as is; JSON data contributes its first string
    /// field among `token`, `delta`, `content`, `answer`, `text`.
    pub fn text_delta(&self) -> Option<String> {
        if self.is_terminal() || self.is_error() || self.data.is_empty() {
            return None;
        }

        match self.json() {
            Some(Value::String(text)) => Some(text),
            Some(Value::Object(map)) => DELTA_FIELDS
                .iter()
                .find_map(|key| map.get(*key).and_then(Value::as_str))
                .map(str::to_string),
            Some(_) => None,
            None => Some(self.data.clone()),
        }
    }
}

impl From<eventsource_stream::Event> for StreamEvent {
    fn from(event: eventsource_stream::Event) -> Self {
        Self {
            event: if event.event.is_empty() {
                "message".to_string()
            } else {
                event.event
            },
            data: event.data,
            id: (!event.id.is_empty()).then_some(event.id),
        }
    }
}

/// Decode an SSE response body into [`StreamEvent`]s.
/// The stream stops after the first terminal event or transport error.
pub(crate) fn event_stream(response: reqwest::Response) -> ChatStream {
    let mut events = response.bytes_stream().eventsource();

    Box::pin(async_stream::stream! {
        while let Some(item) = events.next().await {
            match item {
                Ok(raw) => {
                    let event = StreamEvent::from(raw);
                    let terminal = event.is_terminal();
                    yield Ok(event);
                    if terminal {
                        return;
                    }
                }
                Err(e) => {
                    yield Err(ApiError::Stream(e.to_string()));
                    return;
                }
            }
        }
    })
}
