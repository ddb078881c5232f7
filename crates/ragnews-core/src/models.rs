use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

/// Author of a message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Name shown next to a message bubble
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::User => "You",
            Self::Assistant => "Assistant",
        }
    }
}

/// A source reference supporting an assistant answer
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl Citation {
    pub fn new(url: impl Into<String>, title: Option<String>) -> Self {
        Self {
            url: url.into(),
            title,
        }
    }

    /// Chip label: the title when present, otherwise the url
    pub fn label(&self) -> &str {
        match self.title.as_deref() {
            Some(title) if !title.is_empty() => title,
            _ => &self.url,
        }
    }

    /// Lenient decode of a single `{url, title?}` object.
    /// Entries without a string `url` are rejected.
    pub fn from_value(value: &Value) -> Option<Self> {
        let url = value.get("url")?.as_str()?;
        let title = value
            .get("title")
            .and_then(Value::as_str)
            .map(str::to_string);
        Some(Self::new(url, title))
    }

    /// Decode a `sources` payload. Anything that is not an array yields an
    /// empty list; malformed entries are dropped, order is kept.
    pub fn list_from_value(value: Option<&Value>) -> Vec<Self> {
        value
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Self::from_value).collect())
            .unwrap_or_default()
    }
}

fn lenient_sources<'de, D>(deserializer: D) -> Result<Vec<Citation>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(Citation::list_from_value(raw.as_ref()))
}

/// One turn in the conversation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Creation instant; history entries from the server may carry none
    #[serde(
        rename = "ts",
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_sources")]
    pub sources: Vec<Citation>,
}

impl Message {
    pub fn user(content: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            timestamp: Some(at),
            sources: Vec::new(),
        }
    }

    pub fn assistant(content: impl Into<String>, sources: Vec<Citation>, at: DateTime<Utc>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            timestamp: Some(at),
            sources,
        }
    }

    /// Decode the `messages` array of a history payload.
    ///
    /// A missing or non-array `messages` field yields an empty history.
    /// Entries that fail to decode are skipped.
    pub fn history_from_body(body: Option<&Value>) -> Vec<Self> {
        let Some(items) = body
            .and_then(|b| b.get("messages"))
            .and_then(Value::as_array)
        else {
            return Vec::new();
        };

        items
            .iter()
            .enumerate()
            .filter_map(|(index, item)| match Self::deserialize(item) {
                Ok(message) => Some(message),
                Err(e) => {
                    warn!(index, error = %e, "Skipping undecodable history entry");
                    None
                }
            })
            .collect()
    }
}

/// Coarse relative age of a message: `"12s"`, `"3m"`, `"2h"`.
/// Empty when the message has no timestamp. Never reports less than one second.
pub fn time_ago(timestamp: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(ts) = timestamp else {
        return String::new();
    };

    let seconds = (now - ts).num_seconds().max(1);
    if seconds < 60 {
        return format!("{}s", seconds);
    }
    let minutes = seconds / 60;
    if minutes < 60 {
        return format!("{}m", minutes);
    }
    format!("{}h", minutes / 60)
}
