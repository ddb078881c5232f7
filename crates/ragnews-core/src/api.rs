//! HTTP facade for the question-answering backend.
//!
//! Every endpoint except session creation answers with an [`ApiResponse`]
//! regardless of status code, content type or transport failure, so callers
//! can turn failures into in-band state instead of propagating errors.

use std::time::Duration;

use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Method, Url};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::{ApiError, ApiResult};
use crate::stream::{self, ChatStream};

/// Longest slice of a failed session-creation body kept in the error message
pub const MAX_ERROR_BODY_CHARS: usize = 200;

/// Characters escaped when a session id is placed in a path segment
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Decoded response payload
#[derive(Clone, Debug, PartialEq)]
pub enum ResponseBody {
    Json(Value),
    Text(String),
}

/// Uniform `{ok, status, body}` view of an HTTP response.
///
/// `body` is `None` when the payload could not be read or parsed; that is
/// different from an empty text body or an empty JSON object.
#[derive(Clone, Debug, PartialEq)]
pub struct ApiResponse {
    pub ok: bool,
    pub status: u16,
    pub body: Option<ResponseBody>,
}

impl ApiResponse {
    /// Shape used when the request never produced a response
    pub fn transport_failure() -> Self {
        Self {
            ok: false,
            status: 0,
            body: None,
        }
    }

    pub fn json(&self) -> Option<&Value> {
        match &self.body {
            Some(ResponseBody::Json(value)) => Some(value),
            _ => None,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match &self.body {
            Some(ResponseBody::Text(text)) => Some(text),
            _ => None,
        }
    }

    /// Field of a JSON object body
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.json().and_then(|v| v.get(key))
    }

    /// String field of a JSON object body
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.field(key).and_then(Value::as_str)
    }

    async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status();
        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("application/json"));

        let body = match response.bytes().await {
            Ok(bytes) if is_json => match serde_json::from_slice::<Value>(&bytes) {
                Ok(value) => Some(ResponseBody::Json(value)),
                Err(e) => {
                    debug!(status = status.as_u16(), error = %e, "Discarding malformed JSON body");
                    None
                }
            },
            Ok(bytes) => Some(ResponseBody::Text(
                String::from_utf8_lossy(&bytes).into_owned(),
            )),
            Err(e) => {
                debug!(status = status.as_u16(), error = %e, "Failed to read response body");
                None
            }
        };

        Self {
            ok: status.is_success(),
            status: status.as_u16(),
            body,
        }
    }
}

/// Client for the chat backend
#[derive(Clone, Debug)]
pub struct ChatApi {
    base_url: String,
    client: reqwest::Client,
    /// Separate client without a total timeout; SSE responses stay open
    stream_client: reqwest::Client,
}

impl ChatApi {
    /// Build a client from configuration
    pub fn new(config: &ClientConfig) -> ApiResult<Self> {
        let base_url = normalize_base_url(&config.api_base)?;
        let connect_timeout = Duration::from_secs(config.connect_timeout_secs);

        let client = reqwest::Client::builder()
            .user_agent(concat!("ragnews/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(connect_timeout)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        let stream_client = reqwest::Client::builder()
            .user_agent(concat!("ragnews/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(connect_timeout)
            .build()?;

        Ok(Self {
            base_url,
            client,
            stream_client,
        })
    }

    /// Build a client with default settings against `base_url`
    pub fn with_base_url(base_url: &str) -> ApiResult<Self> {
        Self::new(&ClientConfig {
            api_base: base_url.to_string(),
            ..ClientConfig::default()
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn session_path(session_id: &str, suffix: &str) -> String {
        format!(
            "/session/{}{}",
            utf8_percent_encode(session_id, PATH_SEGMENT),
            suffix
        )
    }

    /// Issue a request and normalize whatever comes back.
    /// Transport failures become `{ok: false, status: 0, body: None}`.
    pub async fn request(&self, method: Method, path: &str, body: Option<&Value>) -> ApiResponse {
        let mut builder = self.client.request(method.clone(), self.url(path));
        if let Some(body) = body {
            builder = builder.json(body);
        }

        match builder.send().await {
            Ok(response) => {
                let normalized = ApiResponse::from_response(response).await;
                debug!(%method, path, status = normalized.status, "Request completed");
                normalized
            }
            Err(e) => {
                warn!(%method, path, error = %e, "Request failed before a response arrived");
                ApiResponse::transport_failure()
            }
        }
    }

    /// Create a conversation session and return its id.
    ///
    /// This is the one call that fails loudly: a non-2xx status, a missing id
    /// or a transport failure all return `Err`.
    pub async fn create_session(&self) -> ApiResult<String> {
        let response = self.client.post(self.url("/session")).send().await?;
        let status = response.status();

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ApiError::SessionCreation {
                status: status.as_u16(),
                body: bounded_body(&text),
            });
        }

        let parsed = ApiResponse::from_response(response).await;
        parsed
            .str_field("sessionId")
            .or_else(|| parsed.str_field("session_id"))
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .ok_or(ApiError::MissingSessionId {
                status: status.as_u16(),
            })
    }

    pub async fn history(&self, session_id: &str) -> ApiResponse {
        self.request(Method::GET, &Self::session_path(session_id, "/history"), None)
            .await
    }

    pub async fn chat(&self, session_id: &str, message: &str) -> ApiResponse {
        let body = json!({ "message": message });
        self.request(
            Method::POST,
            &Self::session_path(session_id, "/chat"),
            Some(&body),
        )
        .await
    }

    pub async fn clear(&self, session_id: &str) -> ApiResponse {
        self.request(Method::POST, &Self::session_path(session_id, "/clear"), None)
            .await
    }

    pub async fn delete_session(&self, session_id: &str) -> ApiResponse {
        self.request(Method::DELETE, &Self::session_path(session_id, ""), None)
            .await
    }

    pub async fn health(&self) -> ApiResponse {
        self.request(Method::GET, "/health", None).await
    }

    /// Open the server-push channel for `query` within a session.
    ///
    /// Events are yielded as they arrive; the stream ends after a terminal
    /// event or when the server closes the connection.
    pub async fn open_stream(&self, session_id: &str, query: &str) -> ApiResult<ChatStream> {
        let response = self
            .stream_client
            .get(self.url("/chat/stream"))
            .query(&[("session_id", session_id), ("q", query)])
            .header(ACCEPT, "text/event-stream")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Stream(format!(
                "GET /chat/stream returned {}",
                status.as_u16()
            )));
        }

        debug!(session_id, "Stream opened");
        Ok(stream::event_stream(response))
    }
}

fn normalize_base_url(raw: &str) -> ApiResult<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    Url::parse(trimmed).map_err(|e| ApiError::InvalidBaseUrl {
        url: raw.to_string(),
        message: e.to_string(),
    })?;
    Ok(trimmed.to_string())
}

fn bounded_body(text: &str) -> String {
    if text.is_empty() {
        return "no body".to_string();
    }
    if text.chars().count() <= MAX_ERROR_BODY_CHARS {
        return text.to_string();
    }
    let mut bounded: String = text.chars().take(MAX_ERROR_BODY_CHARS).collect();
    bounded.push('…');
    bounded
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn api_for(server: &MockServer) -> ChatApi {
        ChatApi::with_base_url(&server.uri()).unwrap()
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let api = ChatApi::with_base_url("http://localhost:4000/").unwrap();
        assert_eq!(api.base_url(), "http://localhost:4000");
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let err = ChatApi::with_base_url("not a url").unwrap_err();
        assert!(matches!(err, ApiError::InvalidBaseUrl { .. }));
    }

    #[test]
    fn test_session_path_is_percent_encoded() {
        assert_eq!(
            ChatApi::session_path("a b/c", "/history"),
            "/session/a%20b%2Fc/history"
        );
    }

    #[test]
    fn test_bounded_body() {
        assert_eq!(bounded_body(""), "no body");
        assert_eq!(bounded_body("   "), "   ");
        assert_eq!(bounded_body("Internal error"), "Internal error");

        let long = "x".repeat(MAX_ERROR_BODY_CHARS + 10);
        let bounded = bounded_body(&long);
        assert_eq!(bounded.chars().count(), MAX_ERROR_BODY_CHARS + 1);
        assert!(bounded.ends_with('…'));
    }

    #[tokio::test]
    async fn test_json_body_is_parsed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
            .mount(&server)
            .await;

        let response = api_for(&server).await.health().await;
        assert!(response.ok);
        assert_eq!(response.status, 200);
        assert_eq!(response.str_field("status"), Some("ok"));
    }

    #[tokio::test]
    async fn test_text_body_is_returned_raw() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(
                ResponseTemplate::new(503)
                    .insert_header("content-type", "text/plain")
                    .set_body_string("Service unavailable"),
            )
            .mount(&server)
            .await;

        let response = api_for(&server).await.health().await;
        assert!(!response.ok);
        assert_eq!(response.status, 503);
        assert_eq!(response.text(), Some("Service unavailable"));
    }

    #[tokio::test]
    async fn test_malformed_json_yields_null_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw("{not json", "application/json; charset=utf-8"),
            )
            .mount(&server)
            .await;

        let response = api_for(&server).await.health().await;
        assert!(response.ok, "ok must not depend on body parsing");
        assert_eq!(response.body, None);
    }

    #[tokio::test]
    async fn test_empty_text_body_is_not_null() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let response = api_for(&server).await.health().await;
        assert_eq!(response.body, Some(ResponseBody::Text(String::new())));
    }

    #[tokio::test]
    async fn test_transport_failure_is_soft() {
        // Nothing listens on the reserved port 9 locally
        let api = ChatApi::with_base_url("http://127.0.0.1:9").unwrap();
        let response = api.history("abc").await;
        assert_eq!(response, ApiResponse::transport_failure());
    }

    #[tokio::test]
    async fn test_create_session_returns_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/session"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"sessionId": "abc123"})))
            .mount(&server)
            .await;

        let id = api_for(&server).await.create_session().await.unwrap();
        assert_eq!(id, "abc123");
    }

    #[tokio::test]
    async fn test_create_session_failure_is_loud() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/session"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = api_for(&server).await.create_session().await.unwrap_err();
        assert_eq!(err.to_string(), "POST /session failed 500: no body");
        assert_eq!(err.status(), Some(500));
    }

    #[tokio::test]
    async fn test_create_session_without_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/session"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"sessionId": ""})))
            .mount(&server)
            .await;

        let err = api_for(&server).await.create_session().await.unwrap_err();
        assert!(matches!(err, ApiError::MissingSessionId { status: 200 }));
    }

    #[tokio::test]
    async fn test_chat_posts_message_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/session/s1/chat"))
            .and(body_json(json!({"message": "Who won?"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"answer": "Nobody."})))
            .expect(1)
            .mount(&server)
            .await;

        let response = api_for(&server).await.chat("s1", "Who won?").await;
        assert_eq!(response.str_field("answer"), Some("Nobody."));
    }

    #[tokio::test]
    async fn test_delete_session_uses_delete_verb() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/session/s1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let response = api_for(&server).await.delete_session("s1").await;
        assert!(response.ok);
    }
}
