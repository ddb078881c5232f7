use std::io::Write;

use anyhow::{Context, Result, bail};
use futures::StreamExt;
use ragnews_core::{ApiResponse, ChatApi, ClientConfig, StreamEvent};
use tracing::{debug, info, warn};

/// Create a session, stream the answer to `query` to stdout, end the session
pub async fn stream(config: &ClientConfig, query: &str) -> Result<()> {
    let api = ChatApi::new(config).context("Failed to build API client")?;
    let session_id = api
        .create_session()
        .await
        .context("Failed to create session")?;
    info!(session_id = %session_id, "Session created");

    let mut stdout = std::io::stdout();
    let result = stream_answer(&api, &session_id, query, &mut stdout).await;

    if config.delete_session_on_exit {
        let response = api.delete_session(&session_id).await;
        if !response.ok {
            warn!(status = response.status, "Session delete failed");
        }
    }
    result
}

async fn stream_answer<W: Write>(
    api: &ChatApi,
    session_id: &str,
    query: &str,
    out: &mut W,
) -> Result<()> {
    let mut events = api
        .open_stream(session_id, query)
        .await
        .context("Failed to open stream")?;

    let mut printed = false;
    while let Some(event) = events.next().await {
        let event = event.context("Stream interrupted")?;
        if let Some(delta) = handle_event(&event)? {
            write!(out, "{}", delta)?;
            out.flush()?;
            printed = true;
        }
    }

    if printed {
        writeln!(out)?;
    }
    Ok(())
}

/// Text to print for one event; server-reported errors abort the command
fn handle_event(event: &StreamEvent) -> Result<Option<String>> {
    if event.is_error() {
        bail!("Server reported an error: {}", event.data);
    }
    if event.is_terminal() {
        debug!(event = %event.event, "Stream finished");
    }
    Ok(event.text_delta())
}

/// `GET /health`; fails when the backend does not answer with 2xx
pub async fn health(config: &ClientConfig) -> Result<()> {
    let api = ChatApi::new(config).context("Failed to build API client")?;
    let response = api.health().await;
    println!("{}", health_summary(api.base_url(), &response));

    if !response.ok {
        bail!("Backend at {} is not healthy", api.base_url());
    }
    Ok(())
}

fn health_summary(base_url: &str, response: &ApiResponse) -> String {
    if response.status == 0 {
        return format!("{}: unreachable", base_url);
    }
    let detail = response
        .str_field("status")
        .or_else(|| response.text().filter(|t| !t.trim().is_empty()))
        .unwrap_or("");
    format!("{}: {} {}", base_url, response.status, detail)
        .trim_end()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragnews_core::ResponseBody;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_error_event_aborts() {
        assert!(handle_event(&StreamEvent::new("error", "index offline")).is_err());
        assert_eq!(
            handle_event(&StreamEvent::new("message", "Hello")).unwrap(),
            Some("Hello".to_string())
        );
        assert_eq!(handle_event(&StreamEvent::new("done", "")).unwrap(), None);
    }

    #[test]
    fn test_health_summary() {
        let ok = ApiResponse {
            ok: true,
            status: 200,
            body: Some(ResponseBody::Json(json!({"status": "ok"}))),
        };
        assert_eq!(health_summary("http://localhost:4000", &ok), "http://localhost:4000: 200 ok");
        assert_eq!(
            health_summary("http://localhost:4000", &ApiResponse::transport_failure()),
            "http://localhost:4000: unreachable"
        );
    }

    #[tokio::test]
    async fn test_stream_answer_prints_deltas() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/chat/stream"))
            .and(query_param("session_id", "s1"))
            .and(query_param("q", "oil?"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(
                        "data: {\"token\":\"Oil \"}\n\ndata: {\"token\":\"fell.\"}\n\nevent: done\ndata: [DONE]\n\n",
                        "text/event-stream",
                    ),
            )
            .mount(&server)
            .await;

        let api = ChatApi::with_base_url(&server.uri()).unwrap();
        let mut out = Vec::new();
        stream_answer(&api, "s1", "oil?", &mut out).await.unwrap();

        assert_eq!(String::from_utf8(out).unwrap(), "Oil fell.\n");
    }
}
