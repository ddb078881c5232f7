use std::io::stdout;
use std::sync::mpsc::Receiver;
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::event::{
    DisableMouseCapture, EnableMouseCapture, Event, EventStream, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers, MouseEventKind,
};
use crossterm::execute;
use futures::StreamExt;
use ragnews_core::{
    ChatApi, ChatEvent, ChatSnapshot, ClientConfig, ConversationController, ScrollAction,
    ScrollTracker,
};
use ratatui::DefaultTerminal;
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::Block;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info};
use tui_textarea::TextArea;

use crate::logging::LogNotice;
use crate::ui;

/// Redraw cadence for relative times and the typing indicator
const TICK: Duration = Duration::from_millis(250);

/// Rows moved per mouse wheel step
const WHEEL_STEP: usize = 3;

/// Run the interactive chat until the user quits
pub async fn run(config: ClientConfig, notices: Receiver<LogNotice>) -> Result<()> {
    let api = ChatApi::new(&config).context("Failed to build API client")?;
    let (controller, events) = ConversationController::new(api);

    let booting = controller.clone();
    tokio::spawn(async move { booting.bootstrap().await });

    let mut terminal = ratatui::init();
    let result = match execute!(stdout(), EnableMouseCapture) {
        Ok(()) => {
            App::new(controller.clone(), events, notices)
                .event_loop(&mut terminal)
                .await
        }
        Err(e) => Err(e).context("Failed to enable mouse capture"),
    };
    let _ = execute!(stdout(), DisableMouseCapture);
    ratatui::restore();

    controller.shutdown();
    if config.delete_session_on_exit {
        controller.end_session().await;
    }
    info!("Chat closed");
    result
}

/// View-local state of the chat screen
pub struct App {
    controller: ConversationController,
    events: UnboundedReceiver<ChatEvent>,
    notices: Receiver<LogNotice>,
    pub(crate) snapshot: ChatSnapshot,
    pub(crate) input: TextArea<'static>,
    pub(crate) scroll: ScrollTracker,
    /// First visible transcript row
    pub(crate) offset: usize,
    content_height: usize,
    viewport_height: usize,
    pin_to_bottom: bool,
    /// Latest warning or error from the log
    pub(crate) notice: Option<LogNotice>,
    pub(crate) ticks: usize,
    /// Opened on first copy; stays `None` where no clipboard is available
    clipboard: Option<arboard::Clipboard>,
    should_quit: bool,
}

impl App {
    pub fn new(
        controller: ConversationController,
        events: UnboundedReceiver<ChatEvent>,
        notices: Receiver<LogNotice>,
    ) -> Self {
        let snapshot = controller.snapshot();
        let mut app = Self {
            controller,
            events,
            notices,
            snapshot,
            input: TextArea::default(),
            scroll: ScrollTracker::default(),
            offset: 0,
            content_height: 0,
            viewport_height: 0,
            pin_to_bottom: false,
            notice: None,
            ticks: 0,
            clipboard: None,
            should_quit: false,
        };
        app.style_input();
        app
    }

    async fn event_loop(mut self, terminal: &mut DefaultTerminal) -> Result<()> {
        let mut terminal_events = EventStream::new();
        let mut ticker = tokio::time::interval(TICK);

        while !self.should_quit {
            terminal.draw(|frame| ui::draw(frame, &mut self))?;

            tokio::select! {
                maybe_event = terminal_events.next() => match maybe_event {
                    Some(Ok(event)) => self.handle_terminal_event(event),
                    Some(Err(e)) => return Err(e).context("Failed to read terminal event"),
                    None => self.should_quit = true,
                },
                Some(event) = self.events.recv() => {
                    self.handle_chat_event(event);
                    while let Ok(event) = self.events.try_recv() {
                        self.handle_chat_event(event);
                    }
                }
                _ = ticker.tick() => {
                    self.ticks = self.ticks.wrapping_add(1);
                    self.drain_notices();
                }
            }
        }

        Ok(())
    }

    fn drain_notices(&mut self) {
        while let Ok(notice) = self.notices.try_recv() {
            self.notice = Some(notice);
        }
    }

    pub(crate) fn handle_chat_event(&mut self, event: ChatEvent) {
        match event {
            ChatEvent::StateChanged => {
                self.snapshot = self.controller.snapshot();
                self.style_input();
            }
            ChatEvent::MessagesChanged => {
                self.snapshot = self.controller.snapshot();
                if let ScrollAction::ScrollToBottom(_) = self.scroll.on_messages_changed() {
                    self.pin_to_bottom = true;
                }
            }
            ChatEvent::FocusInput => self.style_input(),
            ChatEvent::ScrollToBottom(behavior) => {
                debug!(?behavior, "Scrolling to latest message");
                self.pin_to_bottom = true;
            }
        }
    }

    fn handle_terminal_event(&mut self, event: Event) {
        match event {
            Event::Key(key) if key.kind == KeyEventKind::Press => self.handle_key(key),
            Event::Mouse(mouse) => match mouse.kind {
                MouseEventKind::ScrollUp => self.scroll_up(WHEEL_STEP),
                MouseEventKind::ScrollDown => self.scroll_down(WHEEL_STEP),
                _ => {}
            },
            _ => {}
        }
    }

    pub(crate) fn handle_key(&mut self, key: KeyEvent) {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Esc => self.should_quit = true,
            KeyCode::Char('c') if ctrl => self.should_quit = true,
            KeyCode::Char('r') if ctrl => self.reset(),
            KeyCode::Char('y') if ctrl => self.copy_latest_answer(),
            KeyCode::Enter => self.submit(),
            KeyCode::PageUp => self.scroll_up(self.page()),
            KeyCode::PageDown => self.scroll_down(self.page()),
            KeyCode::End => self.jump_to_latest(),
            _ => {
                if self.snapshot.input_enabled() {
                    self.input.input(key);
                }
            }
        }
    }

    fn submit(&mut self) {
        let text = self.input.lines().join("\n");
        if text.trim().is_empty() || !self.snapshot.input_enabled() {
            return;
        }

        if let Some(pending) = self.controller.begin_send(&text) {
            self.input = TextArea::default();
            self.notice = None;
            self.style_input();
            tokio::spawn(pending.complete());
        }
    }

    fn reset(&mut self) {
        if !self.snapshot.can_reset() {
            return;
        }
        self.notice = None;
        let controller = self.controller.clone();
        tokio::spawn(async move {
            controller.clear().await;
        });
    }

    /// Copy the newest assistant answer; clipboard failures are ignored
    fn copy_latest_answer(&mut self) {
        let Some(text) = self.snapshot.latest_answer().map(str::to_string) else {
            return;
        };

        if self.clipboard.is_none() {
            match arboard::Clipboard::new() {
                Ok(clipboard) => self.clipboard = Some(clipboard),
                Err(e) => {
                    debug!(error = %e, "Clipboard unavailable");
                    return;
                }
            }
        }
        if let Some(clipboard) = self.clipboard.as_mut() {
            match clipboard.set_text(text) {
                Ok(()) => debug!("Copied answer to clipboard"),
                Err(e) => debug!(error = %e, "Clipboard copy failed"),
            }
        }
    }

    fn page(&self) -> usize {
        self.viewport_height.saturating_sub(1).max(1)
    }

    fn max_offset(&self) -> usize {
        self.content_height.saturating_sub(self.viewport_height)
    }

    fn scroll_up(&mut self, rows: usize) {
        self.offset = self.offset.saturating_sub(rows);
        self.track_scroll();
    }

    fn scroll_down(&mut self, rows: usize) {
        self.offset = self.offset.saturating_add(rows).min(self.max_offset());
        self.track_scroll();
    }

    fn jump_to_latest(&mut self) {
        if let ScrollAction::ScrollToBottom(_) = self.scroll.jump_to_latest() {
            self.pin_to_bottom = true;
        }
    }

    fn track_scroll(&mut self) {
        self.scroll
            .on_scroll(self.content_height, self.offset, self.viewport_height);
    }

    /// Record the transcript geometry of the frame being drawn and settle the
    /// scroll position for it.
    pub(crate) fn set_geometry(&mut self, content_height: usize, viewport_height: usize) {
        self.content_height = content_height;
        self.viewport_height = viewport_height;

        if self.pin_to_bottom {
            self.pin_to_bottom = false;
            self.offset = self.max_offset();
            self.track_scroll();
        } else if self.offset > self.max_offset() {
            self.offset = self.max_offset();
            self.track_scroll();
        }
    }

    fn style_input(&mut self) {
        let enabled = self.snapshot.input_enabled();
        let (title, border) = if self.snapshot.sending {
            (" Sending… ", Color::Yellow)
        } else if enabled {
            (" Message ", Color::Cyan)
        } else {
            (" Message ", Color::DarkGray)
        };

        self.input.set_block(
            Block::bordered()
                .title(title)
                .border_style(Style::default().fg(border)),
        );
        self.input.set_placeholder_text(if enabled {
            ui::PLACEHOLDER_READY
        } else {
            ui::PLACEHOLDER_BOOTING
        });
        self.input.set_cursor_line_style(Style::default());
        self.input.set_cursor_style(if enabled {
            Style::default().add_modifier(Modifier::REVERSED)
        } else {
            Style::default()
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragnews_core::Role;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn offline_app() -> App {
        let api = ChatApi::with_base_url("http://127.0.0.1:9").unwrap();
        let (controller, events) = ConversationController::new(api);
        let (_tx, notices) = std::sync::mpsc::sync_channel(1);
        App::new(controller, events, notices)
    }

    async fn ready_app(server: &MockServer) -> App {
        Mock::given(method("POST"))
            .and(path("/session"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"sessionId": "s1"})))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/session/s1/history"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"messages": []})))
            .mount(server)
            .await;

        let api = ChatApi::with_base_url(&server.uri()).unwrap();
        let (controller, events) = ConversationController::new(api);
        controller.bootstrap().await;
        let (_tx, notices) = std::sync::mpsc::sync_channel(1);
        let mut app = App::new(controller, events, notices);
        while let Ok(event) = app.events.try_recv() {
            app.handle_chat_event(event);
        }
        app
    }

    #[test]
    fn test_typing_ignored_without_session() {
        let mut app = offline_app();
        app.handle_key(key(KeyCode::Char('x')));
        assert_eq!(app.input.lines(), [""]);
    }

    #[test]
    fn test_copy_without_answer_keeps_input() {
        let mut app = offline_app();
        app.handle_key(KeyEvent::new(KeyCode::Char('y'), KeyModifiers::CONTROL));
        assert!(app.clipboard.is_none());
        assert_eq!(app.input.lines(), [""]);
        assert!(!app.should_quit);
    }

    #[test]
    fn test_quit_keys() {
        let mut app = offline_app();
        app.handle_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL));
        assert!(app.should_quit);

        let mut app = offline_app();
        app.handle_key(key(KeyCode::Esc));
        assert!(app.should_quit);
    }

    #[test]
    fn test_pinned_geometry_scrolls_to_bottom() {
        let mut app = offline_app();
        app.handle_chat_event(ChatEvent::ScrollToBottom(ragnews_core::ScrollBehavior::Instant));
        app.set_geometry(50, 10);
        assert_eq!(app.offset, 40);
        assert!(app.scroll.at_bottom());
    }

    #[test]
    fn test_scrolling_up_stops_following() {
        let mut app = offline_app();
        app.set_geometry(50, 10);
        app.offset = 40;

        app.handle_key(key(KeyCode::PageUp));
        assert_eq!(app.offset, 31);
        assert!(!app.scroll.at_bottom());

        app.handle_chat_event(ChatEvent::MessagesChanged);
        app.set_geometry(60, 10);
        assert_eq!(app.offset, 31, "must not jump while reading older messages");

        app.handle_key(key(KeyCode::End));
        app.set_geometry(60, 10);
        assert_eq!(app.offset, 50);
        assert!(app.scroll.at_bottom());
    }

    #[test]
    fn test_shrinking_content_clamps_offset() {
        let mut app = offline_app();
        app.set_geometry(50, 10);
        app.offset = 40;
        app.set_geometry(20, 10);
        assert_eq!(app.offset, 10);
    }

    #[tokio::test]
    async fn test_enter_sends_and_clears_input() {
        let server = MockServer::start().await;
        let mut app = ready_app(&server).await;
        Mock::given(method("POST"))
            .and(path("/session/s1/chat"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"answer": "Markets rallied."}))
                    .set_delay(Duration::from_millis(100)),
            )
            .mount(&server)
            .await;

        app.input.insert_str("How did markets do?");
        app.handle_key(key(KeyCode::Enter));

        assert_eq!(app.input.lines(), [""]);
        while let Ok(event) = app.events.try_recv() {
            app.handle_chat_event(event);
        }
        assert!(app.snapshot.sending);
        assert_eq!(app.snapshot.messages.len(), 1);
        assert_eq!(app.snapshot.messages[0].role, Role::User);
        assert_eq!(app.snapshot.messages[0].content, "How did markets do?");

        let event = app.events.recv().await.unwrap();
        app.handle_chat_event(event);
        assert_eq!(app.snapshot.messages.len(), 2);
        assert_eq!(app.snapshot.messages[1].content, "Markets rallied.");
    }

    #[tokio::test]
    async fn test_enter_with_blank_input_keeps_state() {
        let server = MockServer::start().await;
        let mut app = ready_app(&server).await;

        app.input.insert_str("   ");
        app.handle_key(key(KeyCode::Enter));

        assert_eq!(app.input.lines(), ["   "]);
        assert!(app.controller.snapshot().messages.is_empty());
    }
}
