use std::fmt;
use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Mutex;
use std::sync::mpsc::{Receiver, SyncSender, sync_channel};

use anyhow::{Context, Result};
use ragnews_core::ClientConfig;
use tracing::{
    Level, Subscriber,
    field::{Field, Visit},
};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Pending notices kept before new ones are dropped
const NOTICE_CAPACITY: usize = 256;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoticeLevel {
    Warning,
    Error,
}

/// A WARN or ERROR event, reduced to what the status line shows
#[derive(Clone, Debug)]
pub struct LogNotice {
    pub level: NoticeLevel,
    pub message: String,
}

impl LogNotice {
    pub fn is_error(&self) -> bool {
        self.level == NoticeLevel::Error
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: Option<String>,
    status: Option<String>,
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        match field.name() {
            "message" => self.message = Some(format!("{:?}", value)),
            "status" => self.status = Some(format!("{:?}", value)),
            _ => {}
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        }
    }
}

/// Layer forwarding WARN and ERROR events to the chat view's status line
pub struct NoticeLayer {
    sender: SyncSender<LogNotice>,
}

impl NoticeLayer {
    pub fn new() -> (Self, Receiver<LogNotice>) {
        Self::with_capacity(NOTICE_CAPACITY)
    }

    fn with_capacity(capacity: usize) -> (Self, Receiver<LogNotice>) {
        let (tx, rx) = sync_channel(capacity);
        (Self { sender: tx }, rx)
    }
}

impl<S> Layer<S> for NoticeLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        let metadata = event.metadata();
        let level = match *metadata.level() {
            Level::ERROR => NoticeLevel::Error,
            Level::WARN => NoticeLevel::Warning,
            _ => return,
        };

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let mut message = visitor.message.unwrap_or_default();
        if let Some(status) = visitor.status {
            message = format!("{} (status {})", message, status);
        }

        // Drop when full; the view only shows the latest notice anyway
        let _ = self.sender.try_send(LogNotice {
            level,
            message,
        });
    }
}

/// `RUST_LOG` when set, otherwise the configured directives, otherwise `info`
fn env_filter(config: &ClientConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(config.log_filter.as_deref().unwrap_or("info"))
    })
}

/// Logging for the interactive view: formatted output goes to the log file so
/// the terminal stays intact, warnings and errors also reach the status line.
pub fn init_for_tui(config: &ClientConfig) -> Result<Receiver<LogNotice>> {
    let file_layer = match config.log_path() {
        Some(path) => Some(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(open_log_file(&path)?)),
        ),
        None => None,
    };
    let (notices, rx) = NoticeLayer::new();

    tracing_subscriber::registry()
        .with(env_filter(config))
        .with(file_layer)
        .with(notices)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(rx)
}

/// Logging for one-shot commands: everything to stderr
pub fn init_for_command(config: &ClientConfig) {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(config))
        .with_writer(std::io::stderr)
        .init();
}

fn open_log_file(path: &Path) -> Result<fs::File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))
}
