//! Client-side core of the RAG news chat client.
//!
//! Everything here is UI-agnostic: the HTTP facade for the question-answering
//! backend, the message models, the conversation controller that owns the
//! session/message lifecycle, the auto-scroll policy and the optional
//! server-push stream. Front ends render [`controller::ChatSnapshot`]s and
//! drive the controller through its named operations.

pub mod api;
pub mod config;
pub mod controller;
pub mod error;
pub mod models;
pub mod reply;
pub mod scroll;
pub mod store;
pub mod stream;

pub use api::{ApiResponse, ChatApi, ResponseBody};
pub use config::ClientConfig;
pub use controller::{BootState, ChatEvent, ChatSnapshot, ConversationController, PendingSend};
pub use error::{ApiError, ApiResult, ConfigError};
pub use models::{Citation, Message, Role, time_ago};
pub use scroll::{ScrollAction, ScrollBehavior, ScrollTracker};
pub use store::ConversationStore;
pub use stream::{ChatStream, StreamEvent};
