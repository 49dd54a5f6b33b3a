// Constants loaded from the environment (after dotenvy has read .env) or fixed defaults.

use std::env;

/// Hard ceiling on a request body, uploads included.
pub const DEFAULT_MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Connect and per-read timeout for the streaming chat call.
pub const STREAM_TIMEOUT_SECS: u64 = 30;

/// Timeout for the one-shot credential probe.
pub const PROBE_TIMEOUT_SECS: u64 = 10;

pub const PROBE_MAX_TOKENS: u32 = 10;
pub const PROBE_PROMPT: &str = "Hello, this is a test.";

/// Extensions that get an inline data-URL preview after upload.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp"];

/// Header carrying the caller's conversation id.
pub const SESSION_HEADER: &str = "x-session-id";
pub const DEFAULT_SESSION: &str = "default";

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant. \
Keep your responses short, helpful, and focused. Respond in real time. \
Provide insight and ideas when needed.";

lazy_static::lazy_static! {
    pub static ref OPENROUTER_API_KEY: String = env::var("OPENROUTER_API_KEY").unwrap_or_default();
    pub static ref OPENROUTER_URL: String = env::var("OPENROUTER_URL")
        .unwrap_or_else(|_| "https://openrouter.ai/api/v1/chat/completions".to_string());
    pub static ref CHAT_MODEL: String = env::var("RELAYCHAT_MODEL")
        .unwrap_or_else(|_| "mistralai/mistral-7b-instruct:free".to_string());
    pub static ref HTTP_REFERER: String = env::var("RELAYCHAT_REFERER")
        .unwrap_or_else(|_| "http://localhost:5000/".to_string());
    pub static ref APP_TITLE: String = env::var("RELAYCHAT_TITLE").unwrap_or_else(|_| "AI Chat App".to_string());
    pub static ref SYSTEM_PROMPT: String = env::var("RELAYCHAT_SYSTEM_PROMPT")
        .unwrap_or_else(|_| DEFAULT_SYSTEM_PROMPT.to_string());
    pub static ref UPLOAD_DIR: String = env::var("RELAYCHAT_UPLOAD_DIR").unwrap_or_else(|_| "uploads".to_string());
    pub static ref TEMPLATES_DIR: String = env::var("RELAYCHAT_TEMPLATES_DIR").unwrap_or_else(|_| "templates".to_string());
    pub static ref STATIC_DIR: String = env::var("RELAYCHAT_STATIC_DIR").unwrap_or_else(|_| "static".to_string());
    // Unset or unparsable means unbounded history.
    pub static ref MAX_HISTORY: Option<usize> = env::var("RELAYCHAT_MAX_HISTORY")
        .ok()
        .and_then(|v| v.trim().parse().ok());
    pub static ref MAX_BODY_BYTES: usize = env::var("RELAYCHAT_MAX_BODY_BYTES")
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(DEFAULT_MAX_BODY_BYTES);
}
