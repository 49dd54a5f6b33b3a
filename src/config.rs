//! Runtime configuration shared by every handler.

use std::path::PathBuf;
use std::time::Duration;

use crate::constants;

/// Everything the router needs to serve requests.
///
/// `Default` reads the environment-backed values in [`constants`], so a
/// test can override just the fields it cares about:
///
/// ```ignore
/// let config = RelayConfig { api_url: mock.uri(), ..RelayConfig::default() };
/// ```
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub api_key: String,
    /// Full URL of the upstream `chat/completions` endpoint.
    pub api_url: String,
    pub model: String,
    /// Sent as `HTTP-Referer`; OpenRouter uses it for app attribution.
    pub referer: String,
    /// Sent as `X-Title`.
    pub title: String,
    pub system_prompt: String,
    pub upload_dir: PathBuf,
    pub templates_dir: PathBuf,
    pub static_dir: PathBuf,
    pub max_body_bytes: usize,
    /// Cap on non-system messages kept per conversation. `None` keeps everything.
    pub max_history: Option<usize>,
    /// Bounds connecting, waiting for response headers, and each body read.
    pub request_timeout: Duration,
    pub probe_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            api_key: constants::OPENROUTER_API_KEY.clone(),
            api_url: constants::OPENROUTER_URL.clone(),
            model: constants::CHAT_MODEL.clone(),
            referer: constants::HTTP_REFERER.clone(),
            title: constants::APP_TITLE.clone(),
            system_prompt: constants::SYSTEM_PROMPT.clone(),
            upload_dir: PathBuf::from(constants::UPLOAD_DIR.as_str()),
            templates_dir: PathBuf::from(constants::TEMPLATES_DIR.as_str()),
            static_dir: PathBuf::from(constants::STATIC_DIR.as_str()),
            max_body_bytes: *constants::MAX_BODY_BYTES,
            max_history: *constants::MAX_HISTORY,
            request_timeout: Duration::from_secs(constants::STREAM_TIMEOUT_SECS),
            probe_timeout: Duration::from_secs(constants::PROBE_TIMEOUT_SECS),
        }
    }
}

impl RelayConfig {
    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}
