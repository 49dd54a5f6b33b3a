//! relaychat: a small web chat front-end that relays messages to a hosted
//! LLM completion API and streams the reply back to the browser, plus a
//! file upload endpoint with inline image previews.

pub mod chat;
pub mod config;
pub mod constants;
pub mod error;
pub mod llm_interaction;
pub mod relay;
pub mod sse;
pub mod upload;
pub mod web_server;
