//! Chat relay: forwards a message upstream and pumps the streamed reply
//! back to the caller as [`RelayEvent`]s.

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use crate::chat::{Message, SessionStore};
use crate::error::RelayError;
use crate::llm_interaction::UpstreamClient;
use crate::sse::{parse_line, Frame, LineSplitter, RelayEvent};

const EVENT_BUFFER: usize = 64;

#[derive(Debug, Clone)]
pub struct Relay {
    upstream: UpstreamClient,
    sessions: SessionStore,
}

/// Counters for one relayed reply.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PumpStats {
    pub fragments: usize,
    pub skipped_frames: usize,
}

impl Relay {
    pub fn new(upstream: UpstreamClient, sessions: SessionStore) -> Self {
        Self { upstream, sessions }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn upstream(&self) -> &UpstreamClient {
        &self.upstream
    }

    /// Start relaying `message` for `session_id`.
    ///
    /// An empty message fails with [`RelayError::Validation`] and touches no
    /// state. Otherwise the user message is recorded before this returns and
    /// the upstream call runs on a spawned task feeding the returned stream.
    pub async fn start(
        &self,
        session_id: &str,
        message: &str,
    ) -> Result<ReceiverStream<RelayEvent>, RelayError> {
        if message.is_empty() {
            return Err(RelayError::Validation);
        }

        let history = self.sessions.begin_turn(session_id, message).await;
        info!(session = session_id, history = history.len(), "Relaying chat message");

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let relay = self.clone();
        let session_id = session_id.to_string();
        tokio::spawn(async move {
            relay.pump(session_id, history, tx).await;
        });

        Ok(ReceiverStream::new(rx))
    }

    async fn pump(
        &self,
        session_id: String,
        history: Vec<Message>,
        tx: mpsc::Sender<RelayEvent>,
    ) {
        let response = match self.upstream.open_stream(&history).await {
            Ok(response) => response,
            Err(err) => {
                let _ = tx.send(RelayEvent::Error(err)).await;
                return;
            }
        };

        let mut body = response.bytes_stream();
        let mut splitter = LineSplitter::default();
        let mut reply = String::new();
        let mut stats = PumpStats::default();

        loop {
            let next = tokio::time::timeout(self.upstream.read_timeout(), body.next()).await;
            let chunk = match next {
                Err(_) => {
                    warn!(session = %session_id, "Upstream stream stalled");
                    let _ = tx.send(RelayEvent::Error(RelayError::Timeout)).await;
                    return;
                }
                Ok(None) => break,
                Ok(Some(Err(e))) => {
                    warn!(session = %session_id, error = %e, "Upstream stream failed");
                    let _ = tx.send(RelayEvent::Error(RelayError::from_transport(&e))).await;
                    return;
                }
                Ok(Some(Ok(chunk))) => chunk,
            };

            for line in splitter.push(&chunk) {
                if !forward_line(&line, &mut reply, &mut stats, &tx).await {
                    debug!(session = %session_id, "Caller went away, dropping reply");
                    return;
                }
            }
        }

        if let Some(line) = splitter.finish() {
            if !forward_line(&line, &mut reply, &mut stats, &tx).await {
                return;
            }
        }

        self.complete(&session_id, reply, stats, &tx).await;
    }

    // Stores the reply and sends the done marker, unless the caller is gone.
    async fn complete(
        &self,
        session_id: &str,
        reply: String,
        stats: PumpStats,
        tx: &mpsc::Sender<RelayEvent>,
    ) -> bool {
        if tx.is_closed() {
            debug!(session = session_id, "Caller went away, dropping reply");
            return false;
        }
        let stored = self.sessions.finish_turn(session_id, reply).await;
        info!(
            session = session_id,
            fragments = stats.fragments,
            skipped_frames = stats.skipped_frames,
            stored,
            "Relay finished"
        );
        let _ = tx.send(RelayEvent::Done).await;
        stored
    }
}

// Returns false once the receiver is gone.
async fn forward_line(
    line: &str,
    reply: &mut String,
    stats: &mut PumpStats,
    tx: &mpsc::Sender<RelayEvent>,
) -> bool {
    match parse_line(line) {
        Frame::Content(fragment) => {
            reply.push_str(&fragment);
            stats.fragments += 1;
            tx.send(RelayEvent::Content(fragment)).await.is_ok()
        }
        Frame::Malformed(reason) => {
            stats.skipped_frames += 1;
            debug!(%reason, "Skipping malformed upstream frame");
            true
        }
        Frame::Ignored | Frame::Empty => true,
    }
}
