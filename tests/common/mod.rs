#![allow(
    dead_code,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
//! Shared test utilities for lobby sync integration tests.
//!
//! Provides a scripted [`MockMatchChannel`] for driving the lobby core
//! directly, and a channel-backed [`MockTransport`] + [`MockServer`] pair for
//! exercising [`TransportMatchChannel`](lobby_sync_client::TransportMatchChannel).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use lobby_sync_client::{
    ChannelState, ClientMessage, LobbyError, LobbyMember, MatchChannel, MatchId, MatchPush,
    MatchSnapshot, PushSink, Result, ServerMessage, ServiceChannel, Transport, UserId,
};
use tokio::sync::mpsc;

// ── MockMatchChannel ────────────────────────────────────────────────

/// A call observed by [`MockMatchChannel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    CreateMatch(UserId),
    JoinMatch(UserId, String),
    Subscribe(MatchId),
    Unsubscribe(MatchId),
    LeaveMatch(MatchId, UserId),
    Close,
    Abort,
}

impl Call {
    /// Returns `true` for calls that would reach the remote service.
    pub fn is_request(&self) -> bool {
        !matches!(self, Self::Close | Self::Abort)
    }
}

/// Shared view of a [`MockMatchChannel`], kept by the test after the channel
/// itself has been moved into the lobby.
#[derive(Clone)]
pub struct MockHandle {
    calls: Arc<StdMutex<Vec<Call>>>,
    sink: Arc<StdMutex<Option<PushSink>>>,
    state: Arc<StdMutex<ChannelState>>,
}

impl MockHandle {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn requests(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_request).collect()
    }

    pub fn state(&self) -> ChannelState {
        *self.state.lock().unwrap()
    }

    /// Deliver a push through the attached sink, as the remote side would.
    /// Returns `false` when no sink is attached or the sink discarded it.
    pub fn push(&self, push: MatchPush) -> bool {
        match self.sink.lock().unwrap().as_ref() {
            Some(sink) => sink.deliver(push),
            None => false,
        }
    }
}

/// A scripted [`MatchChannel`]. Every call succeeds unless a failure was
/// scripted for it.
pub struct MockMatchChannel {
    handle: MockHandle,
    snapshot: MatchSnapshot,
    pub fail_create: Option<fn() -> LobbyError>,
    pub fail_join: Option<fn() -> LobbyError>,
    pub fail_subscribe: Option<fn() -> LobbyError>,
    pub fail_unsubscribe: Option<fn() -> LobbyError>,
    pub fail_leave: Option<fn() -> LobbyError>,
    pub leave_result: bool,
}

impl MockMatchChannel {
    /// A channel whose create/join calls answer with `snapshot`.
    pub fn new(snapshot: MatchSnapshot) -> (Self, MockHandle) {
        let handle = MockHandle {
            calls: Arc::new(StdMutex::new(Vec::new())),
            sink: Arc::new(StdMutex::new(None)),
            state: Arc::new(StdMutex::new(ChannelState::Open)),
        };
        let channel = Self {
            handle: handle.clone(),
            snapshot,
            fail_create: None,
            fail_join: None,
            fail_subscribe: None,
            fail_unsubscribe: None,
            fail_leave: None,
            leave_result: true,
        };
        (channel, handle)
    }

    fn record(&self, call: Call) {
        self.handle.calls.lock().unwrap().push(call);
    }

    fn set_state(&self, state: ChannelState) {
        *self.handle.state.lock().unwrap() = state;
    }

    /// Turn a scripted failure into an error, faulting on transport errors.
    fn scripted(&self, failure: Option<fn() -> LobbyError>) -> Result<()> {
        match failure {
            None => Ok(()),
            Some(make) => {
                let err = make();
                if err.is_transport_failure() {
                    self.set_state(ChannelState::Faulted);
                }
                Err(err)
            }
        }
    }
}

#[async_trait]
impl ServiceChannel for MockMatchChannel {
    fn state(&self) -> ChannelState {
        self.handle.state()
    }

    async fn close(&mut self) -> Result<()> {
        self.record(Call::Close);
        self.set_state(ChannelState::Closed);
        Ok(())
    }

    fn abort(&mut self) {
        self.record(Call::Abort);
        self.set_state(ChannelState::Closed);
    }
}

#[async_trait]
impl MatchChannel for MockMatchChannel {
    async fn create_match(&mut self, profile_id: UserId) -> Result<MatchSnapshot> {
        self.record(Call::CreateMatch(profile_id));
        self.scripted(self.fail_create)?;
        Ok(self.snapshot.clone())
    }

    async fn join_match(&mut self, user_id: UserId, code: &str) -> Result<MatchSnapshot> {
        self.record(Call::JoinMatch(user_id, code.to_owned()));
        self.scripted(self.fail_join)?;
        Ok(self.snapshot.clone())
    }

    async fn subscribe(&mut self, match_id: MatchId) -> Result<()> {
        self.record(Call::Subscribe(match_id));
        self.scripted(self.fail_subscribe)
    }

    async fn unsubscribe(&mut self, match_id: MatchId) -> Result<()> {
        self.record(Call::Unsubscribe(match_id));
        self.scripted(self.fail_unsubscribe)
    }

    async fn leave_match(&mut self, match_id: MatchId, user_id: UserId) -> Result<bool> {
        self.record(Call::LeaveMatch(match_id, user_id));
        self.scripted(self.fail_leave)?;
        Ok(self.leave_result)
    }

    fn attach_push_sink(&mut self, sink: PushSink) {
        *self.handle.sink.lock().unwrap() = Some(sink);
    }
}

// ── MockTransport ───────────────────────────────────────────────────

/// A channel-based mock transport. The far end is a [`MockServer`].
pub struct MockTransport {
    outbound: mpsc::UnboundedSender<String>,
    inbound: mpsc::UnboundedReceiver<Result<String>>,
    closed: Arc<AtomicBool>,
}

/// The server side of a [`MockTransport`].
pub struct MockServer {
    requests: mpsc::UnboundedReceiver<String>,
    replies: Option<mpsc::UnboundedSender<Result<String>>>,
    /// Whether the client called `close()` on the transport.
    pub closed: Arc<AtomicBool>,
}

/// Create a connected transport/server pair.
pub fn mock_transport() -> (MockTransport, MockServer) {
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    let closed = Arc::new(AtomicBool::new(false));
    let transport = MockTransport {
        outbound: out_tx,
        inbound: in_rx,
        closed: Arc::clone(&closed),
    };
    let server = MockServer {
        requests: out_rx,
        replies: Some(in_tx),
        closed,
    };
    (transport, server)
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, message: String) -> Result<()> {
        self.outbound
            .send(message)
            .map_err(|e| LobbyError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String>> {
        self.inbound.recv().await
    }

    async fn close(&mut self) -> Result<()> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}

impl MockServer {
    /// Wait for the next request the client sends.
    pub async fn next_request(&mut self) -> ClientMessage {
        let text = self.requests.recv().await.expect("client hung up");
        serde_json::from_str(&text).expect("client sent invalid JSON")
    }

    /// Send a server message to the client.
    pub fn send(&self, msg: &ServerMessage) {
        self.send_raw(serde_json::to_string(msg).unwrap());
    }

    pub fn send_raw(&self, text: impl Into<String>) {
        if let Some(tx) = &self.replies {
            tx.send(Ok(text.into())).unwrap();
        }
    }

    /// Inject a transport-level receive error.
    pub fn fail(&self, err: LobbyError) {
        if let Some(tx) = &self.replies {
            tx.send(Err(err)).unwrap();
        }
    }

    /// Close the connection from the server side.
    pub fn hang_up(&mut self) {
        self.replies = None;
    }

    /// Answer the next request with the success reply for its kind.
    pub async fn answer_next(&mut self, snapshot: &MatchSnapshot) -> ClientMessage {
        let request = self.next_request().await;
        self.send(&success_reply(&request, snapshot));
        request
    }
}

/// The success reply a well-behaved server sends for `request`.
pub fn success_reply(request: &ClientMessage, snapshot: &MatchSnapshot) -> ServerMessage {
    let request_id = request.request_id();
    match request {
        ClientMessage::CreateMatch { .. } => ServerMessage::MatchCreated {
            request_id,
            snapshot: snapshot.clone(),
        },
        ClientMessage::JoinMatch { .. } => ServerMessage::MatchJoined {
            request_id,
            snapshot: snapshot.clone(),
        },
        ClientMessage::SubscribeLobby { .. } => ServerMessage::LobbySubscribed { request_id },
        ClientMessage::UnsubscribeLobby { .. } => ServerMessage::LobbyUnsubscribed { request_id },
        ClientMessage::LeaveMatch { .. } => ServerMessage::MatchLeft {
            request_id,
            success: true,
        },
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

pub fn snapshot(match_id: MatchId, code: &str, members: Vec<LobbyMember>) -> MatchSnapshot {
    MatchSnapshot {
        match_id,
        code: code.into(),
        members,
    }
}

pub fn host(user_id: UserId, name: &str) -> LobbyMember {
    LobbyMember::new(user_id, name).with_host(true)
}

pub fn guest(user_id: UserId, name: &str) -> LobbyMember {
    LobbyMember::new(user_id, name)
}

/// Install a test subscriber honouring `RUST_LOG`. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
