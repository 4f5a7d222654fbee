//! [`MatchChannel`] implementation over a text [`Transport`].
//!
//! [`TransportMatchChannel::start`] spawns a background loop that owns the
//! transport and multiplexes three sources with `tokio::select!`:
//!
//! - outbound requests from the handle, each registered under its
//!   `request_id` until a reply arrives,
//! - inbound messages: replies are routed to the waiting request, pushes are
//!   forwarded to the attached [`PushSink`],
//! - the graceful shutdown signal from [`ServiceChannel::close`].
//!
//! A transport error or a server-side close faults the channel, faults the
//! attached subscription through [`PushSink::fault`], and fails every
//! pending request with [`LobbyError::CommunicationFailure`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::channel::{ChannelState, ServiceChannel};
use crate::config::LobbyConfig;
use crate::error::{LobbyError, Result};
use crate::match_channel::{MatchChannel, MatchId, MatchSnapshot};
use crate::protocol::{ClientMessage, RequestId, ServerMessage};
use crate::session::UserId;
use crate::subscription::PushSink;
use crate::transport::Transport;

const STATE_OPEN: u8 = 0;
const STATE_CLOSED: u8 = 1;
const STATE_FAULTED: u8 = 2;

type ReplySender = oneshot::Sender<Result<ServerMessage>>;

/// A request queued for the transport loop.
struct Command {
    message: ClientMessage,
    reply: ReplySender,
}

/// State shared between the handle and the transport loop.
#[derive(Debug)]
struct Shared {
    state: AtomicU8,
    sink: StdMutex<Option<PushSink>>,
}

impl Shared {
    fn state(&self) -> ChannelState {
        match self.state.load(Ordering::Acquire) {
            STATE_OPEN => ChannelState::Open,
            STATE_CLOSED => ChannelState::Closed,
            _ => ChannelState::Faulted,
        }
    }

    /// Open → Faulted. A closed channel stays closed.
    fn fault(&self) {
        let _ = self.state.compare_exchange(
            STATE_OPEN,
            STATE_FAULTED,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// The connection is gone: fault the channel and the attached
    /// subscription.
    fn connection_lost(&self) {
        self.fault();
        if let Some(sink) = self.sink() {
            sink.fault();
        }
    }

    fn mark_closed(&self) {
        self.state.store(STATE_CLOSED, Ordering::Release);
    }

    fn sink(&self) -> Option<PushSink> {
        self.sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Match service channel driven by a background transport loop.
///
/// Every request is bounded by [`LobbyConfig::request_timeout`]; a timeout
/// faults the channel.
pub struct TransportMatchChannel {
    cmd_tx: mpsc::UnboundedSender<Command>,
    shared: Arc<Shared>,
    task: Option<tokio::task::JoinHandle<Result<()>>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    request_timeout: Duration,
}

impl TransportMatchChannel {
    /// Spawn the transport loop over a connected `transport`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(transport: impl Transport, config: &LobbyConfig) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<Command>();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let shared = Arc::new(Shared {
            state: AtomicU8::new(STATE_OPEN),
            sink: StdMutex::new(None),
        });

        let task = tokio::spawn(transport_loop(
            transport,
            cmd_rx,
            Arc::clone(&shared),
            shutdown_rx,
        ));

        Self {
            cmd_tx,
            shared,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
            request_timeout: config.request_timeout,
        }
    }

    // ── Internal helpers ────────────────────────────────────────────

    fn ensure_open(&self) -> Result<()> {
        match self.shared.state() {
            ChannelState::Open => Ok(()),
            ChannelState::Closed => Err(LobbyError::ChannelDisposed),
            ChannelState::Faulted => Err(LobbyError::CommunicationFailure(
                "channel is faulted".into(),
            )),
        }
    }

    /// Send `message` and wait for the reply carrying its `request_id`.
    ///
    /// A `Fault` reply is returned as [`LobbyError::ServiceFault`].
    async fn request(&self, message: ClientMessage) -> Result<ServerMessage> {
        self.ensure_open()?;

        let kind = message.kind();
        let request_id = message.request_id();
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(Command {
                message,
                reply: reply_tx,
            })
            .map_err(|_| LobbyError::ChannelDisposed)?;

        match tokio::time::timeout(self.request_timeout, reply_rx).await {
            Ok(Ok(Ok(ServerMessage::Fault { code, message, .. }))) => {
                debug!(kind, %request_id, %code, "request faulted");
                Err(LobbyError::ServiceFault { code, message })
            }
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => Err(LobbyError::CommunicationFailure(
                "transport loop stopped before replying".into(),
            )),
            Err(_) => {
                warn!(kind, %request_id, "request timed out; faulting channel");
                self.shared.fault();
                Err(LobbyError::Timeout)
            }
        }
    }
}

fn unexpected_reply(expected: &str, got: &ServerMessage) -> LobbyError {
    LobbyError::CommunicationFailure(format!(
        "expected {expected} reply, got {}",
        got.kind()
    ))
}

#[async_trait]
impl ServiceChannel for TransportMatchChannel {
    fn state(&self) -> ChannelState {
        self.shared.state()
    }

    async fn close(&mut self) -> Result<()> {
        match self.shared.state() {
            ChannelState::Closed => return Ok(()),
            ChannelState::Faulted => {
                return Err(LobbyError::CommunicationFailure(
                    "cannot gracefully close a faulted channel".into(),
                ))
            }
            ChannelState::Open => {}
        }

        debug!("TransportMatchChannel: close requested");
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        // Await through a borrow so a caller-side timeout can still abort.
        let outcome = match self.task.as_mut() {
            Some(task) => task.await,
            None => Ok(Ok(())),
        };
        self.task = None;
        self.shared.mark_closed();

        match outcome {
            Ok(result) => result,
            Err(join_err) => Err(LobbyError::CommunicationFailure(format!(
                "transport loop terminated: {join_err}"
            ))),
        }
    }

    fn abort(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.shutdown_tx = None;
        self.shared.mark_closed();
    }
}

#[async_trait]
impl MatchChannel for TransportMatchChannel {
    async fn create_match(&mut self, profile_id: UserId) -> Result<MatchSnapshot> {
        let reply = self
            .request(ClientMessage::CreateMatch {
                request_id: Uuid::new_v4(),
                profile_id,
            })
            .await?;
        match reply {
            ServerMessage::MatchCreated { snapshot, .. } => Ok(snapshot),
            other => Err(unexpected_reply("MatchCreated", &other)),
        }
    }

    async fn join_match(&mut self, user_id: UserId, code: &str) -> Result<MatchSnapshot> {
        let reply = self
            .request(ClientMessage::JoinMatch {
                request_id: Uuid::new_v4(),
                user_id,
                match_code: code.to_owned(),
            })
            .await?;
        match reply {
            ServerMessage::MatchJoined { snapshot, .. } => Ok(snapshot),
            other => Err(unexpected_reply("MatchJoined", &other)),
        }
    }

    async fn subscribe(&mut self, match_id: MatchId) -> Result<()> {
        let reply = self
            .request(ClientMessage::SubscribeLobby {
                request_id: Uuid::new_v4(),
                match_id,
            })
            .await?;
        match reply {
            ServerMessage::LobbySubscribed { .. } => Ok(()),
            other => Err(unexpected_reply("LobbySubscribed", &other)),
        }
    }

    async fn unsubscribe(&mut self, match_id: MatchId) -> Result<()> {
        let reply = self
            .request(ClientMessage::UnsubscribeLobby {
                request_id: Uuid::new_v4(),
                match_id,
            })
            .await?;
        match reply {
            ServerMessage::LobbyUnsubscribed { .. } => Ok(()),
            other => Err(unexpected_reply("LobbyUnsubscribed", &other)),
        }
    }

    async fn leave_match(&mut self, match_id: MatchId, user_id: UserId) -> Result<bool> {
        let reply = self
            .request(ClientMessage::LeaveMatch {
                request_id: Uuid::new_v4(),
                match_id,
                user_id,
            })
            .await?;
        match reply {
            ServerMessage::MatchLeft { success, .. } => Ok(success),
            other => Err(unexpected_reply("MatchLeft", &other)),
        }
    }

    fn attach_push_sink(&mut self, sink: PushSink) {
        debug!(match_id = sink.match_id(), "push sink attached");
        *self
            .shared
            .sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(sink);
    }
}

impl std::fmt::Debug for TransportMatchChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportMatchChannel")
            .field("state", &self.shared.state())
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl Drop for TransportMatchChannel {
    fn drop(&mut self) {
        // No executor here to drive `transport.close()`; abort the loop.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Transport loop ──────────────────────────────────────────────────

/// Background loop that owns the transport.
///
/// Exits when:
/// - the shutdown signal fires (transport closed gracefully)
/// - the command channel closes (handle dropped)
/// - the transport fails or the server closes the connection (channel faulted)
async fn transport_loop(
    mut transport: impl Transport,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    shared: Arc<Shared>,
    mut shutdown_rx: oneshot::Receiver<()>,
) -> Result<()> {
    debug!("transport loop started");
    let mut pending: HashMap<RequestId, ReplySender> = HashMap::new();

    let result = loop {
        tokio::select! {
            // Branch 1: outgoing request from the handle
            cmd = cmd_rx.recv() => {
                let Some(Command { message, reply }) = cmd else {
                    debug!("command channel closed, shutting down transport loop");
                    let _ = transport.close().await;
                    fail_pending(&mut pending, || LobbyError::ChannelDisposed);
                    break Ok(());
                };

                // Drop requests whose caller already gave up.
                pending.retain(|_, tx| !tx.is_closed());

                let json = match serde_json::to_string(&message) {
                    Ok(json) => json,
                    Err(e) => {
                        error!("failed to serialize ClientMessage: {e}");
                        let _ = reply.send(Err(LobbyError::Serialization(e)));
                        continue;
                    }
                };

                debug!(kind = message.kind(), request_id = %message.request_id(), "sending request");
                pending.insert(message.request_id(), reply);
                if let Err(e) = transport.send(json).await {
                    error!("transport send error: {e}");
                    shared.connection_lost();
                    fail_pending(&mut pending, || {
                        LobbyError::CommunicationFailure(format!("transport send error: {e}"))
                    });
                    break Ok(());
                }
            }

            // Branch 2: graceful shutdown
            _ = &mut shutdown_rx => {
                debug!("shutdown signal received");
                let closed = transport.close().await;
                fail_pending(&mut pending, || LobbyError::ChannelDisposed);
                break closed;
            }

            // Branch 3: incoming message from the server
            incoming = transport.recv() => {
                match incoming {
                    Some(Ok(text)) => match serde_json::from_str::<ServerMessage>(&text) {
                        Ok(msg) => route(msg, &mut pending, &shared),
                        Err(e) => warn!("failed to deserialize server message: {e} (raw: {text})"),
                    },
                    Some(Err(e)) => {
                        error!("transport receive error: {e}");
                        shared.connection_lost();
                        fail_pending(&mut pending, || {
                            LobbyError::CommunicationFailure(format!("transport receive error: {e}"))
                        });
                        break Ok(());
                    }
                    None => {
                        debug!("transport closed by server");
                        shared.connection_lost();
                        fail_pending(&mut pending, || {
                            LobbyError::CommunicationFailure("connection closed by server".into())
                        });
                        break Ok(());
                    }
                }
            }
        }
    };

    debug!("transport loop exited");
    result
}

/// Deliver a reply to its pending request, or a push to the sink.
fn route(msg: ServerMessage, pending: &mut HashMap<RequestId, ReplySender>, shared: &Shared) {
    if let Some(request_id) = msg.request_id() {
        match pending.remove(&request_id) {
            Some(reply) => {
                if reply.send(Ok(msg)).is_err() {
                    debug!(%request_id, "reply arrived after caller gave up");
                }
            }
            None => debug!(%request_id, kind = msg.kind(), "reply for unknown request"),
        }
        return;
    }

    if let ServerMessage::Fault { code, message, .. } = &msg {
        warn!(%code, "server fault without request: {message}");
        return;
    }

    let Some(push) = msg.into_push() else {
        return;
    };
    match shared.sink() {
        Some(sink) => {
            sink.deliver(push);
        }
        None => debug!(match_id = push.match_id, "no push sink attached; discarding push"),
    }
}

fn fail_pending(
    pending: &mut HashMap<RequestId, ReplySender>,
    make_err: impl Fn() -> LobbyError,
) {
    for (_, reply) in pending.drain() {
        let _ = reply.send(Err(make_err()));
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::error_codes::FaultCode;
    use crate::roster::{LobbyMember, LobbyRoster};
    use crate::subscription::{LobbySubscription, SubscriptionState};
    use std::sync::atomic::AtomicBool;

    // ── Channel-backed transport ────────────────────────────────────

    /// Transport whose far end is driven by the test as a fake server.
    struct PipeTransport {
        outbound: mpsc::UnboundedSender<String>,
        inbound: mpsc::UnboundedReceiver<Result<String>>,
        closed: Arc<AtomicBool>,
    }

    struct FakeServer {
        requests: mpsc::UnboundedReceiver<String>,
        replies: mpsc::UnboundedSender<Result<String>>,
        closed: Arc<AtomicBool>,
    }

    impl FakeServer {
        async fn next_request(&mut self) -> ClientMessage {
            let text = self.requests.recv().await.unwrap();
            serde_json::from_str(&text).unwrap()
        }

        fn push(&self, msg: &ServerMessage) {
            self.replies
                .send(Ok(serde_json::to_string(msg).unwrap()))
                .unwrap();
        }
    }

    fn pipe() -> (PipeTransport, FakeServer) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));
        let transport = PipeTransport {
            outbound: out_tx,
            inbound: in_rx,
            closed: Arc::clone(&closed),
        };
        let server = FakeServer {
            requests: out_rx,
            replies: in_tx,
            closed,
        };
        (transport, server)
    }

    #[async_trait]
    impl Transport for PipeTransport {
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

    fn config() -> LobbyConfig {
        LobbyConfig::default().with_request_timeout(Duration::from_secs(2))
    }

    // ── Tests ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn subscribe_round_trip() {
        let (transport, mut server) = pipe();
        let mut channel = TransportMatchChannel::start(transport, &config());

        let server_side = async {
            let request = server.next_request().await;
            match &request {
                ClientMessage::SubscribeLobby { match_id, .. } => assert_eq!(*match_id, 42),
                other => panic!("unexpected request: {other:?}"),
            }
            server.push(&ServerMessage::LobbySubscribed {
                request_id: request.request_id(),
            });
        };

        let (result, ()) = tokio::join!(channel.subscribe(42), server_side);
        result.unwrap();
        assert_eq!(channel.state(), ChannelState::Open);
        channel.close().await.unwrap();
    }

    #[tokio::test]
    async fn join_returns_snapshot() {
        let (transport, mut server) = pipe();
        let mut channel = TransportMatchChannel::start(transport, &config());

        let server_side = async {
            let request = server.next_request().await;
            match &request {
                ClientMessage::JoinMatch { match_code, user_id, .. } => {
                    assert_eq!(match_code, "ABC123");
                    assert_eq!(*user_id, 7);
                }
                other => panic!("unexpected request: {other:?}"),
            }
            server.push(&ServerMessage::MatchJoined {
                request_id: request.request_id(),
                snapshot: MatchSnapshot {
                    match_id: 42,
                    code: "ABC123".into(),
                    members: vec![LobbyMember::new(1, "host").with_host(true)],
                },
            });
        };

        let (result, ()) = tokio::join!(channel.join_match(7, "ABC123"), server_side);
        let snapshot = result.unwrap();
        assert_eq!(snapshot.match_id, 42);
        assert_eq!(snapshot.members.len(), 1);
        channel.close().await.unwrap();
    }

    #[tokio::test]
    async fn fault_reply_becomes_service_fault() {
        let (transport, mut server) = pipe();
        let mut channel = TransportMatchChannel::start(transport, &config());

        let server_side = async {
            let request = server.next_request().await;
            server.push(&ServerMessage::Fault {
                request_id: Some(request.request_id()),
                code: FaultCode::MatchFull,
                message: "match is full".into(),
            });
        };

        let (result, ()) = tokio::join!(channel.join_match(7, "FULL01"), server_side);
        assert!(matches!(
            result,
            Err(LobbyError::ServiceFault {
                code: FaultCode::MatchFull,
                ..
            })
        ));
        // Service faults leave the channel usable.
        assert_eq!(channel.state(), ChannelState::Open);
        channel.close().await.unwrap();
    }

    #[tokio::test]
    async fn unexpected_reply_is_communication_failure() {
        let (transport, mut server) = pipe();
        let mut channel = TransportMatchChannel::start(transport, &config());

        let server_side = async {
            let request = server.next_request().await;
            server.push(&ServerMessage::LobbyUnsubscribed {
                request_id: request.request_id(),
            });
        };

        let (result, ()) = tokio::join!(channel.subscribe(42), server_side);
        assert!(matches!(result, Err(LobbyError::CommunicationFailure(_))));
        channel.close().await.unwrap();
    }

    #[tokio::test]
    async fn server_close_fails_pending_request_and_faults() {
        let (transport, mut server) = pipe();
        let mut channel = TransportMatchChannel::start(transport, &config());

        let server_side = async {
            let _ = server.next_request().await;
            // Dropping the reply sender closes the inbound stream.
            let (dead_tx, _) = mpsc::unbounded_channel();
            drop(std::mem::replace(&mut server.replies, dead_tx));
        };

        let (result, ()) = tokio::join!(channel.subscribe(42), server_side);
        assert!(matches!(result, Err(LobbyError::CommunicationFailure(_))));
        assert_eq!(channel.state(), ChannelState::Faulted);

        let err = channel.subscribe(42).await.unwrap_err();
        assert!(matches!(err, LobbyError::CommunicationFailure(_)));
        channel.abort();
        assert_eq!(channel.state(), ChannelState::Closed);
    }

    #[tokio::test]
    async fn receive_error_faults_channel() {
        let (transport, mut server) = pipe();
        let mut channel = TransportMatchChannel::start(transport, &config());

        let server_side = async {
            let _ = server.next_request().await;
            server
                .replies
                .send(Err(LobbyError::TransportReceive("reset by peer".into())))
                .unwrap();
        };

        let (result, ()) = tokio::join!(channel.leave_match(42, 7), server_side);
        assert!(matches!(result, Err(LobbyError::CommunicationFailure(_))));
        assert_eq!(channel.state(), ChannelState::Faulted);
        assert!(channel.close().await.is_err());
        channel.abort();
    }

    #[tokio::test]
    async fn request_timeout_faults_channel() {
        let (transport, mut server) = pipe();
        let config = LobbyConfig::default().with_request_timeout(Duration::from_millis(50));
        let mut channel = TransportMatchChannel::start(transport, &config);

        let (result, _request) = tokio::join!(channel.subscribe(42), server.next_request());
        assert!(matches!(result, Err(LobbyError::Timeout)));
        assert_eq!(channel.state(), ChannelState::Faulted);
        channel.abort();
    }

    #[tokio::test]
    async fn close_closes_transport_and_disposes_channel() {
        let (transport, server) = pipe();
        let mut channel = TransportMatchChannel::start(transport, &config());

        channel.close().await.unwrap();
        assert_eq!(channel.state(), ChannelState::Closed);
        assert!(server.closed.load(Ordering::Relaxed));

        let err = channel.subscribe(42).await.unwrap_err();
        assert!(matches!(err, LobbyError::ChannelDisposed));
        // Closing again is a no-op.
        channel.close().await.unwrap();
    }

    #[tokio::test]
    async fn pushes_reach_subscription_roster() {
        let (transport, mut server) = pipe();
        let channel = TransportMatchChannel::start(transport, &config());
        let (mut sub, mut view) =
            LobbySubscription::new(channel, 42, 7, LobbyRoster::new(), config());

        let server_side = async {
            let request = server.next_request().await;
            server.push(&ServerMessage::LobbySubscribed {
                request_id: request.request_id(),
            });
        };
        let (opened, ()) = tokio::join!(sub.open(), server_side);
        opened.unwrap();
        assert_eq!(sub.state(), SubscriptionState::Subscribed);

        server.push(&ServerMessage::PlayerJoined {
            match_id: 42,
            player: LobbyMember::new(7, "Ana").with_host(true),
        });
        server.push(&ServerMessage::ReadyChanged {
            match_id: 42,
            user_id: 7,
            is_ready: true,
        });
        view.next_change().await.unwrap();
        view.next_change().await.unwrap();

        let member = view.member(7).unwrap();
        assert!(member.is_host);
        assert!(member.is_ready);

        let server_side = async {
            let request = server.next_request().await;
            assert!(matches!(request, ClientMessage::UnsubscribeLobby { .. }));
            server.push(&ServerMessage::LobbyUnsubscribed {
                request_id: request.request_id(),
            });
        };
        let ((), ()) = tokio::join!(sub.close(), server_side);
        assert_eq!(sub.state(), SubscriptionState::Closed);
        assert_eq!(sub.channel().state(), ChannelState::Closed);
    }

    #[tokio::test]
    async fn server_close_faults_open_subscription() {
        let (transport, mut server) = pipe();
        let channel = TransportMatchChannel::start(transport, &config());
        let (mut sub, _view) = LobbySubscription::new(channel, 42, 7, LobbyRoster::new(), config());

        let server_side = async {
            let request = server.next_request().await;
            server.push(&ServerMessage::LobbySubscribed {
                request_id: request.request_id(),
            });
        };
        let (opened, ()) = tokio::join!(sub.open(), server_side);
        opened.unwrap();

        let (dead_tx, _) = mpsc::unbounded_channel();
        drop(std::mem::replace(&mut server.replies, dead_tx));

        tokio::time::timeout(Duration::from_secs(1), async {
            while sub.state() != SubscriptionState::Faulted {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("subscription never faulted");
        assert_eq!(sub.channel().state(), ChannelState::Faulted);

        sub.close().await;
        assert_eq!(sub.state(), SubscriptionState::Faulted);
        assert_eq!(sub.channel().state(), ChannelState::Closed);
        assert!(server.requests.try_recv().is_err());
    }
}
