//! Subscription lifecycle for one match lobby.
//!
//! A [`LobbySubscription`] owns one remote [`MatchChannel`], the roster
//! dispatcher for the lobby, and the subscribe → listen → unsubscribe cycle:
//!
//! ```text
//!   Created ──open()──→ Subscribed ──close()──→ Unsubscribing ──→ Closed
//!      │                    │
//!      └──── any unrecoverable transport error ────→ Faulted
//! ```
//!
//! Pushes reach the roster through a [`PushSink`], which accepts them only
//! while the subscription is `Subscribed` and only for its own match. A
//! channel that loses its connection reports it through
//! [`PushSink::fault`].

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, info, warn};

use crate::channel::{close_safely, ChannelState};
use crate::config::LobbyConfig;
use crate::dispatcher::{CallbackDispatcher, DispatchHandle, RosterView};
use crate::error::{LobbyError, Result};
use crate::match_channel::{MatchChannel, MatchId, MatchPush};
use crate::roster::LobbyRoster;
use crate::session::UserId;

/// Lifecycle state of a [`LobbySubscription`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SubscriptionState {
    Created = 0,
    Subscribed = 1,
    Unsubscribing = 2,
    Closed = 3,
    Faulted = 4,
}

impl SubscriptionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Created,
            1 => Self::Subscribed,
            2 => Self::Unsubscribing,
            3 => Self::Closed,
            _ => Self::Faulted,
        }
    }

    /// Returns `true` for `Closed` and `Faulted`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Faulted)
    }
}

/// State cell shared between a subscription and its push sinks.
///
/// Transitions take `gate` for writing and deliveries hold it for reading
/// across the state check and the enqueue, so no push is queued once the
/// state has left `Subscribed`.
#[derive(Debug)]
struct SharedState {
    state: AtomicU8,
    gate: RwLock<()>,
}

impl SharedState {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(SubscriptionState::Created as u8),
            gate: RwLock::new(()),
        }
    }

    fn get(&self) -> SubscriptionState {
        SubscriptionState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set(&self, state: SubscriptionState) {
        let _gate = self.gate.write().unwrap_or_else(PoisonError::into_inner);
        self.state.store(state as u8, Ordering::Release);
    }

    /// Move `from` → `to`. Returns `false` if the state was not `from`.
    fn transition(&self, from: SubscriptionState, to: SubscriptionState) -> bool {
        let _gate = self.gate.write().unwrap_or_else(PoisonError::into_inner);
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// `Created`/`Subscribed` → `Faulted`. Closing and terminal states are kept.
    fn fault(&self) -> bool {
        let _gate = self.gate.write().unwrap_or_else(PoisonError::into_inner);
        self.state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                match SubscriptionState::from_u8(current) {
                    SubscriptionState::Created | SubscriptionState::Subscribed => {
                        Some(SubscriptionState::Faulted as u8)
                    }
                    _ => None,
                }
            })
            .is_ok()
    }
}

/// Entry point for pushed events, handed to the remote channel.
///
/// Cheap to clone and safe to call from any thread.
#[derive(Debug, Clone)]
pub struct PushSink {
    match_id: MatchId,
    state: Arc<SharedState>,
    dispatcher: DispatchHandle,
}

impl PushSink {
    /// Offer a pushed event to the subscription.
    ///
    /// Returns `true` if the event was queued for the roster. Pushes for
    /// another match, or arriving while the subscription is not
    /// `Subscribed`, are discarded without error.
    pub fn deliver(&self, push: MatchPush) -> bool {
        if push.match_id != self.match_id {
            debug!(
                expected = self.match_id,
                got = push.match_id,
                "discarding push for another match"
            );
            return false;
        }
        let _gate = self.state.gate.read().unwrap_or_else(PoisonError::into_inner);
        let state = self.state.get();
        if state != SubscriptionState::Subscribed {
            debug!(match_id = self.match_id, ?state, "discarding push outside subscription");
            return false;
        }
        self.dispatcher.dispatch(push.event)
    }

    /// Report that the connection behind the subscription is gone.
    ///
    /// Moves a `Created` or `Subscribed` subscription to `Faulted`; later
    /// pushes are discarded and [`LobbySubscription::close`] skips the
    /// unsubscribe. Returns `true` if this call faulted the subscription.
    pub fn fault(&self) -> bool {
        let faulted = self.state.fault();
        if faulted {
            warn!(match_id = self.match_id, "connection lost; lobby subscription faulted");
        }
        faulted
    }

    /// The match this sink accepts pushes for.
    pub fn match_id(&self) -> MatchId {
        self.match_id
    }
}

/// One subscribe/unsubscribe cycle against a match lobby.
///
/// Always call [`close`](LobbySubscription::close) when the lobby view goes
/// away, including after a failed [`open`](LobbySubscription::open).
/// Dropping an unclosed subscription aborts its channel.
pub struct LobbySubscription<C: MatchChannel> {
    channel: C,
    match_id: MatchId,
    user_id: UserId,
    state: Arc<SharedState>,
    dispatcher: CallbackDispatcher,
    config: LobbyConfig,
}

impl<C: MatchChannel> LobbySubscription<C> {
    /// Create a subscription for `match_id` whose roster starts as `initial`.
    ///
    /// `user_id` is the local user, used by [`leave`](Self::leave). The
    /// roster is installed before [`open`](Self::open) can deliver any push.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use = "the roster view is the only way to observe the roster"]
    pub fn new(
        channel: C,
        match_id: MatchId,
        user_id: UserId,
        initial: LobbyRoster,
        config: LobbyConfig,
    ) -> (Self, RosterView) {
        let (dispatcher, view) = CallbackDispatcher::start(initial, &config);
        let subscription = Self {
            channel,
            match_id,
            user_id,
            state: Arc::new(SharedState::new()),
            dispatcher,
            config,
        };
        (subscription, view)
    }

    pub fn match_id(&self) -> MatchId {
        self.match_id
    }

    pub fn state(&self) -> SubscriptionState {
        self.state.get()
    }

    /// The underlying channel.
    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// A sink that feeds this subscription's roster.
    pub fn push_sink(&self) -> PushSink {
        PushSink {
            match_id: self.match_id,
            state: Arc::clone(&self.state),
            dispatcher: self.dispatcher.handle(),
        }
    }

    /// Offer a pushed event. See [`PushSink::deliver`].
    pub fn on_push(&self, push: MatchPush) -> bool {
        self.push_sink().deliver(push)
    }

    /// Subscribe to lobby pushes.
    ///
    /// # Errors
    ///
    /// - [`LobbyError::InvalidState`] unless the subscription is `Created`;
    ///   nothing is sent in that case.
    /// - [`LobbyError::ServiceFault`], [`LobbyError::Timeout`] or
    ///   [`LobbyError::CommunicationFailure`] from the subscribe call. The
    ///   subscription is `Faulted` afterwards and its channel aborted.
    pub async fn open(&mut self) -> Result<()> {
        let state = self.state();
        if state != SubscriptionState::Created {
            return Err(LobbyError::InvalidState(format!(
                "cannot open subscription in state {state:?}"
            )));
        }

        let sink = self.push_sink();
        self.channel.attach_push_sink(sink);

        let result = match tokio::time::timeout(
            self.config.request_timeout,
            self.channel.subscribe(self.match_id),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(LobbyError::Timeout),
        };

        // The connection may have dropped right after the reply.
        let result = result.and_then(|()| {
            if self
                .state
                .transition(SubscriptionState::Created, SubscriptionState::Subscribed)
            {
                Ok(())
            } else {
                Err(LobbyError::CommunicationFailure(
                    "connection lost while subscribing".into(),
                ))
            }
        });

        match result {
            Ok(()) => {
                info!(match_id = self.match_id, "lobby subscription opened");
                Ok(())
            }
            Err(err) => {
                warn!(match_id = self.match_id, error = %err, "lobby subscribe failed");
                self.fault(&err);
                Err(err)
            }
        }
    }

    /// Leave the match as the local user.
    ///
    /// Returns the service's success flag; `false` is logged as a warning.
    /// Leaving does not close the subscription.
    ///
    /// # Errors
    ///
    /// - [`LobbyError::InvalidState`] once the subscription is closing or
    ///   terminal.
    /// - [`LobbyError::ServiceFault`] is returned as-is; the roster and the
    ///   subscription are untouched.
    /// - [`LobbyError::Timeout`] and other transport failures fault the
    ///   subscription and abort the channel.
    pub async fn leave(&mut self) -> Result<bool> {
        let state = self.state();
        if !matches!(
            state,
            SubscriptionState::Created | SubscriptionState::Subscribed
        ) {
            return Err(LobbyError::InvalidState(format!(
                "cannot leave match in state {state:?}"
            )));
        }

        info!(match_id = self.match_id, user_id = self.user_id, "leaving match");
        let result = match tokio::time::timeout(
            self.config.request_timeout,
            self.channel.leave_match(self.match_id, self.user_id),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(LobbyError::Timeout),
        };

        match result {
            Ok(success) => {
                if success {
                    info!(match_id = self.match_id, "left match");
                } else {
                    warn!(match_id = self.match_id, "service did not confirm leaving the match");
                }
                Ok(success)
            }
            Err(err) => {
                warn!(match_id = self.match_id, error = %err, "leave match failed");
                if err.is_transport_failure() {
                    self.fault(&err);
                }
                Err(err)
            }
        }
    }

    /// Tear the subscription down. Never fails and is idempotent.
    ///
    /// A `Subscribed` handle sends one unsubscribe request (failures are
    /// logged and ignored), then the channel is closed safely and the roster
    /// dispatcher stopped. Pushes arriving from the moment this is called
    /// are discarded.
    ///
    /// A subscription whose channel has faulted becomes `Faulted` instead:
    /// no unsubscribe is sent and the channel is aborted.
    pub async fn close(&mut self) {
        if self.state() == SubscriptionState::Subscribed
            && self.channel.state() == ChannelState::Faulted
        {
            self.fault(&LobbyError::CommunicationFailure("channel is faulted".into()));
        }

        let state = self.state();
        if state.is_terminal() {
            debug!(match_id = self.match_id, ?state, "subscription already terminal");
            close_safely(&mut self.channel, self.config.close_timeout).await;
            self.dispatcher.shutdown().await;
            return;
        }

        if self
            .state
            .transition(SubscriptionState::Subscribed, SubscriptionState::Unsubscribing)
        {
            let result = match tokio::time::timeout(
                self.config.request_timeout,
                self.channel.unsubscribe(self.match_id),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(LobbyError::Timeout),
            };
            match result {
                Ok(()) => debug!(match_id = self.match_id, "unsubscribed from lobby"),
                Err(err) => {
                    warn!(match_id = self.match_id, error = %err, "unsubscribe failed; continuing teardown");
                    if err.is_transport_failure() {
                        self.channel.abort();
                    }
                }
            }
        }

        close_safely(&mut self.channel, self.config.close_timeout).await;
        self.dispatcher.shutdown().await;
        // A fault reported while closing began is absorbing.
        if self.state() == SubscriptionState::Faulted {
            debug!(match_id = self.match_id, "subscription faulted during close");
            return;
        }
        self.state.set(SubscriptionState::Closed);
        info!(match_id = self.match_id, "lobby subscription closed");
    }

    /// Move to `Faulted` and force-abort the channel.
    fn fault(&mut self, err: &LobbyError) {
        self.state.set(SubscriptionState::Faulted);
        self.channel.abort();
        warn!(match_id = self.match_id, error = %err, "lobby subscription faulted");
    }
}

impl<C: MatchChannel> std::fmt::Debug for LobbySubscription<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LobbySubscription")
            .field("match_id", &self.match_id)
            .field("state", &self.state())
            .field("channel", &self.channel.state())
            .finish()
    }
}

impl<C: MatchChannel> Drop for LobbySubscription<C> {
    fn drop(&mut self) {
        // No executor is available here; abort is the only safe teardown.
        if !self.state().is_terminal() {
            warn!(match_id = self.match_id, "subscription dropped without close; aborting channel");
            self.state.set(SubscriptionState::Closed);
            self.channel.abort();
        }
    }
}

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
    use crate::channel::ServiceChannel;
    use crate::match_channel::MatchSnapshot;
    use crate::roster::{LobbyMember, RosterEvent};
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    /// Records calls; `subscribe`/`unsubscribe` results are scripted.
    #[derive(Default)]
    struct Calls {
        subscribe: usize,
        unsubscribe: usize,
        close: usize,
        abort: usize,
        delivered_while_unsubscribing: Option<bool>,
    }

    struct StubChannel {
        state: ChannelState,
        subscribe_result: Option<fn() -> LobbyError>,
        unsubscribe_result: Option<fn() -> LobbyError>,
        push_while_unsubscribing: Option<MatchPush>,
        calls: Arc<StdMutex<Calls>>,
        sink: Option<PushSink>,
    }

    impl StubChannel {
        fn new() -> (Self, Arc<StdMutex<Calls>>) {
            let calls = Arc::new(StdMutex::new(Calls::default()));
            let channel = Self {
                state: ChannelState::Open,
                subscribe_result: None,
                unsubscribe_result: None,
                push_while_unsubscribing: None,
                calls: Arc::clone(&calls),
                sink: None,
            };
            (channel, calls)
        }
    }

    #[async_trait]
    impl ServiceChannel for StubChannel {
        fn state(&self) -> ChannelState {
            self.state
        }

        async fn close(&mut self) -> Result<()> {
            self.calls.lock().unwrap().close += 1;
            self.state = ChannelState::Closed;
            Ok(())
        }

        fn abort(&mut self) {
            self.calls.lock().unwrap().abort += 1;
            self.state = ChannelState::Closed;
        }
    }

    #[async_trait]
    impl MatchChannel for StubChannel {
        async fn create_match(&mut self, _profile_id: UserId) -> Result<MatchSnapshot> {
            unreachable!("not used by subscription tests")
        }

        async fn join_match(&mut self, _user_id: UserId, _code: &str) -> Result<MatchSnapshot> {
            unreachable!("not used by subscription tests")
        }

        async fn subscribe(&mut self, _match_id: MatchId) -> Result<()> {
            self.calls.lock().unwrap().subscribe += 1;
            match self.subscribe_result {
                None => Ok(()),
                Some(make) => {
                    let err = make();
                    if err.is_transport_failure() {
                        self.state = ChannelState::Faulted;
                    }
                    Err(err)
                }
            }
        }

        async fn unsubscribe(&mut self, _match_id: MatchId) -> Result<()> {
            self.calls.lock().unwrap().unsubscribe += 1;
            if let (Some(push), Some(sink)) = (self.push_while_unsubscribing.take(), &self.sink) {
                self.calls.lock().unwrap().delivered_while_unsubscribing = Some(sink.deliver(push));
            }
            match self.unsubscribe_result {
                None => Ok(()),
                Some(make) => Err(make()),
            }
        }

        async fn leave_match(&mut self, _match_id: MatchId, _user_id: UserId) -> Result<bool> {
            Ok(true)
        }

        fn attach_push_sink(&mut self, sink: PushSink) {
            self.sink = Some(sink);
        }
    }

    fn subscription(channel: StubChannel) -> (LobbySubscription<StubChannel>, RosterView) {
        LobbySubscription::new(channel, 42, 7, LobbyRoster::new(), LobbyConfig::default())
    }

    fn host_joined(user_id: UserId) -> MatchPush {
        MatchPush::new(
            42,
            RosterEvent::PlayerJoined(LobbyMember::new(user_id, "host").with_host(true)),
        )
    }

    #[tokio::test]
    async fn open_transitions_to_subscribed_and_attaches_sink() {
        let (channel, calls) = StubChannel::new();
        let (mut sub, _view) = subscription(channel);

        sub.open().await.unwrap();

        assert_eq!(sub.state(), SubscriptionState::Subscribed);
        assert_eq!(calls.lock().unwrap().subscribe, 1);
        assert_eq!(sub.channel().sink.as_ref().unwrap().match_id(), 42);
        sub.close().await;
    }

    #[tokio::test]
    async fn open_twice_is_rejected_without_second_request() {
        let (channel, calls) = StubChannel::new();
        let (mut sub, _view) = subscription(channel);

        sub.open().await.unwrap();
        let err = sub.open().await.unwrap_err();

        assert!(matches!(err, LobbyError::InvalidState(_)));
        assert_eq!(calls.lock().unwrap().subscribe, 1);
        sub.close().await;
    }

    #[tokio::test]
    async fn pushes_before_open_are_discarded() {
        let (channel, _calls) = StubChannel::new();
        let (mut sub, view) = subscription(channel);

        assert!(!sub.on_push(host_joined(7)));
        assert!(view.is_empty());
        sub.close().await;
    }

    #[tokio::test]
    async fn pushes_for_other_match_are_discarded() {
        let (channel, _calls) = StubChannel::new();
        let (mut sub, _view) = subscription(channel);
        sub.open().await.unwrap();

        let other = MatchPush::new(43, RosterEvent::PlayerLeft { user_id: 1 });
        assert!(!sub.on_push(other));
        sub.close().await;
    }

    #[tokio::test]
    async fn timeout_on_open_faults_and_aborts() {
        let (mut channel, calls) = StubChannel::new();
        channel.subscribe_result = Some(|| LobbyError::Timeout);
        let (mut sub, _view) = subscription(channel);

        let err = sub.open().await.unwrap_err();

        assert!(matches!(err, LobbyError::Timeout));
        assert_eq!(sub.state(), SubscriptionState::Faulted);
        assert_eq!(calls.lock().unwrap().abort, 1);
        assert_eq!(sub.channel().state(), ChannelState::Closed);
    }

    #[tokio::test]
    async fn service_fault_on_open_is_surfaced_and_channel_aborted() {
        let (mut channel, calls) = StubChannel::new();
        channel.subscribe_result = Some(|| LobbyError::ServiceFault {
            code: FaultCode::MatchNotFound,
            message: "gone".into(),
        });
        let (mut sub, _view) = subscription(channel);

        let err = sub.open().await.unwrap_err();

        assert!(matches!(
            err,
            LobbyError::ServiceFault {
                code: FaultCode::MatchNotFound,
                ..
            }
        ));
        assert_eq!(sub.state(), SubscriptionState::Faulted);
        let calls = calls.lock().unwrap();
        assert_eq!(calls.close, 0);
        assert_eq!(calls.abort, 1);
    }

    #[tokio::test]
    async fn close_after_failed_open_is_noop() {
        let (mut channel, calls) = StubChannel::new();
        channel.subscribe_result = Some(|| LobbyError::CommunicationFailure("reset".into()));
        let (mut sub, _view) = subscription(channel);

        assert!(sub.open().await.is_err());
        sub.close().await;

        assert_eq!(sub.state(), SubscriptionState::Faulted);
        let calls = calls.lock().unwrap();
        assert_eq!(calls.unsubscribe, 0);
        assert_eq!(calls.abort, 1);
    }

    #[tokio::test]
    async fn close_unsubscribes_once() {
        let (channel, calls) = StubChannel::new();
        let (mut sub, _view) = subscription(channel);
        sub.open().await.unwrap();

        sub.close().await;
        sub.close().await;

        assert_eq!(sub.state(), SubscriptionState::Closed);
        let calls = calls.lock().unwrap();
        assert_eq!(calls.unsubscribe, 1);
        assert_eq!(calls.close, 1);
    }

    #[tokio::test]
    async fn unsubscribe_failure_is_swallowed() {
        let (mut channel, calls) = StubChannel::new();
        channel.unsubscribe_result = Some(|| LobbyError::ServiceFault {
            code: FaultCode::NotSubscribed,
            message: "not subscribed".into(),
        });
        let (mut sub, _view) = subscription(channel);
        sub.open().await.unwrap();

        sub.close().await;

        assert_eq!(sub.state(), SubscriptionState::Closed);
        assert_eq!(calls.lock().unwrap().close, 1);
    }

    #[tokio::test]
    async fn unsubscribe_timeout_aborts_channel() {
        let (mut channel, calls) = StubChannel::new();
        channel.unsubscribe_result = Some(|| LobbyError::Timeout);
        let (mut sub, _view) = subscription(channel);
        sub.open().await.unwrap();

        sub.close().await;

        assert_eq!(sub.state(), SubscriptionState::Closed);
        let calls = calls.lock().unwrap();
        assert_eq!(calls.abort, 1);
        assert_eq!(calls.close, 0);
    }

    #[tokio::test]
    async fn close_without_open_releases_channel() {
        let (channel, calls) = StubChannel::new();
        let (mut sub, _view) = subscription(channel);

        sub.close().await;

        assert_eq!(sub.state(), SubscriptionState::Closed);
        let calls = calls.lock().unwrap();
        assert_eq!(calls.unsubscribe, 0);
        assert_eq!(calls.close, 1);
    }

    #[tokio::test]
    async fn pushes_after_close_are_discarded() {
        let (channel, _calls) = StubChannel::new();
        let (mut sub, mut view) = subscription(channel);
        sub.open().await.unwrap();
        let sink = sub.channel().sink.clone().unwrap();

        assert!(sink.deliver(host_joined(7)));
        view.next_change().await.unwrap();

        sub.close().await;
        assert!(!sink.deliver(MatchPush::new(42, RosterEvent::PlayerLeft { user_id: 7 })));
        assert_eq!(view.len(), 1);
    }

    #[tokio::test]
    async fn drop_without_close_aborts_channel() {
        let (channel, calls) = StubChannel::new();
        let (mut sub, _view) = subscription(channel);
        sub.open().await.unwrap();

        drop(sub);

        assert_eq!(calls.lock().unwrap().abort, 1);
    }

    #[tokio::test]
    async fn push_during_unsubscribe_is_not_queued() {
        let (mut channel, calls) = StubChannel::new();
        channel.push_while_unsubscribing = Some(host_joined(9));
        let (mut sub, view) = subscription(channel);
        sub.open().await.unwrap();

        sub.close().await;

        assert_eq!(calls.lock().unwrap().delivered_while_unsubscribing, Some(false));
        assert!(view.is_empty());
    }

    #[tokio::test]
    async fn sink_fault_skips_unsubscribe_and_stays_faulted() {
        let (channel, calls) = StubChannel::new();
        let (mut sub, view) = subscription(channel);
        sub.open().await.unwrap();
        let sink = sub.channel().sink.clone().unwrap();

        assert!(sink.fault());
        assert!(!sink.fault());
        assert_eq!(sub.state(), SubscriptionState::Faulted);
        assert!(!sink.deliver(host_joined(7)));
        assert!(view.is_empty());

        sub.close().await;

        assert_eq!(sub.state(), SubscriptionState::Faulted);
        let calls = calls.lock().unwrap();
        assert_eq!(calls.unsubscribe, 0);
        assert_eq!(calls.close, 1);
    }

    #[tokio::test]
    async fn sink_fault_after_close_is_ignored() {
        let (channel, _calls) = StubChannel::new();
        let (mut sub, _view) = subscription(channel);
        sub.open().await.unwrap();
        let sink = sub.channel().sink.clone().unwrap();

        sub.close().await;

        assert!(!sink.fault());
        assert_eq!(sub.state(), SubscriptionState::Closed);
    }

    #[tokio::test]
    async fn leave_is_rejected_after_close() {
        let (channel, _calls) = StubChannel::new();
        let (mut sub, _view) = subscription(channel);
        sub.open().await.unwrap();
        assert!(sub.leave().await.unwrap());

        sub.close().await;
        assert!(matches!(sub.leave().await, Err(LobbyError::InvalidState(_))));
    }
}
