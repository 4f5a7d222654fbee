//! Single-consumer dispatch of pushed lobby events onto the roster owner.
//!
//! Push notifications arrive on whatever task or thread the transport uses.
//! [`CallbackDispatcher`] funnels them through an unbounded MPSC queue into
//! one background consumer task that owns the [`LobbyRoster`]. The consumer
//! applies events strictly in enqueue order, one at a time, so the roster has
//! exactly one writer and reconciliation is deterministic.
//!
//! The roster owner publishes two views for consumers:
//!
//! - the current roster through a [`tokio::sync::watch`] channel, and
//! - a bounded stream of [`RosterChange`] notifications.
//!
//! Both are exposed through the [`RosterView`] returned by
//! [`CallbackDispatcher::start`].

use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, warn};

use crate::config::LobbyConfig;
use crate::roster::{LobbyMember, LobbyRoster, RosterChange, RosterEvent};
use crate::session::UserId;

/// Cloneable, thread-safe handle for enqueueing roster events.
#[derive(Debug, Clone)]
pub struct DispatchHandle {
    event_tx: mpsc::UnboundedSender<RosterEvent>,
}

impl DispatchHandle {
    /// Enqueue `event` for the consumer task without blocking.
    ///
    /// Returns `false` if the consumer has already stopped; the event is
    /// dropped in that case.
    pub fn dispatch(&self, event: RosterEvent) -> bool {
        match self.event_tx.send(event) {
            Ok(()) => true,
            Err(_) => {
                debug!("roster dispatcher stopped; dropping event");
                false
            }
        }
    }
}

/// Owner of the roster consumer task.
///
/// Dropping the dispatcher aborts the consumer task; prefer
/// [`shutdown`](CallbackDispatcher::shutdown) when an async context is
/// available.
pub struct CallbackDispatcher {
    handle: DispatchHandle,
    task: Option<tokio::task::JoinHandle<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    shutdown_timeout: Duration,
}

impl CallbackDispatcher {
    /// Spawn the consumer task owning `initial` and return the dispatcher
    /// together with the consumer-side [`RosterView`].
    ///
    /// `initial` is installed before any event can be processed.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use = "the roster view is the only way to observe the roster"]
    pub fn start(initial: LobbyRoster, config: &LobbyConfig) -> (Self, RosterView) {
        let (event_tx, event_rx) = mpsc::unbounded_channel::<RosterEvent>();
        // Clamp capacity to at least 1 (tokio panics on 0).
        let capacity = config.change_channel_capacity.max(1);
        let (change_tx, change_rx) = mpsc::channel::<RosterChange>(capacity);
        let (roster_tx, roster_rx) = watch::channel(initial);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(consumer_loop(event_rx, roster_tx, change_tx, shutdown_rx));

        let dispatcher = Self {
            handle: DispatchHandle { event_tx },
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
            shutdown_timeout: config.shutdown_timeout,
        };
        let view = RosterView {
            roster: roster_rx,
            changes: change_rx,
        };
        (dispatcher, view)
    }

    /// A handle that can be moved to other tasks or threads.
    pub fn handle(&self) -> DispatchHandle {
        self.handle.clone()
    }

    /// Enqueue `event` without blocking. See [`DispatchHandle::dispatch`].
    pub fn dispatch(&self, event: RosterEvent) -> bool {
        self.handle.dispatch(event)
    }

    /// Returns `true` while the consumer task is running.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stop the consumer task. Events still queued are discarded.
    ///
    /// Safe to call more than once.
    pub async fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => debug!("roster dispatcher stopped"),
                Ok(Err(join_err)) => {
                    warn!("roster dispatcher terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("roster dispatcher did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("roster dispatcher aborted: {join_err}");
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for CallbackDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackDispatcher")
            .field("running", &self.is_running())
            .finish()
    }
}

impl Drop for CallbackDispatcher {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Consumer-side, read-only view of a roster owned by a dispatcher.
#[derive(Debug)]
pub struct RosterView {
    roster: watch::Receiver<LobbyRoster>,
    changes: mpsc::Receiver<RosterChange>,
}

impl RosterView {
    /// A copy of the current roster.
    pub fn snapshot(&self) -> LobbyRoster {
        self.roster.borrow().clone()
    }

    /// Members in roster order.
    pub fn members(&self) -> Vec<LobbyMember> {
        self.roster.borrow().members().to_vec()
    }

    /// Look up a member by id.
    pub fn member(&self, user_id: UserId) -> Option<LobbyMember> {
        self.roster.borrow().member(user_id).cloned()
    }

    /// Returns `true` if `user_id` is the lobby host.
    pub fn is_host(&self, user_id: UserId) -> bool {
        self.roster.borrow().is_host(user_id)
    }

    pub fn len(&self) -> usize {
        self.roster.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.roster.borrow().is_empty()
    }

    /// Wait until the roster changes.
    ///
    /// Returns `false` once the dispatcher has stopped.
    pub async fn changed(&mut self) -> bool {
        self.roster.changed().await.is_ok()
    }

    /// Wait for the next change notification.
    ///
    /// Returns `None` once the dispatcher has stopped and all buffered
    /// notifications were consumed.
    pub async fn next_change(&mut self) -> Option<RosterChange> {
        self.changes.recv().await
    }

    /// Take a buffered change notification without waiting.
    pub fn try_next_change(&mut self) -> Option<RosterChange> {
        self.changes.try_recv().ok()
    }
}

/// Background loop that owns the roster.
///
/// Exits when the shutdown signal fires (or its sender is dropped) or when
/// every [`DispatchHandle`] is gone.
async fn consumer_loop(
    mut event_rx: mpsc::UnboundedReceiver<RosterEvent>,
    roster_tx: watch::Sender<LobbyRoster>,
    change_tx: mpsc::Sender<RosterChange>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    debug!("roster dispatcher started");

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown_rx => {
                debug!("roster dispatcher shutdown signal received");
                break;
            }

            event = event_rx.recv() => {
                let Some(event) = event else {
                    debug!("all dispatch handles dropped");
                    break;
                };
                let mut change = None;
                roster_tx.send_if_modified(|roster| {
                    change = roster.apply(&event);
                    matches!(
                        change,
                        Some(RosterChange::Appended { .. }
                            | RosterChange::Removed { .. }
                            | RosterChange::Updated { .. })
                    )
                });
                if let Some(change) = change {
                    emit_change(&change_tx, change);
                }
            }
        }
    }

    debug!("roster dispatcher exited");
}

/// Forward a change notification. If the channel is full, log a warning and
/// drop it so the roster owner never blocks on a slow consumer.
fn emit_change(change_tx: &mpsc::Sender<RosterChange>, change: RosterChange) {
    match change_tx.try_send(change) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(dropped)) => {
            warn!("roster change channel full, dropping notification: {dropped:?}");
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!("roster change channel closed, view dropped");
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

    fn joined(user_id: UserId) -> RosterEvent {
        RosterEvent::PlayerJoined(LobbyMember::new(user_id, format!("p{user_id}")))
    }

    #[tokio::test]
    async fn initial_roster_is_visible_before_any_event() {
        let initial = LobbyRoster::seeded([LobbyMember::new(1, "host").with_host(true)]);
        let (mut dispatcher, view) = CallbackDispatcher::start(initial, &LobbyConfig::default());

        assert_eq!(view.len(), 1);
        assert!(view.is_host(1));

        dispatcher.shutdown().await;
    }

    #[tokio::test]
    async fn events_are_applied_in_enqueue_order() {
        let (mut dispatcher, mut view) =
            CallbackDispatcher::start(LobbyRoster::new(), &LobbyConfig::default());

        dispatcher.dispatch(joined(1));
        dispatcher.dispatch(joined(2));
        dispatcher.dispatch(RosterEvent::PlayerLeft { user_id: 1 });

        for _ in 0..3 {
            view.next_change().await.unwrap();
        }
        let ids: Vec<_> = view.members().iter().map(|m| m.user_id).collect();
        assert_eq!(ids, vec![2]);

        dispatcher.shutdown().await;
    }

    #[tokio::test]
    async fn noop_events_produce_no_notification() {
        let (mut dispatcher, mut view) =
            CallbackDispatcher::start(LobbyRoster::new(), &LobbyConfig::default());

        dispatcher.dispatch(RosterEvent::PlayerLeft { user_id: 5 });
        dispatcher.dispatch(joined(1));

        let change = view.next_change().await.unwrap();
        assert!(matches!(change, RosterChange::Appended { index: 0, .. }));
        assert!(view.try_next_change().is_none());

        dispatcher.shutdown().await;
    }

    #[tokio::test]
    async fn dispatch_from_many_threads_is_serialized() {
        let (mut dispatcher, mut view) =
            CallbackDispatcher::start(LobbyRoster::new(), &LobbyConfig::default());

        let mut threads = Vec::new();
        for t in 0..4_i64 {
            let handle = dispatcher.handle();
            threads.push(std::thread::spawn(move || {
                for i in 0..25_i64 {
                    assert!(handle.dispatch(joined(t * 100 + i)));
                }
            }));
        }
        for thread in threads {
            thread.join().unwrap();
        }

        for _ in 0..100 {
            view.next_change().await.unwrap();
        }
        assert_eq!(view.len(), 100);

        dispatcher.shutdown().await;
    }

    #[tokio::test]
    async fn dispatch_after_shutdown_is_rejected() {
        let (mut dispatcher, mut view) =
            CallbackDispatcher::start(LobbyRoster::new(), &LobbyConfig::default());
        let handle = dispatcher.handle();

        dispatcher.shutdown().await;
        dispatcher.shutdown().await; // idempotent

        assert!(!handle.dispatch(joined(1)));
        assert!(view.is_empty());
        assert!(!view.changed().await);
        assert!(view.next_change().await.is_none());
    }

    #[tokio::test]
    async fn full_change_channel_drops_notifications_not_events() {
        let config = LobbyConfig::default().with_change_channel_capacity(1);
        let (mut dispatcher, mut view) = CallbackDispatcher::start(LobbyRoster::new(), &config);

        for id in 1..=10 {
            dispatcher.dispatch(joined(id));
        }
        // Wait until the last event is visible in the snapshot.
        while view.len() < 10 {
            assert!(view.changed().await);
        }

        let mut notifications = 0;
        while view.try_next_change().is_some() {
            notifications += 1;
        }
        assert!(notifications < 10, "expected dropped notifications");
        assert_eq!(view.len(), 10);

        dispatcher.shutdown().await;
    }
}
