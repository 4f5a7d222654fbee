#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]

mod common;

use std::time::Duration;

use lobby_sync_client::{
    ChannelState, FaultCode, Lobby, LobbyClient, LobbyConfig, LobbyError, MatchPush,
    RosterChange, RosterEvent, RosterView, SessionState, SubscriptionState,
};
use tokio_test::{assert_err, assert_ok};

use common::{guest, host, snapshot, Call, MockHandle, MockMatchChannel};

// ── Helpers ─────────────────────────────────────────────────────────

fn signed_in(user_id: i64) -> SessionState {
    let session = SessionState::new();
    session
        .sign_in(user_id, Some("Ana"), Some("ana@example.com"), "token")
        .unwrap();
    session
}

fn client(session: &SessionState) -> LobbyClient {
    let config = LobbyConfig::default()
        .with_request_timeout(Duration::from_secs(2))
        .with_close_timeout(Duration::from_secs(1));
    LobbyClient::new(session.clone(), config)
}

async fn next_change(view: &mut RosterView) -> RosterChange {
    tokio::time::timeout(Duration::from_secs(1), view.next_change())
        .await
        .expect("timed out waiting for roster change")
        .expect("dispatcher stopped")
}

async fn open_empty_lobby(
    session: &SessionState,
) -> (Lobby<MockMatchChannel>, MockHandle) {
    let (channel, handle) = MockMatchChannel::new(snapshot(42, "ABC123", vec![]));
    let lobby = client(session)
        .open_lobby(channel, snapshot(42, "ABC123", vec![]))
        .await
        .unwrap();
    (lobby, handle)
}

// ── End-to-end ──────────────────────────────────────────────────────

#[tokio::test]
async fn roster_follows_pushes_until_close() {
    common::init_tracing();
    let session = signed_in(7);
    let (mut lobby, handle) = open_empty_lobby(&session).await;
    assert_eq!(lobby.state(), SubscriptionState::Subscribed);

    assert!(handle.push(MatchPush::new(
        42,
        RosterEvent::PlayerJoined(host(7, "Ana"))
    )));
    assert!(handle.push(MatchPush::new(
        42,
        RosterEvent::ReadyChanged {
            user_id: 7,
            is_ready: true
        }
    )));
    next_change(&mut lobby.roster).await;
    next_change(&mut lobby.roster).await;

    let members = lobby.roster.members();
    assert_eq!(members, vec![host(7, "Ana").with_ready(true)]);
    assert!(lobby.is_current_user_host());

    lobby.close().await;
    assert_eq!(lobby.state(), SubscriptionState::Closed);
    assert_eq!(handle.state(), ChannelState::Closed);

    // A late push for the same match is dropped without error.
    assert!(!handle.push(MatchPush::new(42, RosterEvent::PlayerLeft { user_id: 7 })));
    assert_eq!(lobby.roster.len(), 1);
}

#[tokio::test]
async fn join_then_leave_of_other_player_keeps_order() {
    let session = signed_in(7);
    let (mut lobby, handle) = open_empty_lobby(&session).await;

    handle.push(MatchPush::new(42, RosterEvent::PlayerJoined(host(1, "Host"))));
    handle.push(MatchPush::new(42, RosterEvent::PlayerJoined(guest(2, "Bo"))));
    handle.push(MatchPush::new(42, RosterEvent::PlayerJoined(guest(3, "Cy"))));
    handle.push(MatchPush::new(42, RosterEvent::PlayerLeft { user_id: 2 }));
    for _ in 0..4 {
        next_change(&mut lobby.roster).await;
    }

    let ids: Vec<i64> = lobby.roster.members().iter().map(|m| m.user_id).collect();
    assert_eq!(ids, vec![1, 3]);
    assert!(!lobby.is_current_user_host());
    lobby.close().await;
}

#[tokio::test]
async fn pushes_for_another_match_are_ignored() {
    let session = signed_in(7);
    let (mut lobby, handle) = open_empty_lobby(&session).await;

    assert!(!handle.push(MatchPush::new(
        43,
        RosterEvent::PlayerJoined(guest(9, "Stray"))
    )));
    assert!(handle.push(MatchPush::new(42, RosterEvent::PlayerJoined(guest(8, "Eve")))));

    let change = next_change(&mut lobby.roster).await;
    assert!(matches!(change, RosterChange::Appended { index: 0, ref member } if member.user_id == 8));
    assert_eq!(lobby.roster.len(), 1);
    lobby.close().await;
}

#[tokio::test]
async fn game_started_is_notified_without_roster_change() {
    let session = signed_in(7);
    let (mut lobby, handle) = open_empty_lobby(&session).await;

    handle.push(MatchPush::new(42, RosterEvent::GameStarted));
    assert_eq!(next_change(&mut lobby.roster).await, RosterChange::GameStarted);
    assert!(lobby.roster.is_empty());
    lobby.close().await;
}

// ── create / join ───────────────────────────────────────────────────

#[tokio::test]
async fn create_match_seeds_roster_then_subscribes() {
    let session = signed_in(7);
    let (channel, handle) = MockMatchChannel::new(snapshot(42, "NEW001", vec![host(7, "Ana")]));

    let mut lobby = client(&session).create_match(channel).await.unwrap();

    assert_eq!(handle.requests(), vec![Call::CreateMatch(7), Call::Subscribe(42)]);
    assert_eq!(lobby.code, "NEW001");
    assert_eq!(lobby.match_id(), 42);
    assert!(lobby.is_current_user_host());
    assert!(lobby.is_local_player(7));
    assert!(!lobby.is_local_player(8));
    lobby.close().await;
}

#[tokio::test]
async fn duplicate_self_join_push_is_absorbed() {
    let session = signed_in(7);
    let (channel, handle) = MockMatchChannel::new(snapshot(
        42,
        "ABC123",
        vec![host(1, "Host"), guest(7, "Ana")],
    ));
    let mut lobby = client(&session).join_match(channel, "ABC123").await.unwrap();

    // The service echoes our own join after the response seeded the roster.
    handle.push(MatchPush::new(42, RosterEvent::PlayerJoined(guest(7, "Ana"))));
    handle.push(MatchPush::new(42, RosterEvent::PlayerJoined(guest(8, "Eve"))));

    // The first change observed is the second push; the echo was a no-op.
    let change = next_change(&mut lobby.roster).await;
    assert!(matches!(change, RosterChange::Appended { index: 2, .. }));
    assert_eq!(lobby.roster.len(), 3);
    lobby.close().await;
}

#[tokio::test]
async fn join_match_trims_code() {
    let session = signed_in(7);
    let (channel, handle) = MockMatchChannel::new(snapshot(42, "ABC123", vec![]));

    let mut lobby = client(&session)
        .join_match(channel, "  ABC123\n")
        .await
        .unwrap();

    assert_eq!(handle.requests()[0], Call::JoinMatch(7, "ABC123".into()));
    lobby.close().await;
}

#[tokio::test]
async fn join_match_rejects_blank_code_without_request() {
    let session = signed_in(7);
    let (channel, handle) = MockMatchChannel::new(snapshot(42, "ABC123", vec![]));

    let err = client(&session).join_match(channel, "   ").await.unwrap_err();

    assert!(matches!(err, LobbyError::InvalidArgument(_)));
    assert!(handle.requests().is_empty());
    assert_eq!(handle.state(), ChannelState::Closed);
}

#[tokio::test]
async fn signed_out_session_is_refused_without_request() {
    let session = SessionState::new();
    let lobby_client = client(&session);

    let (channel, handle) = MockMatchChannel::new(snapshot(42, "ABC123", vec![]));
    let err = lobby_client.create_match(channel).await.unwrap_err();
    assert!(matches!(err, LobbyError::NotAuthenticated));
    assert!(handle.requests().is_empty());

    let (channel, handle) = MockMatchChannel::new(snapshot(42, "ABC123", vec![]));
    let err = lobby_client.join_match(channel, "ABC123").await.unwrap_err();
    assert!(matches!(err, LobbyError::NotAuthenticated));
    assert!(handle.requests().is_empty());
}

#[tokio::test]
async fn sign_out_clears_host_status() {
    let session = signed_in(7);
    let (channel, _handle) = MockMatchChannel::new(snapshot(42, "ABC123", vec![host(7, "Ana")]));
    let mut lobby = client(&session).create_match(channel).await.unwrap();
    assert!(lobby.is_current_user_host());

    session.sign_out();
    assert!(!lobby.is_current_user_host());
    assert!(!lobby.is_local_player(7));
    lobby.close().await;
}

#[tokio::test]
async fn join_service_fault_is_surfaced_and_channel_closed() {
    let session = signed_in(7);
    let (mut channel, handle) = MockMatchChannel::new(snapshot(42, "ABC123", vec![]));
    channel.fail_join = Some(|| LobbyError::ServiceFault {
        code: FaultCode::MatchFull,
        message: "match is full".into(),
    });

    let err = client(&session).join_match(channel, "ABC123").await.unwrap_err();

    assert!(matches!(
        err,
        LobbyError::ServiceFault {
            code: FaultCode::MatchFull,
            ..
        }
    ));
    assert_eq!(
        handle.calls(),
        vec![Call::JoinMatch(7, "ABC123".into()), Call::Close]
    );
}

#[tokio::test]
async fn create_timeout_aborts_channel() {
    let session = signed_in(7);
    let (mut channel, handle) = MockMatchChannel::new(snapshot(42, "ABC123", vec![]));
    channel.fail_create = Some(|| LobbyError::Timeout);

    let err = client(&session).create_match(channel).await.unwrap_err();

    assert!(matches!(err, LobbyError::Timeout));
    assert_eq!(handle.calls(), vec![Call::CreateMatch(7), Call::Abort]);
}

// ── open failures ───────────────────────────────────────────────────

#[tokio::test]
async fn subscribe_fault_aborts_channel_and_drops_later_pushes() {
    let session = signed_in(7);
    let (mut channel, handle) = MockMatchChannel::new(snapshot(42, "ABC123", vec![]));
    channel.fail_subscribe = Some(|| LobbyError::ServiceFault {
        code: FaultCode::AlreadySubscribed,
        message: "already subscribed".into(),
    });

    let result = client(&session).join_match(channel, "ABC123").await;
    assert_err!(result);

    assert_eq!(
        handle.calls(),
        vec![
            Call::JoinMatch(7, "ABC123".into()),
            Call::Subscribe(42),
            Call::Abort
        ]
    );
    assert!(!handle.push(MatchPush::new(42, RosterEvent::PlayerJoined(guest(8, "Eve")))));
}

#[tokio::test]
async fn subscribe_communication_failure_aborts_without_unsubscribe() {
    let session = signed_in(7);
    let (mut channel, handle) = MockMatchChannel::new(snapshot(42, "ABC123", vec![]));
    channel.fail_subscribe = Some(|| LobbyError::CommunicationFailure("reset".into()));

    let err = client(&session).create_match(channel).await.unwrap_err();

    assert!(matches!(err, LobbyError::CommunicationFailure(_)));
    let calls = handle.calls();
    assert!(!calls.contains(&Call::Unsubscribe(42)));
    assert!(!calls.contains(&Call::Close));
    assert_eq!(calls.last(), Some(&Call::Abort));
    assert_eq!(handle.state(), ChannelState::Closed);
}

// ── leave / close ───────────────────────────────────────────────────

#[tokio::test]
async fn leave_returns_service_flag() {
    let session = signed_in(7);
    let (mut channel, handle) = MockMatchChannel::new(snapshot(42, "ABC123", vec![]));
    channel.leave_result = false;
    let mut lobby = client(&session).join_match(channel, "ABC123").await.unwrap();

    let left = assert_ok!(lobby.leave().await);
    assert!(!left);
    assert!(handle.requests().contains(&Call::LeaveMatch(42, 7)));
    assert_eq!(lobby.state(), SubscriptionState::Subscribed);
    lobby.close().await;
}

#[tokio::test]
async fn leave_communication_failure_faults_lobby() {
    let session = signed_in(7);
    let (mut channel, handle) = MockMatchChannel::new(snapshot(42, "ABC123", vec![]));
    channel.fail_leave = Some(|| LobbyError::CommunicationFailure("reset".into()));
    let mut lobby = client(&session).join_match(channel, "ABC123").await.unwrap();

    assert_err!(lobby.leave().await);
    assert_eq!(lobby.state(), SubscriptionState::Faulted);

    lobby.close().await;
    assert_eq!(lobby.state(), SubscriptionState::Faulted);
    assert!(!handle.calls().contains(&Call::Unsubscribe(42)));
}

#[tokio::test]
async fn close_swallows_unsubscribe_fault() {
    let session = signed_in(7);
    let (mut channel, handle) = MockMatchChannel::new(snapshot(42, "ABC123", vec![]));
    channel.fail_unsubscribe = Some(|| LobbyError::ServiceFault {
        code: FaultCode::NotSubscribed,
        message: "not subscribed".into(),
    });
    let mut lobby = client(&session).join_match(channel, "ABC123").await.unwrap();

    lobby.close().await;

    assert_eq!(lobby.state(), SubscriptionState::Closed);
    assert_eq!(
        &handle.calls()[2..],
        &[Call::Unsubscribe(42), Call::Close][..]
    );
}

#[tokio::test]
async fn close_twice_sends_one_unsubscribe() {
    let session = signed_in(7);
    let (mut lobby, handle) = open_empty_lobby(&session).await;

    lobby.close().await;
    lobby.close().await;

    let unsubscribes = handle
        .calls()
        .iter()
        .filter(|c| matches!(c, Call::Unsubscribe(_)))
        .count();
    assert_eq!(unsubscribes, 1);
}

#[tokio::test]
async fn dropping_open_lobby_aborts_channel() {
    let session = signed_in(7);
    let (lobby, handle) = open_empty_lobby(&session).await;

    drop(lobby);

    assert_eq!(handle.calls().last(), Some(&Call::Abort));
    assert_eq!(handle.state(), ChannelState::Closed);
}
