#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
//! Wire-format tests for the lobby JSON protocol.
//!
//! Each test pins the exact JSON shape of a message so that accidental
//! renames or tagging changes are caught.

use lobby_sync_client::protocol::{ClientMessage, ServerMessage};
use lobby_sync_client::{FaultCode, LobbyMember, MatchSnapshot, RosterEvent};
use serde_json::json;
use uuid::Uuid;

fn request_id() -> Uuid {
    Uuid::from_u128(0x1234)
}

const REQUEST_ID: &str = "00000000-0000-0000-0000-000000001234";

// ── ClientMessage ───────────────────────────────────────────────────

#[test]
fn create_match_shape() {
    let msg = ClientMessage::CreateMatch {
        request_id: request_id(),
        profile_id: 7,
    };
    assert_eq!(
        serde_json::to_value(&msg).unwrap(),
        json!({
            "type": "CreateMatch",
            "data": { "request_id": REQUEST_ID, "profile_id": 7 }
        })
    );
}

#[test]
fn join_match_shape() {
    let msg = ClientMessage::JoinMatch {
        request_id: request_id(),
        user_id: 7,
        match_code: "ABC123".into(),
    };
    assert_eq!(
        serde_json::to_value(&msg).unwrap(),
        json!({
            "type": "JoinMatch",
            "data": { "request_id": REQUEST_ID, "user_id": 7, "match_code": "ABC123" }
        })
    );
}

#[test]
fn lobby_requests_carry_match_id() {
    let subscribe = ClientMessage::SubscribeLobby {
        request_id: request_id(),
        match_id: 42,
    };
    let unsubscribe = ClientMessage::UnsubscribeLobby {
        request_id: request_id(),
        match_id: 42,
    };
    let leave = ClientMessage::LeaveMatch {
        request_id: request_id(),
        match_id: 42,
        user_id: 7,
    };

    assert_eq!(serde_json::to_value(&subscribe).unwrap()["type"], "SubscribeLobby");
    assert_eq!(serde_json::to_value(&unsubscribe).unwrap()["data"]["match_id"], 42);
    assert_eq!(
        serde_json::to_value(&leave).unwrap(),
        json!({
            "type": "LeaveMatch",
            "data": { "request_id": REQUEST_ID, "match_id": 42, "user_id": 7 }
        })
    );
}

#[test]
fn client_message_request_id_and_kind() {
    let msg = ClientMessage::UnsubscribeLobby {
        request_id: request_id(),
        match_id: 1,
    };
    assert_eq!(msg.request_id(), request_id());
    assert_eq!(msg.kind(), "UnsubscribeLobby");
}

// ── ServerMessage replies ───────────────────────────────────────────

#[test]
fn match_joined_decodes_snapshot() {
    let text = json!({
        "type": "MatchJoined",
        "data": {
            "request_id": REQUEST_ID,
            "snapshot": {
                "match_id": 42,
                "code": "ABC123",
                "members": [
                    { "user_id": 1, "display_name": "Host", "is_host": true, "is_ready": false },
                    { "user_id": 7, "display_name": "Ana" }
                ]
            }
        }
    })
    .to_string();

    let msg: ServerMessage = serde_json::from_str(&text).unwrap();
    assert_eq!(msg.request_id(), Some(request_id()));
    match msg {
        ServerMessage::MatchJoined { snapshot, .. } => {
            assert_eq!(
                snapshot,
                MatchSnapshot {
                    match_id: 42,
                    code: "ABC123".into(),
                    members: vec![
                        LobbyMember::new(1, "Host").with_host(true),
                        LobbyMember::new(7, "Ana"),
                    ],
                }
            );
        }
        other => panic!("unexpected message: {other:?}"),
    }
}

#[test]
fn snapshot_without_members_defaults_to_empty() {
    let text = json!({
        "type": "MatchCreated",
        "data": {
            "request_id": REQUEST_ID,
            "snapshot": { "match_id": 9, "code": "ZZZ999" }
        }
    })
    .to_string();

    match serde_json::from_str::<ServerMessage>(&text).unwrap() {
        ServerMessage::MatchCreated { snapshot, .. } => assert!(snapshot.members.is_empty()),
        other => panic!("unexpected message: {other:?}"),
    }
}

#[test]
fn match_left_carries_success_flag() {
    let text = format!(r#"{{"type":"MatchLeft","data":{{"request_id":"{REQUEST_ID}","success":false}}}}"#);
    match serde_json::from_str::<ServerMessage>(&text).unwrap() {
        ServerMessage::MatchLeft { success, .. } => assert!(!success),
        other => panic!("unexpected message: {other:?}"),
    }
}

// ── Faults ──────────────────────────────────────────────────────────

#[test]
fn fault_uses_screaming_snake_case_codes() {
    let msg = ServerMessage::Fault {
        request_id: Some(request_id()),
        code: FaultCode::MatchAlreadyStarted,
        message: "game already running".into(),
    };
    assert_eq!(
        serde_json::to_value(&msg).unwrap(),
        json!({
            "type": "Fault",
            "data": {
                "request_id": REQUEST_ID,
                "code": "MATCH_ALREADY_STARTED",
                "message": "game already running"
            }
        })
    );
}

#[test]
fn fault_without_request_id_omits_field() {
    let msg = ServerMessage::Fault {
        request_id: None,
        code: FaultCode::ServiceUnavailable,
        message: "maintenance".into(),
    };
    let value = serde_json::to_value(&msg).unwrap();
    assert!(value["data"].get("request_id").is_none());

    let back: ServerMessage = serde_json::from_value(value).unwrap();
    assert_eq!(back.request_id(), None);
}

#[test]
fn unknown_fault_code_still_decodes() {
    let text = json!({
        "type": "Fault",
        "data": { "request_id": REQUEST_ID, "code": "SOMETHING_NEW", "message": "?" }
    })
    .to_string();

    match serde_json::from_str::<ServerMessage>(&text).unwrap() {
        ServerMessage::Fault { code, .. } => assert_eq!(code, FaultCode::Unknown),
        other => panic!("unexpected message: {other:?}"),
    }
}

// ── Pushes ──────────────────────────────────────────────────────────

#[test]
fn player_joined_push_converts_to_roster_event() {
    let text = json!({
        "type": "PlayerJoined",
        "data": {
            "match_id": 42,
            "player": { "user_id": 7, "display_name": "Ana", "is_host": true }
        }
    })
    .to_string();

    let msg: ServerMessage = serde_json::from_str(&text).unwrap();
    assert_eq!(msg.request_id(), None);
    assert_eq!(msg.kind(), "PlayerJoined");

    let push = msg.into_push().unwrap();
    assert_eq!(push.match_id, 42);
    assert_eq!(
        push.event,
        RosterEvent::PlayerJoined(LobbyMember::new(7, "Ana").with_host(true))
    );
}

#[test]
fn ready_left_and_started_pushes_convert() {
    let ready: ServerMessage = serde_json::from_value(json!({
        "type": "ReadyChanged",
        "data": { "match_id": 42, "user_id": 7, "is_ready": true }
    }))
    .unwrap();
    let left: ServerMessage = serde_json::from_value(json!({
        "type": "PlayerLeft",
        "data": { "match_id": 42, "user_id": 7 }
    }))
    .unwrap();
    let started: ServerMessage = serde_json::from_value(json!({
        "type": "GameStarted",
        "data": { "match_id": 42 }
    }))
    .unwrap();

    assert_eq!(
        ready.into_push().unwrap().event,
        RosterEvent::ReadyChanged {
            user_id: 7,
            is_ready: true
        }
    );
    assert_eq!(
        left.into_push().unwrap().event,
        RosterEvent::PlayerLeft { user_id: 7 }
    );
    assert_eq!(started.into_push().unwrap().event, RosterEvent::GameStarted);
}

#[test]
fn replies_are_not_pushes() {
    let msg = ServerMessage::LobbySubscribed {
        request_id: request_id(),
    };
    assert!(msg.into_push().is_none());
}

#[test]
fn unknown_message_type_is_rejected() {
    let text = r#"{"type":"Teleport","data":{"match_id":1}}"#;
    assert!(serde_json::from_str::<ServerMessage>(text).is_err());
}

#[test]
fn malformed_push_is_rejected() {
    // `user_id` must be an integer.
    let text = r#"{"type":"PlayerLeft","data":{"match_id":1,"user_id":"seven"}}"#;
    assert!(serde_json::from_str::<ServerMessage>(text).is_err());
}
