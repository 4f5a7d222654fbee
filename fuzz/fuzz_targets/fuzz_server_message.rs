#![no_main]

use libfuzzer_sys::fuzz_target;
use lobby_sync_client::{LobbyRoster, ServerMessage};

fuzz_target!(|data: &[u8]| {
    let Ok(msg) = serde_json::from_slice::<ServerMessage>(data) else {
        return;
    };

    // Anything that decodes as a push must fold into a roster without panicking.
    let mut roster = LobbyRoster::new();
    if let Some(push) = msg.into_push() {
        let _ = roster.apply(&push.event);
        let _ = roster.apply(&push.event);
    }
});
