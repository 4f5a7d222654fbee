#![no_main]

use libfuzzer_sys::fuzz_target;
use lobby_sync_client::ClientMessage;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(msg) = serde_json::from_str::<ClientMessage>(s) {
            // Re-encoding a decoded request must succeed and keep its id.
            if let Ok(json) = serde_json::to_string(&msg) {
                if let Ok(again) = serde_json::from_str::<ClientMessage>(&json) {
                    assert_eq!(again.request_id(), msg.request_id());
                }
            }
        }
    }
});
