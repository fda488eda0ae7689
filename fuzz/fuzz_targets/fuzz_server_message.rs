#![no_main]

use libfuzzer_sys::fuzz_target;
use lobbylink_client::protocol::ServerMessage;

fuzz_target!(|data: &[u8]| {
    // Inbound frames are text, but the byte path covers invalid UTF-8 too.
    let _ = serde_json::from_slice::<ServerMessage>(data);

    if let Ok(text) = std::str::from_utf8(data) {
        if let Ok(msg) = serde_json::from_str::<ServerMessage>(text) {
            // Anything that decodes must encode again.
            let encoded = serde_json::to_string(&msg).expect("re-encode ServerMessage");
            let _ = serde_json::from_str::<ServerMessage>(&encoded);
        }
    }
});
