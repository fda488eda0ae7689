#![no_main]

use libfuzzer_sys::fuzz_target;
use lobbylink_client::protocol::ClientMessage;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(msg) = serde_json::from_str::<ClientMessage>(text) else {
        return;
    };
    // Outbound frames must survive an encode/decode trip unchanged.
    let encoded = serde_json::to_string(&msg).expect("encode ClientMessage");
    let decoded: ClientMessage = serde_json::from_str(&encoded).expect("decode ClientMessage");
    assert_eq!(decoded, msg);
});
