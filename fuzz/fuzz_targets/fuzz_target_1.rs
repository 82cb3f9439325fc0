#![no_main]

use libfuzzer_sys::fuzz_target;
use tokio::runtime::Runtime;
use wsconn::frame::decode_frame;

// A client trusts its peer far less than a server trusts its clients: any
// byte sequence a compromised or malicious server sends after the opening
// handshake reaches `decode_frame` directly. Feed it arbitrary bytes and make
// sure it only ever returns an `Err`, never panics.
fuzz_target!(|data: &[u8]| {
    let runtime = Runtime::new().unwrap();
    runtime.block_on(async move {
        let mut cursor = std::io::Cursor::new(data);
        let _ = decode_frame(&mut cursor, Some(16 << 20), true, false).await;
    });
});
