#![no_main]

use libfuzzer_sys::fuzz_target;
use tjsession::{CodecSession, Limits};

fuzz_target!(|data: &[u8]| {
    let Ok(mut session) = CodecSession::open_with(Limits::strict()) else {
        return;
    };
    if let Ok(header) = session.decompress_header(data) {
        assert!(header.width > 0 && header.height > 0);
        assert!(session.header().is_some());
    }
    session.close();
});
