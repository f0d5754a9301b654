#![no_main]

use chrono::Utc;
use libfuzzer_sys::fuzz_target;
use sentinel_capture::{LinkType, RawFrame, extract};

fuzz_target!(|data: &[u8]| {
    // 링크 타입과 무관하게 패닉 없이 Ok 또는 Err을 반환해야 한다
    for link in [LinkType::Ethernet, LinkType::LinuxSll, LinkType::RawIp] {
        let frame = RawFrame::new(Utc::now(), link, data.to_vec());
        if let Ok(flow) = extract(&frame) {
            assert_eq!(flow.size, data.len());
        }
    }
});
