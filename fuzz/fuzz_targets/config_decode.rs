#![no_main]

use attestation_client::AttesterConfig;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        if let Ok(config) = AttesterConfig::from_json_str(text) {
            let schedule = config.round_schedule();
            assert!(schedule.commit_at(0) > schedule.round_end(0));
        }
    }
});
