#![no_main]

use attest_round::Submission;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = Submission::abi_decode(data) {
        assert_eq!(s.abi_encode(), data);
    }
});
