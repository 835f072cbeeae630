#![no_main]

use libfuzzer_sys::fuzz_target;
use patchbot_pipeline::{parse_diff_paths, validate_diff_change};
use patchbot_safety::ProseFilter;

const MAX_DIFF_BYTES: usize = 64 * 1024;

fuzz_target!(|data: &[u8]| {
    let raw = String::from_utf8_lossy(data);
    let Ok(filter) = ProseFilter::with_default_phrases() else {
        return;
    };
    match validate_diff_change(&raw, &filter, MAX_DIFF_BYTES) {
        Ok(change) => {
            assert!(change.diff.len() <= MAX_DIFF_BYTES + 1);
            assert!(change.diff.starts_with("diff --git "));
            assert!(change.diff.ends_with('\n'));
            assert_eq!(parse_diff_paths(&change.diff), Ok(change.paths));
        }
        Err(error) => assert!(!error.reason_code().is_empty()),
    }
});
