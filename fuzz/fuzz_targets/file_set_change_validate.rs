#![no_main]

use libfuzzer_sys::fuzz_target;
use patchbot_pipeline::validate_file_set_change;
use patchbot_safety::PathPolicy;

fuzz_target!(|data: &[u8]| {
    let raw = String::from_utf8_lossy(data);
    let Ok(policy) = PathPolicy::default_for_exact_files(&["web/index.html".to_string()]) else {
        return;
    };
    match validate_file_set_change(&raw, "fuzz summary") {
        Ok(change) => {
            assert!(!change.files.is_empty());
            assert!(!change.summary.trim().is_empty());
            for file in &change.files {
                let decision = policy.evaluate(&file.path, "");
                assert!(!decision.reason_code.is_empty());
                if decision.accepted {
                    assert_eq!(file.path, "web/index.html");
                }
            }
        }
        Err(error) => assert!(!error.reason_code().is_empty()),
    }
});
