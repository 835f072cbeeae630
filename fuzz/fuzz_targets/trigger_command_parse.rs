#![no_main]

use libfuzzer_sys::fuzz_target;
use patchbot_pipeline::{parse_trigger_command, TriggerCommand};

fuzz_target!(|data: &[u8]| {
    let raw = String::from_utf8_lossy(data);
    let command = parse_trigger_command(&raw);
    let tokens = raw.split_whitespace().collect::<Vec<_>>();
    match command {
        TriggerCommand::DryRun => assert_eq!(tokens, vec!["/ai"]),
        TriggerCommand::Apply => assert_eq!(tokens, vec!["/ai", "apply"]),
        TriggerCommand::None => {
            assert!(tokens != vec!["/ai"] && tokens != vec!["/ai", "apply"]);
        }
    }
});
