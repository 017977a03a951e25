#![no_main]

use libfuzzer_sys::fuzz_target;
use srb_redmine::IssueReferenceMatcher;

fuzz_target!(|data: &[u8]| {
    let Ok(matcher) = IssueReferenceMatcher::new("https://tracker.example.com/redmine") else {
        return;
    };
    let text = String::from_utf8_lossy(data);

    for reference in matcher.extract_references(&text) {
        assert!(!reference.issue_id.is_empty());
        assert!(reference.issue_id.bytes().all(|byte| byte.is_ascii_digit()));
        assert!(reference.raw.ends_with(&reference.issue_id));
        assert!(text.contains(&reference.raw));
    }
});
