//! JSON reporter
//!
//! Outputs every file outcome as pretty-printed JSON, suitable for jq.

use crate::engine::FileOutcome;
use anyhow::Result;

/// Render outcomes as JSON
pub fn render(outcomes: &[FileOutcome]) -> Result<String> {
    Ok(serde_json::to_string_pretty(outcomes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporters::tests::test_outcomes;

    #[test]
    fn test_json_render_valid() {
        let json_str = render(&test_outcomes()).expect("render JSON");
        let parsed: serde_json::Value = serde_json::from_str(&json_str).expect("parse JSON");
        let files = parsed.as_array().expect("outcome array");
        assert_eq!(files.len(), 2);

        assert_eq!(files[0]["outcome"], "analyzed");
        let sort = &files[0]["procedures"][0];
        assert_eq!(sort["name"], "sort");
        assert_eq!(sort["verdict"]["Theta"], "O(n²)");
        assert_eq!(sort["verdict"]["provenance"], "formal");
        assert_eq!(sort["trace"][0]["rule"], "for_loop");
        assert_eq!(files[0]["procedures"][1]["verdict"]["Theta"], "none");
        assert_eq!(files[0]["procedures"][3]["status"], "skipped");

        assert_eq!(files[1]["outcome"], "parse_failed");
        assert_eq!(files[1]["line"], 4);
    }

    #[test]
    fn test_json_empty_batch() {
        let json_str = render(&[]).expect("render JSON");
        assert_eq!(json_str.trim(), "[]");
    }
}
