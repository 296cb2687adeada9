//! Score extraction from harness stdout.
//!
//! All knowledge of the harness output format lives here.

use std::sync::OnceLock;

use regex::Regex;
use tracing::warn;

/// Upper bound of the raw score scale.
pub const MAX_SCORE: f64 = 10.0;

/// Markers in priority order. The first marker present anywhere in the
/// output wins, even if a lower-priority marker appears earlier.
const MARKERS: [&str; 4] = ["Final Score", "Overall Score", "Total Score", "Score"];

fn marker_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        MARKERS
            .iter()
            .filter_map(|marker| {
                let words = marker.split(' ').collect::<Vec<_>>().join(r"\s+");
                Regex::new(&format!(
                    r"(?i)\b{words}\s*[:=]\s*(\d+(?:\.\d+)?)\s*(/\s*10\b|%)?"
                ))
                .ok()
            })
            .collect()
    })
}

/// Structured record: a final stdout line of the form `{"score": 8.5}`.
fn structured_score(stdout: &str) -> Option<f64> {
    let last = stdout.lines().rev().find(|l| !l.trim().is_empty())?;
    let value: serde_json::Value = serde_json::from_str(last.trim()).ok()?;
    value.get("score")?.as_f64()
}

/// Extract a raw score on the 0–10 scale from harness stdout.
///
/// A trailing JSON record with a numeric `score` field takes precedence over
/// textual markers. Values above 10, or carrying a `%` suffix, are read as
/// percentages. The result is clamped to `[0, 10]`; no match yields 0.
pub fn extract_score(stdout: &str) -> f64 {
    let parsed = structured_score(stdout).map(|v| (v, false)).or_else(|| {
        marker_patterns().iter().find_map(|re| {
            let caps = re.captures(stdout)?;
            let value: f64 = caps.get(1)?.as_str().parse().ok()?;
            let percent = caps.get(2).is_some_and(|m| m.as_str() == "%");
            Some((value, percent))
        })
    });

    match parsed {
        Some((value, percent)) => {
            let value = if percent || value > MAX_SCORE {
                value / 10.0
            } else {
                value
            };
            if value.is_finite() {
                value.clamp(0.0, MAX_SCORE)
            } else {
                0.0
            }
        }
        None => {
            warn!(
                output_len = stdout.len(),
                "no score marker found in harness output, defaulting to 0"
            );
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_marker() {
        assert_eq!(extract_score("running...\nScore: 7.5\n"), 7.5);
        assert_eq!(extract_score("score=6"), 6.0);
    }

    #[test]
    fn test_out_of_ten_suffix() {
        assert_eq!(extract_score("Overall Score: 8/10"), 8.0);
        assert_eq!(extract_score("Overall Score: 8 / 10"), 8.0);
    }

    #[test]
    fn test_percentages_normalised() {
        assert_eq!(extract_score("Total Score: 85"), 8.5);
        assert_eq!(extract_score("Total Score: 85%"), 8.5);
        assert_eq!(extract_score("Score: 5%"), 0.5);
    }

    #[test]
    fn test_marker_priority_not_position() {
        let out = "Score: 3\nsubtask done\nFinal Score: 9.0\n";
        assert_eq!(extract_score(out), 9.0);

        let out = "Total Score: 4\nOverall Score: 6\n";
        assert_eq!(extract_score(out), 6.0);
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(extract_score("FINAL SCORE: 4.25"), 4.25);
    }

    #[test]
    fn test_clamped() {
        assert_eq!(extract_score("Score: 250"), MAX_SCORE);
    }

    #[test]
    fn test_no_match_is_zero() {
        assert_eq!(extract_score("build ok, tests ok"), 0.0);
        assert_eq!(extract_score(""), 0.0);
        assert_eq!(extract_score("Subscore: 9"), 0.0);
    }

    #[test]
    fn test_structured_record_wins() {
        let out = "Score: 2\n{\"score\": 7.25, \"tier\": \"L1\"}\n";
        assert_eq!(extract_score(out), 7.25);
    }

    #[test]
    fn test_non_json_last_line_falls_back_to_markers() {
        assert_eq!(extract_score("Final Score: 5\n{not json"), 5.0);
    }
}
