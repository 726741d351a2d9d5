use anyhow::Result;
use regex::Regex;
use serde::Serialize;

use super::rules::{SerialPattern, TextSource, RULES};
use crate::ocr::TextDetection;

/// Markers stripped from the front of cleaned text. Longest first.
const MARKERS: [&str; 2] = ["SERIAL", "SN"];

/// A serial number accepted from one detection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SerialCandidate {
    pub normalized_text: String,
    pub confidence: f32,
    pub pattern: SerialPattern,
}

struct CompiledRule {
    pattern: SerialPattern,
    regex: Regex,
    source: TextSource,
    isolated: bool,
    validate: fn(&str) -> bool,
}

/// Compiled rule table. Build once and reuse.
pub struct SerialFilter {
    rules: Vec<CompiledRule>,
}

impl SerialFilter {
    pub fn new() -> Result<Self> {
        let rules = RULES
            .iter()
            .map(|spec| {
                Ok(CompiledRule {
                    pattern: spec.pattern,
                    regex: Regex::new(spec.regex)?,
                    source: spec.source,
                    isolated: spec.isolated,
                    validate: spec.validate,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { rules })
    }

    /// Keeps detections above `min_confidence` whose text contains a serial.
    ///
    /// Each detection yields at most one candidate. Order follows the detections.
    pub fn filter_candidates(&self, detections: &[TextDetection], min_confidence: f32) -> Vec<SerialCandidate> {
        detections
            .iter()
            .filter(|d| d.confidence > min_confidence)
            .filter_map(|d| {
                self.match_serial(&d.raw_text).map(|(text, pattern)| SerialCandidate {
                    normalized_text: text,
                    confidence: d.confidence,
                    pattern,
                })
            })
            .collect()
    }

    /// Serial search on text that carries no confidence, reported as 1.0.
    pub fn extract_serial_from_raw_text(&self, text: &str) -> Option<SerialCandidate> {
        self.match_serial(text).map(|(normalized_text, pattern)| SerialCandidate {
            normalized_text,
            confidence: 1.0,
            pattern,
        })
    }

    /// Runs the rule table and returns the first validated match.
    pub fn match_serial(&self, text: &str) -> Option<(String, SerialPattern)> {
        let marked = text.to_uppercase();
        let cleaned = clean_text(text);

        for rule in &self.rules {
            let haystack = match rule.source {
                TextSource::Cleaned => cleaned.as_str(),
                TextSource::Marked => marked.as_str(),
            };

            // Only the leftmost match of each rule is considered
            let Some(caps) = rule.regex.captures(haystack) else {
                continue;
            };
            let Some(found) = caps.get(1).or_else(|| caps.get(0)) else {
                continue;
            };

            if rule.isolated && follows_letter(haystack, found.start()) {
                continue;
            }

            if (rule.validate)(found.as_str()) {
                return Some((found.as_str().to_string(), rule.pattern));
            }
        }

        None
    }
}

fn follows_letter(text: &str, start: usize) -> bool {
    text[..start]
        .chars()
        .next_back()
        .is_some_and(|c| c.is_ascii_alphabetic())
}

/// Uppercases, strips everything outside `[A-Z0-9]` and drops a leading
/// SERIAL/SN marker.
pub fn clean_text(text: &str) -> String {
    let stripped: String = text
        .to_uppercase()
        .chars()
        .filter(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        .collect();

    for marker in MARKERS {
        if let Some(rest) = stripped.strip_prefix(marker) {
            return rest.to_string();
        }
    }
    stripped
}

/// Highest-confidence candidate; ties go to the earliest.
pub fn best_candidate(candidates: &[SerialCandidate]) -> Option<&SerialCandidate> {
    candidates.iter().fold(None, |best, candidate| match best {
        Some(b) if b.confidence >= candidate.confidence => Some(b),
        _ => Some(candidate),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::engine::BoundingBox;

    fn detection(text: &str, confidence: f32) -> TextDetection {
        TextDetection {
            raw_text: text.to_string(),
            confidence,
            region: BoundingBox { x: 0.0, y: 0.0, width: 10.0, height: 10.0 },
        }
    }

    fn filter() -> SerialFilter {
        SerialFilter::new().unwrap()
    }

    #[test]
    fn test_six_digit_component_number() {
        let candidates = filter().filter_candidates(&[detection("158105", 0.9)], 0.3);
        assert_eq!(
            candidates,
            vec![SerialCandidate {
                normalized_text: "158105".to_string(),
                confidence: 0.9,
                pattern: SerialPattern::SixDigit,
            }]
        );
    }

    #[test]
    fn test_junk_rejected() {
        let f = filter();
        let candidates = f.filter_candidates(
            &[detection("IIIIII", 0.95), detection("11111111111111", 0.95)],
            0.3,
        );
        assert!(candidates.is_empty(), "{:?}", candidates);
    }

    #[test]
    fn test_letter_prefixed() {
        let candidates = filter().filter_candidates(&[detection("AB1234", 0.8)], 0.3);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].normalized_text, "AB1234");
        assert_eq!(candidates[0].pattern, SerialPattern::LetterPrefixed);
        assert_eq!(candidates[0].confidence, 0.8);
    }

    #[test]
    fn test_mixed_pattern() {
        let (text, pattern) = filter().match_serial("123AB45").unwrap();
        assert_eq!(text, "123AB45");
        assert_eq!(pattern, SerialPattern::Mixed);
    }

    #[test]
    fn test_marked_serial() {
        let (text, pattern) = filter().match_serial("S/N: 12AB34").unwrap();
        assert_eq!(text, "12AB34");
        assert_eq!(pattern, SerialPattern::Marked);
    }

    #[test]
    fn test_marker_stripped_before_numeric_rules() {
        let (text, pattern) = filter().match_serial("SN 158105").unwrap();
        assert_eq!(text, "158105");
        assert_eq!(pattern, SerialPattern::SixDigit);

        let (text, _) = filter().match_serial("serial: 4711").unwrap();
        assert_eq!(text, "4711");
    }

    #[test]
    fn test_alphanumeric_fallback_rule() {
        let (text, pattern) = filter().match_serial("X7Y8Z9W").unwrap();
        assert_eq!(text, "X7Y8Z9W");
        assert_eq!(pattern, SerialPattern::Alphanumeric);
    }

    #[test]
    fn test_leftmost_match_only() {
        // Leftmost 6-digit run is all ones; later rules still find a serial
        let (text, pattern) = filter().match_serial("111111-2345").unwrap();
        assert_eq!(text, "11111123");
        assert_eq!(pattern, SerialPattern::DigitRun);
    }

    #[test]
    fn test_confidence_gate_is_strict() {
        let f = filter();
        assert!(f.filter_candidates(&[detection("158105", 0.3)], 0.3).is_empty());
        assert_eq!(f.filter_candidates(&[detection("158105", 0.31)], 0.3).len(), 1);
    }

    #[test]
    fn test_one_candidate_per_detection() {
        let candidates = filter().filter_candidates(
            &[
                detection("158105", 0.9),
                detection("no text", 0.9),
                detection("4711 AB1234", 0.5),
            ],
            0.3,
        );
        let texts: Vec<&str> = candidates.iter().map(|c| c.normalized_text.as_str()).collect();
        assert_eq!(texts, vec!["158105", "AB1234"]);
    }

    #[test]
    fn test_digits_after_letter_skip_numeric_rules() {
        let (text, pattern) = filter().match_serial("Z123456").unwrap();
        assert_eq!(text, "Z123456");
        assert_eq!(pattern, SerialPattern::LetterPrefixed);
    }

    #[test]
    fn test_trailing_letter_keeps_six_digit_match() {
        let (text, pattern) = filter().match_serial("158105X").unwrap();
        assert_eq!(text, "158105");
        assert_eq!(pattern, SerialPattern::SixDigit);

        let candidates = filter().filter_candidates(&[detection("4711k", 0.7)], 0.3);
        assert_eq!(candidates[0].normalized_text, "4711");
        assert_eq!(candidates[0].pattern, SerialPattern::DigitRun);
    }

    #[test]
    fn test_raw_text_has_full_confidence() {
        let candidate = filter().extract_serial_from_raw_text("SN 158105\n").unwrap();
        assert_eq!(candidate.normalized_text, "158105");
        assert_eq!(candidate.confidence, 1.0);
        assert!(filter().extract_serial_from_raw_text("").is_none());
    }

    #[test]
    fn test_clean_text() {
        assert_eq!(clean_text("s/n: 12-ab-34"), "12AB34");
        assert_eq!(clean_text("Serial #99"), "99");
        assert_eq!(clean_text("  "), "");
    }

    #[test]
    fn test_best_candidate_ties_go_first() {
        let a = SerialCandidate {
            normalized_text: "1234".to_string(),
            confidence: 0.8,
            pattern: SerialPattern::DigitRun,
        };
        let b = SerialCandidate {
            normalized_text: "5678".to_string(),
            confidence: 0.8,
            pattern: SerialPattern::DigitRun,
        };
        let c = SerialCandidate {
            normalized_text: "9012".to_string(),
            confidence: 0.6,
            pattern: SerialPattern::DigitRun,
        };

        let candidates = vec![c, a.clone(), b];
        assert_eq!(best_candidate(&candidates), Some(&a));
        assert_eq!(best_candidate(&[]), None);
    }
}
