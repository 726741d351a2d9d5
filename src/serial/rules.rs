use serde::Serialize;

/// Which serial rule produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SerialPattern {
    SixDigit,
    DigitRun,
    LetterPrefixed,
    Mixed,
    Marked,
    Alphanumeric,
}

impl SerialPattern {
    /// Human-readable name for summaries.
    pub fn describe(&self) -> &'static str {
        match self {
            SerialPattern::SixDigit => "6-digit component number",
            SerialPattern::DigitRun => "4-8 digit number",
            SerialPattern::LetterPrefixed => "letter-prefixed number",
            SerialPattern::Mixed => "digits with embedded letters",
            SerialPattern::Marked => "S/N-marked serial",
            SerialPattern::Alphanumeric => "alphanumeric token",
        }
    }
}

/// Text a rule is matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextSource {
    /// Uppercased, symbols stripped, leading SERIAL/SN marker removed
    Cleaned,
    /// Uppercased only, so `S/N:` style markers survive
    Marked,
}

/// One row of the rule table. The serial is capture group 1 when the
/// pattern has one, otherwise the whole match.
#[derive(Debug, Clone, Copy)]
pub struct RuleSpec {
    pub pattern: SerialPattern,
    pub regex: &'static str,
    pub source: TextSource,
    /// Reject a match directly preceded by a letter, so digit-only rules do
    /// not carve `1234` out of `AB1234`
    pub isolated: bool,
    pub validate: fn(&str) -> bool,
}

/// Rules in priority order; the first one whose leftmost match validates wins.
pub const RULES: [RuleSpec; 6] = [
    RuleSpec {
        pattern: SerialPattern::SixDigit,
        regex: r"\d{6}",
        source: TextSource::Cleaned,
        isolated: true,
        validate: is_valid_serial,
    },
    RuleSpec {
        pattern: SerialPattern::DigitRun,
        regex: r"\d{4,8}",
        source: TextSource::Cleaned,
        isolated: true,
        validate: is_valid_serial,
    },
    RuleSpec {
        pattern: SerialPattern::LetterPrefixed,
        regex: r"[A-Z]{1,2}\d{4,6}",
        source: TextSource::Cleaned,
        isolated: false,
        validate: is_valid_serial,
    },
    RuleSpec {
        pattern: SerialPattern::Mixed,
        regex: r"\d{3,4}[A-Z]{1,2}\d{2,4}",
        source: TextSource::Cleaned,
        isolated: false,
        validate: is_valid_serial,
    },
    RuleSpec {
        pattern: SerialPattern::Marked,
        regex: r"(?:S/N|SN|SERIAL)[:\s]*([A-Z0-9]{4,10})",
        source: TextSource::Marked,
        isolated: false,
        validate: is_valid_serial,
    },
    RuleSpec {
        pattern: SerialPattern::Alphanumeric,
        regex: r"[A-Z0-9]{4,10}",
        source: TextSource::Cleaned,
        isolated: false,
        validate: is_valid_serial,
    },
];

/// Shared validation gate.
///
/// Length 4 to 12, not one repeated character, at least one digit and none
/// of the glyphs OCR confuses with `1` (`I`, `l`, `|`).
pub fn is_valid_serial(serial: &str) -> bool {
    let len = serial.chars().count();
    if !(4..=12).contains(&len) {
        return false;
    }

    let mut chars = serial.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if chars.all(|c| c == first) {
        return false;
    }

    if !serial.chars().any(|c| c.is_ascii_digit()) {
        return false;
    }

    !serial.chars().any(|c| matches!(c, 'I' | 'l' | '|'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_serials() {
        assert!(is_valid_serial("158105"));
        assert!(is_valid_serial("AB1234"));
        assert!(is_valid_serial("1234"));
        assert!(is_valid_serial("123456789012"));
    }

    #[test]
    fn test_length_bounds() {
        assert!(!is_valid_serial("123"));
        assert!(!is_valid_serial("1234567890123"));
        assert!(!is_valid_serial(""));
    }

    #[test]
    fn test_repeated_character_rejected() {
        assert!(!is_valid_serial("111111"));
        assert!(!is_valid_serial("IIIIII"));
    }

    #[test]
    fn test_needs_a_digit() {
        assert!(!is_valid_serial("ABCDEF"));
    }

    #[test]
    fn test_confusable_glyphs_rejected() {
        assert!(!is_valid_serial("AI1234"));
        assert!(!is_valid_serial("12l456"));
        assert!(!is_valid_serial("12|456"));
    }

    #[test]
    fn test_rule_order() {
        let order: Vec<SerialPattern> = RULES.iter().map(|r| r.pattern).collect();
        assert_eq!(
            order,
            vec![
                SerialPattern::SixDigit,
                SerialPattern::DigitRun,
                SerialPattern::LetterPrefixed,
                SerialPattern::Mixed,
                SerialPattern::Marked,
                SerialPattern::Alphanumeric,
            ]
        );
        assert_eq!(RULES[4].source, TextSource::Marked);
        assert!(RULES[0].isolated && RULES[1].isolated);
        assert!(RULES[2..].iter().all(|r| !r.isolated));
    }
}
