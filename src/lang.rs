//! Lightweight English/Japanese language tagging.
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Only this many leading characters are inspected.
const SAMPLE_CHARS: usize = 1000;

/// Share of Japanese script characters (of non-whitespace) needed to tag `Ja`.
const JA_THRESHOLD: f64 = 0.3;

static JAPANESE_SCRIPT: LazyLock<Regex> = LazyLock::new(|| {
    // Hiragana, Katakana, CJK ideographs (incl. extension A), Japanese punctuation
    Regex::new(r"[\p{Hiragana}\p{Katakana}\p{Han}\u{3000}-\u{303F}]").unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Ja,
}

impl Language {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Ja => "ja",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tag `text` as Japanese or English. Unknown or empty input is English.
#[must_use]
pub fn detect_language(text: &str) -> Language {
    let sample: String = text.chars().take(SAMPLE_CHARS).collect();
    let total = sample.chars().filter(|c| !c.is_whitespace()).count();
    if total == 0 {
        return Language::En;
    }

    let japanese = JAPANESE_SCRIPT.find_iter(&sample).count();
    if japanese as f64 / total as f64 >= JA_THRESHOLD {
        Language::Ja
    } else {
        Language::En
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_english() {
        assert_eq!(
            detect_language("Revenue grew 12% year over year."),
            Language::En
        );
    }

    #[test]
    fn test_detect_japanese() {
        assert_eq!(
            detect_language("当社の売上高は前年比12%増加しました。"),
            Language::Ja
        );
    }

    #[test]
    fn test_detect_mixed_mostly_english() {
        assert_eq!(
            detect_language("The Tokyo (東京) office reported strong results this quarter."),
            Language::En
        );
    }

    #[test]
    fn test_detect_empty_defaults_to_english() {
        assert_eq!(detect_language(""), Language::En);
        assert_eq!(detect_language("   \n "), Language::En);
    }

    #[test]
    fn test_serde_tag() {
        assert_eq!(serde_json::to_string(&Language::Ja).unwrap(), "\"ja\"");
        let parsed: Language = serde_json::from_str("\"en\"").unwrap();
        assert_eq!(parsed, Language::En);
    }
}
