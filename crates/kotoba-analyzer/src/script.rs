use std::ops::RangeInclusive;

/// Hiragana, Katakana and the CJK unified ideographs kagome's dictionary
/// covers.
pub const DEFAULT_SCRIPT_RANGES: [RangeInclusive<char>; 3] = [
    '\u{3040}'..='\u{309F}',
    '\u{30A0}'..='\u{30FF}',
    '\u{4E00}'..='\u{9FAF}',
];

/// Decides whether a text is worth sending to the tokenizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptFilter {
    ranges: Vec<RangeInclusive<char>>,
}

impl Default for ScriptFilter {
    fn default() -> Self {
        Self::new(DEFAULT_SCRIPT_RANGES.to_vec())
    }
}

impl ScriptFilter {
    /// A filter accepting any text with at least one character in `ranges`.
    #[must_use]
    pub fn new(ranges: Vec<RangeInclusive<char>>) -> Self {
        Self { ranges }
    }

    /// Whether `text` contains a character from a target script.
    #[must_use]
    pub fn matches(&self, text: &str) -> bool {
        text.chars()
            .any(|c| self.ranges.iter().any(|range| range.contains(&c)))
    }

    /// The configured ranges.
    #[must_use]
    pub fn ranges(&self) -> &[RangeInclusive<char>] {
        &self.ranges
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ranges_cover_japanese() {
        let filter = ScriptFilter::default();
        assert!(filter.matches("猫が好きです"));
        assert!(filter.matches("カタカナ"));
        assert!(filter.matches("abc ひ def"));
        assert!(!filter.matches("hello"));
        assert!(!filter.matches(""));
        // Fullwidth punctuation alone does not qualify.
        assert!(!filter.matches("。、"));
    }

    #[test]
    fn custom_ranges_replace_defaults() {
        let filter = ScriptFilter::new(vec!['a'..='c']);
        assert!(filter.matches("cab"));
        assert!(!filter.matches("猫"));
    }
}
