//! Configuration types.
//!
//! These types have no dependency on the bridge or analyzer crates; the
//! binary converts them into `BridgeOptions` and `ScriptFilter` at startup.
//! Every struct implements [`Default`] with the same values as the embedded
//! `defaults.toml`, so a bare `[section]` header still yields a working
//! configuration.

use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where the tokenizer module comes from and how it is linked.
    pub module: ModuleSection,
    /// Timer behaviour of the host bridge.
    pub scheduler: SchedulerSection,
    /// Script pre-filter and token presentation.
    pub analyzer: AnalyzerSection,
    /// Logging level, format, and per-crate directives.
    pub logging: LoggingSection,
}

// ---------------------------------------------------------------------------
// ModuleSection
// ---------------------------------------------------------------------------

/// Guest module location and linking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleSection {
    /// File path or `http(s)://` URL of the tokenizer module.
    pub source: String,
    /// Import namespace the module links against.
    pub namespace: String,
    /// Extra namespaces that expose the same imports.
    pub alias_namespaces: Vec<String>,
    /// Global function called to tokenize a text.
    pub export: String,
    /// Process arguments passed to the guest.
    pub argv: Vec<String>,
    /// Upper bound on guest linear memory, in 64 KiB pages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_memory_pages: Option<u32>,
    /// Environment variables passed to the guest.
    pub env: BTreeMap<String, String>,
}

impl Default for ModuleSection {
    fn default() -> Self {
        Self {
            source: "kagome.wasm".to_owned(),
            namespace: "gojs".to_owned(),
            alias_namespaces: vec!["go".to_owned()],
            export: "kagome_tokenize".to_owned(),
            argv: vec!["js".to_owned()],
            max_memory_pages: None,
            env: BTreeMap::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// SchedulerSection
// ---------------------------------------------------------------------------

/// Timer handling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSection {
    /// Extra resumes a fired timer may trigger before it is dropped.
    pub max_timer_refires: u32,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            max_timer_refires: 16,
        }
    }
}

// ---------------------------------------------------------------------------
// AnalyzerSection
// ---------------------------------------------------------------------------

/// An inclusive range of Unicode scalar values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptRange {
    /// First code point.
    pub start: u32,
    /// Last code point, inclusive.
    pub end: u32,
}

impl ScriptRange {
    /// The range as characters, or `None` when either end is not a valid
    /// scalar value or the range is reversed.
    #[must_use]
    pub fn to_chars(self) -> Option<RangeInclusive<char>> {
        let start = char::from_u32(self.start)?;
        let end = char::from_u32(self.end)?;
        (start <= end).then_some(start..=end)
    }
}

/// Script pre-filter and token presentation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerSection {
    /// Part-of-speech prefix marking symbols and punctuation.
    pub symbol_marker: String,
    /// Texts without a character in one of these ranges are not tokenized.
    pub script_ranges: Vec<ScriptRange>,
}

impl Default for AnalyzerSection {
    fn default() -> Self {
        Self {
            symbol_marker: "記号".to_owned(),
            script_ranges: vec![
                ScriptRange {
                    start: 0x3040,
                    end: 0x309F,
                },
                ScriptRange {
                    start: 0x30A0,
                    end: 0x30FF,
                },
                ScriptRange {
                    start: 0x4E00,
                    end: 0x9FAF,
                },
            ],
        }
    }
}

impl AnalyzerSection {
    /// The configured ranges as characters. Invalid ranges are skipped;
    /// validation rejects them before this is reached.
    #[must_use]
    pub fn char_ranges(&self) -> Vec<RangeInclusive<char>> {
        self.script_ranges
            .iter()
            .filter_map(|r| r.to_chars())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// LoggingSection
// ---------------------------------------------------------------------------

/// Logging and tracing configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Global log level filter (`"trace"`, `"debug"`, `"info"`, `"warn"`,
    /// `"error"`).
    pub level: String,
    /// Output format: `"pretty"`, `"compact"`, `"json"`, or `"full"`.
    pub format: String,
    /// Per-crate tracing directives (e.g. `["kotoba_bridge=trace"]`).
    pub directives: Vec<String>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: "compact".to_owned(),
            directives: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_sections_get_defaults() {
        let config: Config = toml::from_str("[module]\n[scheduler]\n").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn script_range_conversion() {
        let hira = ScriptRange {
            start: 0x3040,
            end: 0x309F,
        };
        assert_eq!(hira.to_chars(), Some('\u{3040}'..='\u{309F}'));

        let reversed = ScriptRange {
            start: 0x309F,
            end: 0x3040,
        };
        assert_eq!(reversed.to_chars(), None);

        let surrogate = ScriptRange {
            start: 0xD800,
            end: 0xD8FF,
        };
        assert_eq!(surrogate.to_chars(), None);
    }

    #[test]
    fn default_ranges_cover_japanese() {
        let ranges = AnalyzerSection::default().char_ranges();
        assert_eq!(ranges.len(), 3);
        for c in ['あ', 'カ', '猫'] {
            assert!(ranges.iter().any(|r| r.contains(&c)), "{c} not covered");
        }
    }
}
