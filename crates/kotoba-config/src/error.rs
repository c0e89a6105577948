use std::io;
use thiserror::Error;

/// Why a kotoba configuration could not be loaded.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A config layer exists but could not be read.
    #[error("cannot read config layer {path}: {source}")]
    ReadError {
        /// Path of the layer.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A config layer is not valid TOML, or does not fit the schema once
    /// merged.
    #[error("cannot parse config layer {path}: {source}")]
    ParseError {
        /// Path of the layer, or `<merged config>` for schema errors.
        path: String,
        /// Underlying TOML error.
        #[source]
        source: toml::de::Error,
    },

    /// A config layer is larger than any sane kotoba config.
    #[error("config layer {path} is {size} bytes, over the {limit} byte limit")]
    FileTooLarge {
        /// Path of the layer.
        path: String,
        /// Size read.
        size: u64,
        /// Accepted maximum.
        limit: u64,
    },

    /// `module.source` is empty, so there is no tokenizer module to load.
    #[error("module.source is empty; set it to a kagome .wasm path or URL")]
    MissingModuleSource,

    /// An `[[analyzer.script_ranges]]` entry is not a valid range of scalar
    /// values.
    #[error("analyzer.script_ranges[{index}]: U+{start:04X}..=U+{end:04X} is not a valid range of Unicode scalar values")]
    InvalidScriptRange {
        /// Position of the entry.
        index: usize,
        /// First code point as configured.
        start: u32,
        /// Last code point as configured.
        end: u32,
    },

    /// Any other field holds a value the bridge or analyzer cannot use.
    #[error("invalid value for '{field}': {message}")]
    ValidationError {
        /// Dotted path of the field.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// No home directory to look for `~/.kotoba/config.toml` in.
    #[error("cannot locate a home directory for ~/.kotoba/config.toml; pass --config instead")]
    NoHomeDir,
}

impl ConfigError {
    /// Dotted path of the offending field, for errors tied to one.
    #[must_use]
    pub fn field(&self) -> Option<String> {
        match self {
            Self::MissingModuleSource => Some("module.source".to_owned()),
            Self::InvalidScriptRange { index, .. } => {
                Some(format!("analyzer.script_ranges[{index}]"))
            },
            Self::ValidationError { field, .. } => Some(field.clone()),
            Self::ReadError { .. }
            | Self::ParseError { .. }
            | Self::FileTooLarge { .. }
            | Self::NoHomeDir => None,
        }
    }
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
