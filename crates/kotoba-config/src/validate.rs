//! Post-merge configuration validation.

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;

/// Largest accepted `scheduler.max_timer_refires`.
pub const MAX_TIMER_REFIRES_UPPER_BOUND: u32 = 1024;

/// Linear memory can never exceed 4 GiB, i.e. 65536 pages.
const MAX_MEMORY_PAGES_UPPER_BOUND: u32 = 65_536;

/// Validate a fully-merged and deserialized configuration.
///
/// # Errors
///
/// Returns the first validation error found.
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_module(config)?;
    validate_scheduler(config)?;
    validate_analyzer(config)?;
    validate_logging(config)?;
    Ok(())
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.to_owned(),
        message: message.into(),
    }
}

fn validate_module(config: &Config) -> ConfigResult<()> {
    let m = &config.module;

    if m.source.trim().is_empty() {
        return Err(ConfigError::MissingModuleSource);
    }
    if m.namespace.trim().is_empty() {
        return Err(invalid("module.namespace", "namespace must not be empty"));
    }
    if let Some(alias) = m.alias_namespaces.iter().find(|a| a.trim().is_empty()) {
        return Err(invalid(
            "module.alias_namespaces",
            format!("alias namespace '{alias}' must not be empty"),
        ));
    }
    if m.export.trim().is_empty() {
        return Err(invalid("module.export", "export must not be empty"));
    }
    if m
        .max_memory_pages
        .is_some_and(|pages| pages == 0 || pages > MAX_MEMORY_PAGES_UPPER_BOUND)
    {
        return Err(invalid(
            "module.max_memory_pages",
            format!("max_memory_pages must be between 1 and {MAX_MEMORY_PAGES_UPPER_BOUND}"),
        ));
    }
    Ok(())
}

fn validate_scheduler(config: &Config) -> ConfigResult<()> {
    let refires = config.scheduler.max_timer_refires;
    if !(1..=MAX_TIMER_REFIRES_UPPER_BOUND).contains(&refires) {
        return Err(invalid(
            "scheduler.max_timer_refires",
            format!(
                "max_timer_refires {refires} is out of range; must be between 1 and {MAX_TIMER_REFIRES_UPPER_BOUND}"
            ),
        ));
    }
    Ok(())
}

fn validate_analyzer(config: &Config) -> ConfigResult<()> {
    let a = &config.analyzer;

    if a.symbol_marker.is_empty() {
        return Err(invalid(
            "analyzer.symbol_marker",
            "symbol_marker must not be empty",
        ));
    }
    if a.script_ranges.is_empty() {
        return Err(invalid(
            "analyzer.script_ranges",
            "at least one script range is required",
        ));
    }
    for (i, range) in a.script_ranges.iter().enumerate() {
        if range.to_chars().is_none() {
            return Err(ConfigError::InvalidScriptRange {
                index: i,
                start: range.start,
                end: range.end,
            });
        }
    }
    Ok(())
}

fn validate_logging(config: &Config) -> ConfigResult<()> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_levels.contains(&config.logging.level.as_str()) {
        return Err(invalid(
            "logging.level",
            format!(
                "unsupported log level '{}'; expected one of: {}",
                config.logging.level,
                valid_levels.join(", ")
            ),
        ));
    }

    let valid_formats = ["pretty", "compact", "json", "full"];
    if !valid_formats.contains(&config.logging.format.as_str()) {
        return Err(invalid(
            "logging.format",
            format!(
                "unsupported log format '{}'; expected one of: {}",
                config.logging.format,
                valid_formats.join(", ")
            ),
        ));
    }

    Ok(())
}
