//! Conversion from `kotoba_config::Config` to bridge, analyzer and telemetry
//! types. Only the binary depends on both sides.

use kotoba_analyzer::{ModuleSource, ScriptFilter, WasmLoader};
use kotoba_bridge::BridgeOptions;
use kotoba_config::Config;
use kotoba_telemetry::{LogConfig, LogFormat};

/// Bridge options from the `[module]` and `[scheduler]` sections.
pub(crate) fn to_bridge_options(cfg: &Config) -> BridgeOptions {
    BridgeOptions {
        argv: cfg.module.argv.clone(),
        env: cfg.module.env.clone(),
        namespace: cfg.module.namespace.clone(),
        alias_namespaces: cfg.module.alias_namespaces.clone(),
        max_memory_pages: cfg.module.max_memory_pages,
        max_timer_refires: cfg.scheduler.max_timer_refires,
        shim: None,
    }
}

/// The script pre-filter from `[analyzer]`.
pub(crate) fn to_script_filter(cfg: &Config) -> ScriptFilter {
    ScriptFilter::new(cfg.analyzer.char_ranges())
}

/// A loader for the configured module. `source_override` wins over
/// `module.source`.
pub(crate) fn to_loader(cfg: &Config, source_override: Option<&str>) -> WasmLoader {
    let source = source_override.unwrap_or(&cfg.module.source);
    WasmLoader::new(ModuleSource::parse(source))
        .with_options(to_bridge_options(cfg))
        .with_export(cfg.module.export.clone())
}

/// Logging setup from `[logging]`. Unknown formats fall back to compact;
/// validation has already rejected them.
pub(crate) fn to_log_config(cfg: &Config) -> LogConfig {
    let format = cfg
        .logging
        .format
        .parse()
        .unwrap_or(LogFormat::Compact);
    LogConfig::new(&cfg.logging.level)
        .with_format(format)
        .with_directives(cfg.logging.directives.iter().cloned())
}
