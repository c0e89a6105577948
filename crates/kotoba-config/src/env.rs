//! Environment variable overrides.
//!
//! Unlike file layers, these are applied last: a set variable wins over
//! every file.

use std::collections::HashMap;
use std::hash::BuildHasher;

use tracing::debug;

/// Mapping from environment variable name to config field path.
struct EnvMapping {
    var_name: &'static str,
    section: &'static str,
    key: &'static str,
}

const ENV_MAPPINGS: &[EnvMapping] = &[
    EnvMapping {
        var_name: "KOTOBA_MODULE_SOURCE",
        section: "module",
        key: "source",
    },
    EnvMapping {
        var_name: "KOTOBA_MODULE_EXPORT",
        section: "module",
        key: "export",
    },
    EnvMapping {
        var_name: "KOTOBA_LOG_LEVEL",
        section: "logging",
        key: "level",
    },
    EnvMapping {
        var_name: "KOTOBA_LOG_FORMAT",
        section: "logging",
        key: "format",
    },
];

/// Names of every variable [`apply_env_overrides`] reads.
pub fn override_vars() -> impl Iterator<Item = &'static str> {
    ENV_MAPPINGS.iter().map(|m| m.var_name)
}

/// Snapshot the process environment, keeping only variables we map.
#[must_use]
pub fn collect_env_vars() -> HashMap<String, String> {
    std::env::vars()
        .filter(|(name, _)| override_vars().any(|v| v == name))
        .collect()
}

/// Write every mapped variable present in `env_vars` into `merged`.
///
/// Empty values are ignored. Returns the number of overrides applied.
pub fn apply_env_overrides<S: BuildHasher>(
    merged: &mut toml::Value,
    env_vars: &HashMap<String, String, S>,
) -> usize {
    let mut count: usize = 0;
    for mapping in ENV_MAPPINGS {
        let Some(val) = env_vars.get(mapping.var_name).filter(|v| !v.is_empty()) else {
            continue;
        };
        let Some(root) = merged.as_table_mut() else {
            continue;
        };
        let section = root
            .entry(mapping.section)
            .or_insert(toml::Value::Table(toml::map::Map::new()));
        if let Some(table) = section.as_table_mut() {
            debug!(
                var = mapping.var_name,
                field = %format_args!("{}.{}", mapping.section, mapping.key),
                "applying env var override"
            );
            table.insert(mapping.key.to_owned(), toml::Value::String(val.clone()));
            count = count.saturating_add(1);
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_replace_file_values() {
        let mut merged: toml::Value = toml::from_str(
            r#"
            [module]
            source = "from-file.wasm"
            "#,
        )
        .unwrap();
        let env = HashMap::from([
            ("KOTOBA_MODULE_SOURCE".to_owned(), "from-env.wasm".to_owned()),
            ("KOTOBA_LOG_LEVEL".to_owned(), "debug".to_owned()),
        ]);

        assert_eq!(apply_env_overrides(&mut merged, &env), 2);
        assert_eq!(merged["module"]["source"].as_str(), Some("from-env.wasm"));
        assert_eq!(merged["logging"]["level"].as_str(), Some("debug"));
    }

    #[test]
    fn empty_values_are_ignored() {
        let mut merged = toml::Value::Table(toml::map::Map::new());
        let env = HashMap::from([("KOTOBA_MODULE_EXPORT".to_owned(), String::new())]);
        assert_eq!(apply_env_overrides(&mut merged, &env), 0);
        assert!(merged.get("module").is_none());
    }

    #[test]
    fn unrelated_vars_are_untouched() {
        let mut merged = toml::Value::Table(toml::map::Map::new());
        let env = HashMap::from([("HOME".to_owned(), "/root".to_owned())]);
        assert_eq!(apply_env_overrides(&mut merged, &env), 0);
    }
}
