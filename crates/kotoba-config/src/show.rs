//! Resolved configuration display for `config show`.

use std::fmt::{self, Write as _};

use crate::types::Config;

/// A resolved configuration plus where it came from.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// The final merged configuration.
    pub config: Config,
    /// Config file paths that were loaded, lowest precedence first.
    pub loaded_files: Vec<String>,
    /// Number of `KOTOBA_*` variables that overrode file values.
    pub env_overrides: usize,
}

impl ResolvedConfig {
    /// Render as TOML, preceded by a comment header listing the loaded files.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, fmt::Error> {
        let body = toml::to_string_pretty(&self.config).map_err(|_| fmt::Error)?;

        let mut output = String::new();
        output.push_str("# Resolved kotoba configuration\n");
        if self.loaded_files.is_empty() {
            output.push_str("# No config files loaded; built-in defaults\n");
        } else {
            output.push_str("#\n# Loaded files (in precedence order):\n");
            for (i, path) in self.loaded_files.iter().enumerate() {
                writeln!(output, "#   {}. {path}", i.saturating_add(1))?;
            }
        }
        if self.env_overrides > 0 {
            writeln!(output, "# Environment overrides applied: {}", self.env_overrides)?;
        }
        output.push('\n');
        output.push_str(&body);
        Ok(output)
    }
}
