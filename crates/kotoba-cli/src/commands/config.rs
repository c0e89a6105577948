//! CLI handlers for the `kotoba config` subcommand.

use anyhow::{Context, Result};
use kotoba_config::ResolvedConfig;

/// Print the resolved configuration as TOML.
pub(crate) fn show_config(resolved: &ResolvedConfig) -> Result<()> {
    let output = resolved
        .to_toml()
        .context("failed to format config")?;
    print!("{output}");
    Ok(())
}
