//! `render-core config show` – print the fully-resolved configuration.

use anyhow::Result;
use render_core::config::RenderConfig;

pub fn run_config_show(config: &RenderConfig) -> Result<()> {
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}
