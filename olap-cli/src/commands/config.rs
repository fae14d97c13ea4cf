//! Config command implementation - show or save configuration

use anyhow::Result;
use std::path::PathBuf;

use crate::config::Config;

pub fn execute(config: &Config, example: bool, save: Option<PathBuf>) -> Result<()> {
    if let Some(path) = save {
        config.save_to_file(&path)?;
        log::info!("Configuration written to {}", path.display());
        return Ok(());
    }

    let text = if example {
        Config::example_toml()?
    } else {
        toml::to_string_pretty(config)?
    };
    print!("{text}");
    Ok(())
}
