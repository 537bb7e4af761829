use anyhow::{Context, Result};
use std::path::PathBuf;
use surfmap::config::{Config, DEFAULT_CONFIG_FILE};

pub fn init_config(path: PathBuf) -> Result<()> {
    std::fs::create_dir_all(&path)
        .with_context(|| format!("Failed to create directory '{}'", path.display()))?;

    let config_path = path.join(DEFAULT_CONFIG_FILE);
    if config_path.exists() {
        anyhow::bail!("{} already exists", config_path.display());
    }

    Config::default().save(&config_path)?;
    println!("Wrote default configuration to {}", config_path.display());
    Ok(())
}
