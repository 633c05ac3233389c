mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    // Try default locations
    let default_paths = [
        "./config.toml",
        "./reelscan.toml",
        "~/.config/reelscan/config.toml",
        "/etc/reelscan/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    // Return default config if no file found
    Ok(Config::default())
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    for library in &config.libraries {
        if library.path.as_os_str().is_empty() {
            anyhow::bail!("Library root with empty path");
        }
        for pattern in &library.excludes {
            if let Some(re) = pattern.strip_prefix('/').and_then(|p| p.strip_suffix('/')) {
                regex::Regex::new(re)
                    .with_context(|| format!("Invalid exclusion regex: {}", pattern))?;
            }
        }
    }

    if config.scanner.hash_path_depth > 10 {
        anyhow::bail!("scanner.hash_path_depth must be 10 or less");
    }

    if config.workers.running == 0 || config.workers.io == 0 {
        anyhow::bail!("workers.running and workers.io must be at least 1");
    }
    for host in &config.workers.host_limits {
        regex::Regex::new(&host.pattern)
            .with_context(|| format!("Invalid host limit pattern: {}", host.pattern))?;
        if host.limit == 0 {
            anyhow::bail!("Host limit for '{}' cannot be 0", host.pattern);
        }
    }

    Ok(())
}
