//! Config command handlers

use std::path::PathBuf;

use anyhow::{Context, Result};

use bookmarks_core::Config;

use crate::output::{Output, OutputFormat};

/// Show current configuration
pub fn show(config_path: Option<&PathBuf>, output: &Output) -> Result<()> {
    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "data_dir": config.data_dir,
                    "site_origin": config.site_origin,
                    "realtime_url": config.realtime_url,
                    "api_key": config.api_key.as_ref().map(|_| "(set)"),
                    "realtime_enabled": config.realtime_enabled,
                    "heartbeat_secs": config.heartbeat_secs,
                    "log_file": config.log_file
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", config.data_dir.display());
        }
        OutputFormat::Human => {
            let effective_path = config_path
                .cloned()
                .unwrap_or_else(Config::config_file_path);
            println!("Configuration:");
            println!("  data_dir:         {}", config.data_dir.display());
            println!("  site_origin:      {}", config.site_origin);
            println!(
                "  realtime_url:     {}",
                config.realtime_url.as_deref().unwrap_or("(not set)")
            );
            println!(
                "  api_key:          {}",
                if config.api_key.is_some() {
                    "(set)"
                } else {
                    "(not set)"
                }
            );
            println!("  realtime_enabled: {}", config.realtime_enabled);
            println!("  heartbeat_secs:   {}", config.heartbeat_secs);
            println!(
                "  log_file:         {}",
                config
                    .log_file
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "(not set)".to_string())
            );
            println!();
            println!("Config file: {}", effective_path.display());
        }
    }

    Ok(())
}

/// Set a configuration value
pub fn set(
    key: String,
    value: String,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    let mut config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    // "none" clears optional values
    let value = if value == "none" { String::new() } else { value };
    config.set_value(&key, &value)?;

    // Save to the CLI-specified path or default
    let save_path = config_path
        .cloned()
        .unwrap_or_else(Config::config_file_path);
    config
        .save_to_path(&save_path)
        .context("Failed to save configuration")?;

    let shown = if key == "api_key" && !value.is_empty() {
        "(set)"
    } else {
        value.as_str()
    };
    output.success(&format!("Set {} = {}", key, shown));

    Ok(())
}
