//! Status command handler

use anyhow::{Context, Result};

use bookmarks_core::backend::SCHEMA_VERSION;
use bookmarks_core::{AuthProvider, Config, LocalAuth, SqliteBackend};

use crate::output::{Output, OutputFormat};

/// How `watch` receives live updates with this configuration
pub fn live_mode(config: &Config) -> &'static str {
    if config.active_realtime_url().is_some() {
        "realtime"
    } else {
        "polling"
    }
}

/// Show status information
pub fn show(
    auth: &LocalAuth,
    backend: &SqliteBackend,
    config: &Config,
    output: &Output,
) -> Result<()> {
    let user = auth.current_user().context("Failed to read session")?;
    let count = match &user {
        Some(user) => Some(backend.count(&user.id).context("Failed to count bookmarks")?),
        None => None,
    };
    let database_path = config.database_path();
    let database_size = std::fs::metadata(&database_path).map(|m| m.len()).unwrap_or(0);

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "signed_in": user.is_some(),
                    "user": user.as_ref().map(|u| serde_json::json!({
                        "id": u.id,
                        "email": u.email,
                        "display_name": u.display_name(),
                    })),
                    "bookmarks": count,
                    "live_updates": {
                        "mode": live_mode(config),
                        "realtime_url": config.realtime_url,
                        "realtime_enabled": config.realtime_enabled,
                    },
                    "storage": {
                        "data_dir": config.data_dir,
                        "database": database_path,
                        "database_size": database_size,
                        "schema_version": SCHEMA_VERSION,
                    }
                })
            );
        }
        OutputFormat::Quiet => {
            if let Some(user) = &user {
                println!("{}", user.id);
            }
        }
        OutputFormat::Human => {
            println!("Bookmarks Status");
            println!("================");
            println!();
            println!("Account:");
            match &user {
                Some(user) => {
                    println!("  Signed in: {}", user.display_name());
                    if let Some(email) = &user.email {
                        println!("  E-mail:    {}", email);
                    }
                }
                None => println!("  Not signed in"),
            }
            println!();
            println!("Live updates:");
            println!("  Mode:   {}", live_mode(config));
            if let Some(url) = &config.realtime_url {
                println!("  Server: {}", url);
            }
            println!();
            println!("Storage:");
            println!("  Location: {}", config.data_dir.display());
            println!("  Database: {} bytes", database_size);
            if let Some(count) = count {
                println!();
                println!("Bookmarks: {}", count);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_live_mode() {
        let mut config = Config::default();
        assert_eq!(live_mode(&config), "polling");

        config.realtime_url = Some("wss://rt.example.com/socket".to_string());
        assert_eq!(live_mode(&config), "polling");

        config.realtime_enabled = true;
        assert_eq!(live_mode(&config), "realtime");
    }
}
