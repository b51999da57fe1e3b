use crate::output::print_json;
use anyhow::Context;
use clap::Subcommand;
use labrig_core::config::{ServerConfig, WarnLevel};
use std::path::Path;

const MASK: &str = "********";

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Validate the effective configuration (file plus environment)
    Check,

    /// Print the effective configuration with secrets masked
    Show,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(path: &Path, subcmd: ConfigSubcommand, json: bool) -> anyhow::Result<()> {
    let config = ServerConfig::load(path)
        .with_context(|| format!("failed to load config from {}", path.display()))?;
    match subcmd {
        ConfigSubcommand::Check => check(&config, json),
        ConfigSubcommand::Show => show(config, json),
    }
}

// ---------------------------------------------------------------------------
// check
// ---------------------------------------------------------------------------

fn check(config: &ServerConfig, json: bool) -> anyhow::Result<()> {
    let warnings = config.validate();

    if json {
        print_json(&serde_json::json!({ "warnings": warnings }))?;
    } else if warnings.is_empty() {
        println!("Config is valid. No warnings.");
    } else {
        for w in &warnings {
            let prefix = match w.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            println!("[{prefix}] {}", w.message);
        }
    }

    if warnings.iter().any(|w| w.level == WarnLevel::Error) {
        anyhow::bail!("config check found errors");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// show
// ---------------------------------------------------------------------------

fn show(config: ServerConfig, json: bool) -> anyhow::Result<()> {
    let masked = masked(config);
    if json {
        print_json(&masked)
    } else {
        print!("{}", serde_yaml::to_string(&masked)?);
        Ok(())
    }
}

fn masked(mut config: ServerConfig) -> ServerConfig {
    if config.hub.auth_token.is_some() {
        config.hub.auth_token = Some(MASK.into());
    }
    if !config.hub.protected_lab_secret.is_empty() {
        config.hub.protected_lab_secret = MASK.into();
    }
    if !config.service_principal.client_secret.is_empty() {
        config.service_principal.client_secret = MASK.into();
    }
    config
}
