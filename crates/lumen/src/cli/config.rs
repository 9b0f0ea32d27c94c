//! The `lumen config` command for configuration management.

use clap::{Args, Subcommand};
use lumen_core::config::resolve_env_var;
use lumen_core::Config;

/// Arguments for the `config` command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Subcommands for configuration management.
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Display current configuration (secrets masked)
    Show,

    /// Show config file path
    Path,

    /// Initialize a new config file with defaults
    Init {
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
}

/// Execute the config command.
pub async fn execute(args: ConfigArgs) -> anyhow::Result<()> {
    match args.command {
        ConfigCommand::Show => {
            let config = redacted(Config::load()?);
            println!("{}", config.to_toml()?);
        }

        ConfigCommand::Path => {
            let path = Config::default_path();
            println!("{}", path.display());
        }

        ConfigCommand::Init { force } => {
            let path = Config::default_path();

            if path.exists() && !force {
                anyhow::bail!(
                    "Config file already exists at: {}\nUse --force to overwrite.",
                    path.display()
                );
            }

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            // Defaults keep the ${ENV} placeholders, so no secret lands on disk.
            let toml = Config::default().to_toml()?;
            std::fs::write(&path, toml)?;

            tracing::info!("Config file created at: {}", path.display());
            println!("Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

/// Replace resolved secrets with a mask, leaving `${VAR}` placeholders as is.
fn redacted(mut config: Config) -> Config {
    for secret in [
        &mut config.supabase.service_key,
        &mut config.supabase.anon_key,
        &mut config.vision.openai.api_key,
        &mut config.vision.anthropic.api_key,
    ] {
        *secret = mask(secret);
    }
    config
}

fn mask(value: &str) -> String {
    if value.starts_with("${") {
        return value.to_string();
    }
    match resolve_env_var(value) {
        Some(v) if v.chars().count() > 8 => format!("{}…", v.chars().take(4).collect::<String>()),
        Some(_) => "****".to_string(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_keeps_placeholders() {
        assert_eq!(mask("${OPENAI_API_KEY}"), "${OPENAI_API_KEY}");
        assert_eq!(mask(""), "");
        assert_eq!(mask("short"), "****");
        assert_eq!(mask("sk-abcdefghijkl"), "sk-a…");
    }

    #[test]
    fn test_redacted_masks_every_secret() {
        let mut config = Config::default();
        config.supabase.service_key = "service-role-secret".to_string();
        config.vision.openai.api_key = "sk-live-1234567890".to_string();

        let shown = redacted(config).to_toml().unwrap();
        assert!(!shown.contains("service-role-secret"));
        assert!(!shown.contains("sk-live-1234567890"));
        assert!(shown.contains("${SUPABASE_ANON_KEY}"));
    }
}
