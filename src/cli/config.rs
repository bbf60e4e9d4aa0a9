//! Conversion of CLI arguments into a [`StagingConfig`]

use crate::cli::main_impl::Cli;
use crate::config::StagingConfig;
use crate::style::Style;
use anyhow::{Context, Result};

/// Layers CLI flags over an environment-derived configuration
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Apply CLI overrides to `base`
    pub(crate) fn from_cli(cli: &Cli, base: StagingConfig) -> Result<StagingConfig> {
        let mut config = base;

        if cli.mock {
            config.force_mock = true;
        }
        if cli.single_pass {
            config.two_pass = false;
        }
        if let Some(strength) = cli.strength {
            config.single_pass_strength = strength;
        }
        if let Some(dir) = &cli.output_dir {
            config.storage_dir.clone_from(dir);
        }
        if let Some(url) = &cli.public_url {
            config.public_base_url.clone_from(url);
        }
        if let Some(dir) = &cli.debug_artifacts {
            config.save_debug_artifacts = true;
            config.debug_artifact_dir.clone_from(dir);
        }

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    /// Check arguments that clap cannot check on its own
    pub(crate) fn validate_cli(cli: &Cli) -> Result<()> {
        if Style::parse(&cli.style).is_none() {
            anyhow::bail!("--style must not be empty");
        }
        if let Some(strength) = cli.strength {
            if !(strength > 0.0 && strength <= 1.0) {
                anyhow::bail!("--strength must be in (0, 1], got {}", strength);
            }
        }
        if cli.input.is_none() && !cli.show_providers && !cli.list_models {
            anyhow::bail!("An input image path or URL is required");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn create_test_cli() -> Cli {
        Cli {
            input: Some("room.jpg".to_string()),
            style: "modern".to_string(),
            prompt: None,
            more_furniture: false,
            mock: false,
            single_pass: false,
            strength: None,
            output_dir: None,
            public_url: None,
            debug_artifacts: None,
            json: false,
            verbose: 0,
            show_providers: false,
            list_models: false,
        }
    }

    #[test]
    fn test_cli_config_conversion() {
        let mut cli = create_test_cli();
        cli.mock = true;
        cli.single_pass = true;
        cli.strength = Some(0.6);
        cli.output_dir = Some(PathBuf::from("/tmp/designs"));
        cli.public_url = Some("https://cdn.example.com".to_string());

        let config = CliConfigBuilder::from_cli(&cli, StagingConfig::default()).unwrap();

        assert!(config.force_mock);
        assert!(!config.two_pass);
        assert_eq!(config.single_pass_strength, 0.6);
        assert_eq!(config.storage_dir, PathBuf::from("/tmp/designs"));
        assert_eq!(config.public_base_url, "https://cdn.example.com");
        assert!(!config.save_debug_artifacts);
    }

    #[test]
    fn test_defaults_keep_base_config() {
        let base = StagingConfig::builder().stability_api_key("sk").build().unwrap();
        let config = CliConfigBuilder::from_cli(&create_test_cli(), base.clone()).unwrap();
        assert_eq!(config, base);
    }

    #[test]
    fn test_cli_validation() {
        let mut cli = create_test_cli();
        assert!(CliConfigBuilder::validate_cli(&cli).is_ok());

        cli.strength = Some(1.5);
        assert!(CliConfigBuilder::validate_cli(&cli).is_err());

        cli.strength = None;
        cli.style = "  ".to_string();
        assert!(CliConfigBuilder::validate_cli(&cli).is_err());

        cli.style = "modern".to_string();
        cli.input = None;
        assert!(CliConfigBuilder::validate_cli(&cli).is_err());
        cli.show_providers = true;
        assert!(CliConfigBuilder::validate_cli(&cli).is_ok());
    }
}
