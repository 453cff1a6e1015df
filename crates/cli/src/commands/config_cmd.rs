//! `roleplayer config`: configuration commands.

use std::path::Path;

use roleplayer_config::AppConfig;

use super::{config_path, load_config};

pub fn print_default() {
    println!("{}", AppConfig::default_toml());
}

pub fn show(path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = load_config(path).map_err(|e| format!("Failed to load config: {e}"))?;
    if config.provider.api_key.is_some() {
        config.provider.api_key = Some("***".into());
    }
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

pub fn validate(path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    println!("Validating {}", config_path(path).display());

    match load_config(path) {
        Ok(config) => {
            println!("   Config parsed successfully");
            if !config.has_api_key() {
                println!("   Warning: no API key set (ROLEPLAYER_API_KEY or OPENAI_API_KEY)");
            }
            if config.tools.plugins.is_empty() && !config.tools.interpreter.enabled {
                println!("   Warning: no tools enabled");
            }

            println!();
            println!("   Provider:     {} ({:?})", config.provider.name, config.provider.mode);
            println!("   Model:        {}", config.provider.model);
            println!("   Max turns:    {}", config.agent.max_turn);
            println!("   Plugins:      {:?}", config.tools.plugins);
            println!(
                "   Interpreter:  {}",
                if config.tools.interpreter.enabled {
                    config.tools.interpreter.program.as_str()
                } else {
                    "disabled"
                }
            );
        }
        Err(e) => {
            println!("   Config error: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

pub fn path(path: Option<&Path>) {
    println!("{}", config_path(path).display());
}
