//! Config check command handler.

use std::path::Path;

use anyhow::Result;

use agentforge::config::validate::{validate_raw, DiagnosticLevel};
use agentforge::config::{load_structured_file, FactoryConfig};

use super::ConfigAction;

/// Validate configuration file.
pub(crate) async fn cmd_config(config_path: Option<&Path>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Check => {
            let config_path = config_path
                .map(Path::to_path_buf)
                .unwrap_or_else(FactoryConfig::path);
            println!("Config file: {}", config_path.display());

            if !config_path.exists() {
                println!("[OK] No config file found (using defaults)");
                return Ok(());
            }

            let raw = match load_structured_file(&config_path) {
                Ok(v) => v,
                Err(e) => {
                    println!("[ERROR] {}", e);
                    std::process::exit(1);
                }
            };

            let diagnostics = validate_raw(&raw);
            for diag in &diagnostics {
                println!("{}", diag);
            }
            let mut errors = diagnostics
                .iter()
                .filter(|d| d.level == DiagnosticLevel::Error)
                .count();

            match serde_json::from_value::<FactoryConfig>(raw) {
                Ok(config) => {
                    for problem in config.validate() {
                        println!("[ERROR] {}", problem);
                        errors += 1;
                    }
                }
                Err(e) => {
                    println!("[ERROR] {}", e);
                    errors += 1;
                }
            }

            if errors == 0 {
                println!("\nConfiguration looks good!");
            } else {
                println!("\nFound {} error(s)", errors);
                std::process::exit(1);
            }
        }
    }
    Ok(())
}
