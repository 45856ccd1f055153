//! Taleforge - command-line front end for the sanitizer, key deriver and config

use std::io::Read;
use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use tracing::{debug, error};

use taleforge::{
    Result,
    cli::{Cli, Command},
    config::Config,
    key::derive_cache_key,
    sanitize::{extract_json, sanitize},
    setup_tracing,
};

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {e}");
            eprintln!("❌ {e}");
            return ExitCode::FAILURE;
        }
    };

    let outcome = match cli.command {
        Command::Sanitize { file, parse } => run_sanitize(file.as_deref(), parse),
        Command::Key {
            prompt,
            system,
            model,
            provider,
        } => {
            let model = model.unwrap_or_else(|| config.provider.default_model.clone());
            let provider = provider.unwrap_or_else(|| config.provider.name.clone());
            println!("{}", derive_cache_key(&prompt, &system, &model, &provider));
            Ok(())
        }
        Command::Config => run_config(&config),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("❌ {e}");
            ExitCode::FAILURE
        }
    }
}

fn run_sanitize(file: Option<&Path>, parse: bool) -> Result<()> {
    let raw = match file {
        Some(path) => std::fs::read_to_string(path)?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    debug!(bytes = raw.len(), "Sanitizing reply");

    if parse {
        let value: serde_json::Value = extract_json(&raw)?;
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("{}", sanitize(&raw));
    }
    Ok(())
}

fn run_config(config: &Config) -> Result<()> {
    let yaml = serde_yaml::to_string(config)
        .map_err(|e| taleforge::Error::Config(format!("cannot render configuration: {e}")))?;
    print!("{yaml}");
    Ok(())
}
