//! Config command implementation.

use std::path::Path;

use anyhow::{Context, Result, bail};

use crate::cli::ConfigAction;
use crate::config::Config;
use crate::format::FormatOptions;
use crate::style;

pub fn cmd_config(action: ConfigAction, config: &Config, opts: &FormatOptions) -> Result<()> {
    let path = Config::path();
    match action {
        ConfigAction::Path => println!("{}", path.display()),
        ConfigAction::Show => print!("{}", render(config)?),
        ConfigAction::Init { force } => {
            init(&path, force)?;
            println!(
                "{}",
                style::format_success(
                    &format!("Wrote default configuration to {}", path.display()),
                    opts.no_color
                )
            );
        }
    }
    Ok(())
}

fn render(config: &Config) -> Result<String> {
    toml::to_string_pretty(config).context("Failed to serialize config")
}

fn init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "Configuration already exists at {}. Use --force to overwrite.",
            path.display()
        );
    }
    Config::default().save_to(path)
}
