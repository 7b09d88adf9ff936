use std::io;
use std::time::Duration;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use bleacon_cli::cli::{Cli, Commands};
use bleacon_cli::commands::{
    ConnectArgs, ScanRun, build_filter, cmd_config, cmd_connect, cmd_ibeacon, cmd_scan,
};
use bleacon_cli::config::{
    Config, resolve_acquire_timeout, resolve_format, resolve_manufacturer, resolve_settings,
};
use bleacon_cli::format::FormatOptions;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Handle completions command early (before tracing init)
    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(shell, &mut cmd, "bleacon", &mut io::stdout());
        return Ok(());
    }

    // When quiet mode is enabled, suppress info-level logging
    let filter = if cli.quiet {
        EnvFilter::new("warn")
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let config = Config::load();
    let opts = FormatOptions::new(cli.no_color || config.no_color);
    let quiet = cli.quiet;

    match cli.command {
        Commands::Scan {
            manufacturer,
            min_len,
            data,
            mask,
            once,
            scan,
            output,
        } => {
            let manufacturer_id = resolve_manufacturer(manufacturer, &config)?;
            let filter = build_filter(manufacturer_id, data.map(|d| d.0), mask.map(|m| m.0))?;
            let run = ScanRun {
                timeout: scan.timeout.map(Duration::from_secs),
                acquire_timeout: resolve_acquire_timeout(&scan, &config),
                settings: resolve_settings(&scan, &config),
                once,
                format: resolve_format(output.format, &config),
                quiet,
            };
            cmd_scan(manufacturer_id, min_len, filter, run, opts).await?;
        }
        Commands::Ibeacon { once, scan, output } => {
            let run = ScanRun {
                timeout: scan.timeout.map(Duration::from_secs),
                acquire_timeout: resolve_acquire_timeout(&scan, &config),
                settings: resolve_settings(&scan, &config),
                once,
                format: resolve_format(output.format, &config),
                quiet,
            };
            cmd_ibeacon(run, opts).await?;
        }
        Commands::Connect {
            manufacturer,
            service,
            characteristic,
            auto_connect,
            watch,
            scan,
            output,
        } => {
            let args = ConnectArgs {
                manufacturer_id: resolve_manufacturer(manufacturer, &config)?,
                service,
                characteristic,
                auto_connect,
                watch,
                timeout: scan.timeout.map(Duration::from_secs),
                acquire_timeout: resolve_acquire_timeout(&scan, &config),
                settings: resolve_settings(&scan, &config),
                format: resolve_format(output.format, &config),
                quiet,
            };
            cmd_connect(args, opts).await?;
        }
        Commands::Config { action } => cmd_config(action, &config, &opts)?,
        Commands::Completions { .. } => {
            // Already handled above
            unreachable!()
        }
    }

    Ok(())
}
