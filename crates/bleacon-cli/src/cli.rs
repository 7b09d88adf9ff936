//! CLI argument definitions using clap.

use clap::{Args, Parser, Subcommand, ValueEnum};
use uuid::Uuid;

use bleacon_types::ScanMode;

use crate::util::{parse_hex_bytes, parse_manufacturer_id, parse_uuid_arg};

/// A byte string given in hex on the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HexBytes(pub Vec<u8>);

fn parse_hex_arg(s: &str) -> Result<HexBytes, String> {
    parse_hex_bytes(s).map(HexBytes)
}

/// Output format for commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <Self as ValueEnum>::from_str(s, true)
    }
}

/// Scan mode as accepted on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ScanModeArg {
    /// Lowest power use, slowest discovery
    LowPower,
    /// Balanced power and latency
    Balanced,
    /// Fastest discovery, highest power use
    LowLatency,
}

impl From<ScanModeArg> for ScanMode {
    fn from(arg: ScanModeArg) -> Self {
        match arg {
            ScanModeArg::LowPower => ScanMode::LowPower,
            ScanModeArg::Balanced => ScanMode::Balanced,
            ScanModeArg::LowLatency => ScanMode::LowLatency,
        }
    }
}

/// Scan tuning shared by the scanning commands
#[derive(Debug, Clone, Args)]
pub struct ScanArgs {
    /// Stop after this many seconds (default: run until Ctrl-C)
    #[arg(short, long)]
    pub timeout: Option<u64>,

    /// Scan mode (overrides config)
    #[arg(short, long, value_enum)]
    pub mode: Option<ScanModeArg>,

    /// Deliver results in batches collected over this many milliseconds
    #[arg(long, value_name = "MS")]
    pub batch: Option<u64>,

    /// Give up if the Bluetooth scanner is not available within this many seconds
    #[arg(long, value_name = "SECS")]
    pub acquire_timeout: Option<u64>,
}

/// Reusable output format arguments
#[derive(Debug, Clone, Args)]
pub struct OutputArgs {
    /// Output format (overrides config)
    #[arg(short, long, value_enum)]
    pub format: Option<OutputFormat>,
}

#[derive(Parser)]
#[command(name = "bleacon")]
#[command(author, version, about = "Scan for BLE beacons and connect to GATT devices", long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan for advertisements of one manufacturer and print their payloads
    Scan {
        /// Manufacturer ID, decimal or 0x hex (falls back to config)
        #[arg(long, env = "BLEACON_MANUFACTURER", value_parser = parse_manufacturer_id)]
        manufacturer: Option<u16>,

        /// Ignore payloads shorter than this many bytes
        #[arg(long, default_value = "0")]
        min_len: usize,

        /// Only report payloads starting with these hex bytes
        #[arg(long, value_parser = parse_hex_arg)]
        data: Option<HexBytes>,

        /// Bit mask applied to --data before comparing
        #[arg(long, requires = "data", value_parser = parse_hex_arg)]
        mask: Option<HexBytes>,

        /// Stop after the first report
        #[arg(long)]
        once: bool,

        #[command(flatten)]
        scan: ScanArgs,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Scan for Apple iBeacon frames
    Ibeacon {
        /// Stop after the first beacon
        #[arg(long)]
        once: bool,

        #[command(flatten)]
        scan: ScanArgs,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Connect to the first matching device and read a characteristic
    Connect {
        /// Manufacturer ID, decimal or 0x hex (falls back to config)
        #[arg(long, env = "BLEACON_MANUFACTURER", value_parser = parse_manufacturer_id)]
        manufacturer: Option<u16>,

        /// Service UUID (full or 16-bit short form)
        #[arg(long, value_parser = parse_uuid_arg)]
        service: Uuid,

        /// Characteristic UUID (full or 16-bit short form)
        #[arg(long, value_parser = parse_uuid_arg)]
        characteristic: Uuid,

        /// Wait for the device instead of failing fast
        #[arg(long)]
        auto_connect: bool,

        /// Keep printing notifications after the first read
        #[arg(short, long)]
        watch: bool,

        #[command(flatten)]
        scan: ScanArgs,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Configuration subcommands
#[derive(Debug, Clone, Subcommand)]
pub enum ConfigAction {
    /// Show configuration file path
    Path,

    /// Show current configuration
    Show,

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_scan_parses_hex_manufacturer() {
        let cli = Cli::try_parse_from(["bleacon", "scan", "--manufacturer", "0x004C", "--once"]).unwrap();
        match cli.command {
            Commands::Scan {
                manufacturer, once, ..
            } => {
                assert_eq!(manufacturer, Some(0x004C));
                assert!(once);
            }
            _ => panic!("expected scan"),
        }
    }

    #[test]
    fn test_scan_data_and_mask() {
        let cli = Cli::try_parse_from([
            "bleacon", "scan", "--manufacturer", "1", "--data", "beac", "--mask", "ff00",
        ])
        .unwrap();
        match cli.command {
            Commands::Scan { data, mask, .. } => {
                assert_eq!(data, Some(HexBytes(vec![0xBE, 0xAC])));
                assert_eq!(mask, Some(HexBytes(vec![0xFF, 0x00])));
            }
            _ => panic!("expected scan"),
        }
    }

    #[test]
    fn test_mask_requires_data() {
        let result = Cli::try_parse_from(["bleacon", "scan", "--manufacturer", "1", "--mask", "ff"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_connect_accepts_short_uuids() {
        let cli = Cli::try_parse_from([
            "bleacon",
            "connect",
            "--manufacturer",
            "89",
            "--service",
            "180f",
            "--characteristic",
            "2a19",
            "--auto-connect",
        ])
        .unwrap();
        match cli.command {
            Commands::Connect {
                service,
                characteristic,
                auto_connect,
                ..
            } => {
                assert_eq!(service, bleacon_types::uuids::BATTERY_SERVICE);
                assert_eq!(characteristic, bleacon_types::uuids::BATTERY_LEVEL);
                assert!(auto_connect);
            }
            _ => panic!("expected connect"),
        }
    }

    #[test]
    fn test_scan_mode_conversion() {
        assert_eq!(ScanMode::from(ScanModeArg::LowLatency), ScanMode::LowLatency);
        let cli = Cli::try_parse_from(["bleacon", "ibeacon", "--mode", "balanced"]).unwrap();
        match cli.command {
            Commands::Ibeacon { scan, .. } => assert_eq!(scan.mode, Some(ScanModeArg::Balanced)),
            _ => panic!("expected ibeacon"),
        }
    }

    #[test]
    fn test_output_format_from_str() {
        assert_eq!("JSON".parse::<OutputFormat>(), Ok(OutputFormat::Json));
        assert!("csv".parse::<OutputFormat>().is_err());
    }
}
