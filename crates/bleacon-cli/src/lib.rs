//! Command-line interface for BLE beacon scanning.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `scan` | Print manufacturer payloads for one manufacturer ID |
//! | `ibeacon` | Decode and print Apple iBeacon frames |
//! | `connect` | Connect to the first matching device and read a characteristic |
//! | `config` | Show, locate or initialize the config file |
//! | `completions` | Generate shell completions |
//!
//! # Output Formats
//!
//! - **Text** (default): one human-readable line per report
//! - **JSON**: one JSON object per line
//!
//! # Configuration
//!
//! The CLI reads `~/.config/bleacon/config.toml` (or platform equivalent, or
//! the path in `BLEACON_CONFIG`):
//!
//! ```toml
//! manufacturer = 0x004C
//! scan_mode = "low_latency"
//! acquire_timeout = 10
//! format = "json"
//! ```
//!
//! Explicit flags override the config file.
//!
//! # Environment Variables
//!
//! - `BLEACON_MANUFACTURER`: Default manufacturer ID (overridden by `--manufacturer`)
//! - `BLEACON_CONFIG`: Config file location
//! - `NO_COLOR`: Disable colored output when set
//!
//! # Examples
//!
//! ```bash
//! bleacon scan --manufacturer 0x0059 --min-len 4
//! bleacon ibeacon --timeout 30 --format json
//! bleacon connect --manufacturer 0x0059 --service 180f --characteristic 2a19 --watch
//! ```

pub mod cli;
pub mod commands;
pub mod config;
pub mod format;
pub mod style;
pub mod util;

// Re-export core dependencies for convenience
pub use bleacon_core;
pub use bleacon_types;
