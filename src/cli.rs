//! CLI definitions using clap derive API

use clap::builder::{styling::AnsiColor, Styles};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::session::Transport;

/// Cartoflash - Cartographer probe firmware flasher
#[derive(Parser, Debug)]
#[command(
    name = "cartoflash",
    author,
    version,
    color = clap::ColorChoice::Always,
    styles = Styles::styled()
        .header(AnsiColor::Green.on_default().bold())
        .usage(AnsiColor::Green.on_default().bold())
        .literal(AnsiColor::Cyan.on_default().bold())
        .placeholder(AnsiColor::Cyan.on_default()),
    about = "Flash Cartographer probe firmware over CAN, USB serial or DFU",
    long_about = "Cartoflash discovers the probe on the CAN bus, on USB serial or in DFU \
                  mode, fetches the matching firmware from the release tree, and flashes \
                  it through the katapult bootloader or dfu-util. The Klipper service is \
                  stopped for the duration and restarted afterwards.",
    after_help = "\x1b[1m\x1b[32mExamples:\x1b[0m\n    \
                  cartoflash\n    \
                  cartoflash --flash can --device 05b1f93e2a67\n    \
                  cartoflash --flash usb --kseries\n    \
                  cartoflash --katapult --channel beta\n    \
                  cartoflash --flash dfu --yes\n\n\
                  \x1b[1m\x1b[32mDocumentation:\x1b[0m\n    \
                  https://github.com/Cartographer3D/cartoflash"
)]
pub struct Cli {
    /// Flash over one transport instead of discovering
    #[arg(long, value_enum, value_name = "TRANSPORT")]
    pub flash: Option<TransportArg>,

    /// Flash the katapult deployer images instead of probe firmware
    #[arg(long)]
    pub katapult: bool,

    /// Release channel to fetch firmware from (stable, beta, or a git ref)
    #[arg(long, value_name = "CHANNEL", default_value = "stable")]
    pub channel: String,

    /// Offer the high-temperature firmware builds
    #[arg(long = "high-temp")]
    pub high_temp: bool,

    /// Creality K-series printer (uses the dedicated serial image)
    #[arg(long)]
    pub kseries: bool,

    /// Offer every firmware version, not just the newest
    #[arg(long)]
    pub all: bool,

    /// Device identifier (CAN UUID or serial path), skips the lookup
    #[arg(long, value_name = "ID")]
    pub device: Option<String>,

    /// Answer yes everywhere a prompt would appear
    #[arg(long, short = 'y')]
    pub yes: bool,

    /// Configuration file (defaults to printer_data/config/cartoflash.yaml)
    #[arg(long, short = 'c', value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Arguments for the completions command
#[derive(Parser, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for (bash, elvish, fish, powershell, zsh)
    pub shell: String,
}

/// Transport choice on the command line
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportArg {
    Can,
    Usb,
    Dfu,
}

impl From<TransportArg> for Transport {
    fn from(arg: TransportArg) -> Self {
        match arg {
            TransportArg::Can => Transport::Can,
            TransportArg::Usb => Transport::Usb,
            TransportArg::Dfu => Transport::Dfu,
        }
    }
}
