//! Cartoflash - Cartographer probe firmware flasher
//!
//! Flashes Cartographer probe firmware over CAN, USB serial or DFU, driving
//! the katapult bootloader tooling and dfu-util around the host's Klipper
//! installation.

use clap::{CommandFactory, Parser};
use miette::Diagnostic;

mod bootloader;
mod cancel;
mod cli;
mod config;
mod error;
mod flasher;
mod katapult;
mod klippy;
mod lock;
mod orchestrator;
mod probe;
mod proc;
mod prompt;
mod release;
mod resolver;
mod service;
mod session;
mod ui;
mod wait;

use cli::{Cli, Commands, CompletionsArgs};
use config::Settings;
use error::Result;
use orchestrator::{Orchestrator, RunOptions};
use proc::HostRunner;
use prompt::TerminalPrompter;

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "cartoflash=debug"
    } else {
        "cartoflash=warn"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Generate shell completions
fn run_completions(args: CompletionsArgs) {
    let shell = match args.shell.to_lowercase().as_str() {
        "bash" => clap_complete::Shell::Bash,
        "elvish" => clap_complete::Shell::Elvish,
        "fish" => clap_complete::Shell::Fish,
        "powershell" | "pwsh" => clap_complete::Shell::PowerShell,
        "zsh" => clap_complete::Shell::Zsh,
        _ => {
            eprintln!("Unknown shell: {}", args.shell);
            eprintln!("Supported shells: bash, elvish, fish, powershell, zsh");
            std::process::exit(1);
        }
    };

    let mut cmd = <Cli as CommandFactory>::command();
    clap_complete::generate(shell, &mut cmd, "cartoflash", &mut std::io::stdout().lock());
}

fn run_flash(cli: Cli) -> Result<()> {
    let settings = Settings::load(cli.config.as_deref())?;
    let runner = HostRunner;
    let mut prompter = TerminalPrompter;

    // K-series probes only speak over their dedicated serial image
    let transport = cli
        .flash
        .map(Into::into)
        .or_else(|| cli.kseries.then_some(session::Transport::Usb));

    let opts = RunOptions {
        transport,
        channel: cli.channel,
        flash_katapult: cli.katapult,
        high_temp: cli.high_temp,
        kseries: cli.kseries,
        all_versions: cli.all,
        device: cli.device,
        assume_yes: cli.yes,
    };

    let mut orchestrator = Orchestrator::new(&runner, &settings, &mut prompter, opts);
    orchestrator.run()?;
    Ok(())
}

fn main() {
    let mut cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Some(Commands::Completions(args)) = cli.command.take() {
        run_completions(args);
        return;
    }

    if let Err(e) = run_flash(cli) {
        ui::error(&e.to_string());
        if let Some(help) = e.help() {
            eprintln!("  {help}");
        }
        std::process::exit(if e.is_fatal() { 2 } else { 1 });
    }
}
