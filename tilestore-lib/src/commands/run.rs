//! Command dispatch logic for tilestore

use super::{CreateArgs, InfoArgs, InitArgs, LockArgs, create_table, init_config, lock_table, show_info};
use crate::{Host, Result};
use clap::builder::Styles;
use clap::builder::styling::{AnsiColor, Effects};
use clap::{Parser, Subcommand};

const CLAP_STYLES: Styles = Styles::styled()
    .header(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .usage(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .literal(AnsiColor::Cyan.on_default().effects(Effects::BOLD))
    .placeholder(AnsiColor::Cyan.on_default());

#[derive(Parser, Debug)]
#[command(name = "tilestore", version, author, long_about = None)]
#[command(about = "Create, inspect and lock tiled hypercube tables")]
#[command(styles = CLAP_STYLES)]
struct Cli {
    #[command(subcommand)]
    command: TilestoreSubcommand,
}

#[derive(Subcommand, Debug)]
enum TilestoreSubcommand {
    /// Generate a default configuration file
    Init(InitArgs),
    /// Create a table and optionally fill it
    Create(Box<CreateArgs>),
    /// Show the layout and state of a table
    Info(InfoArgs),
    /// Acquire a table lock, hold it, and release it
    Lock(LockArgs),
}

/// Dispatch command-line arguments to the appropriate handler
///
/// # Arguments
///
/// * `args` - An iterator of command-line arguments (typically from `std::env::args()`)
///
/// # Errors
///
/// Returns an error if command parsing fails or if the executed command fails
pub fn run<I, T, H>(host: &mut H, args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
    H: Host,
{
    match &Cli::parse_from(args).command {
        TilestoreSubcommand::Init(init_args) => init_config(host, init_args),
        TilestoreSubcommand::Create(create_args) => create_table(host, create_args),
        TilestoreSubcommand::Info(info_args) => show_info(host, info_args),
        TilestoreSubcommand::Lock(lock_args) => lock_table(host, lock_args),
    }
}
