//! Command-line interface for tilestore
//!
//! This module implements the CLI commands on top of the table layer. It
//! handles argument parsing, configuration, logging setup, and the text
//! output of each command.
//!
//! ## Commands
//!
//! - **init**: Write a default `tilestore.toml`
//! - **create**: Create a table with data columns of a given cell shape,
//!   optionally adding rows and filling them with a constant
//! - **info**: Print the columns, hypercubes and change count of a table
//! - **lock**: Acquire a read or write lock on a table, hold it for a number
//!   of seconds and release it; exits with code 2 if the lock is not granted
//!
//! ## Execution Flow
//!
//! The `run` function parses command-line arguments using clap and routes
//! to the command handler. Table commands first build a `Common`,
//! which sets up logging and loads the configuration from the working
//! directory. The configuration supplies the lock option, retry timing and
//! cache sizes with which tables are opened.

mod common;
mod config;
mod create;
mod host;
mod info;
mod init;
mod lock;
mod run;

#[cfg(debug_assertions)]
pub use config::Config;

pub use create::{CreateArgs, create_table};
pub use host::Host;
pub use info::{InfoArgs, show_info};
pub use init::{InitArgs, init_config};
pub use lock::{LockArgs, lock_table};
pub use run::run;
