#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Core library for tilestore
//!
//! Tables whose array columns are stored as tiled hypercubes, shared between
//! processes through advisory lock files.
//!
//! # Module Organization
//!
//! - [`tsm`]: Tiled storage of hypercubes, their data files and tile caches
//! - [`table`]: Tables, their columns, and reference tables over a subset of rows
//! - [`lock`]: Lock files and the per-table locking state
//! - [`cache`]: Process-wide registry of open tables
//! - [`io`]: Serialization and path helpers
//! - [`commands`]: Command-line interface

pub type Result<T, E = ohno::AppError> = core::result::Result<T, E>;

pub mod cache;
pub mod io;
pub mod lock;
pub mod table;
pub mod tsm;

#[cfg(any(debug_assertions, test))]
pub mod commands;
#[cfg(not(any(debug_assertions, test)))]
mod commands;

pub use crate::commands::{Host, run};
