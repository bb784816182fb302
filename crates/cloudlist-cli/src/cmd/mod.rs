//! Subcommands

pub mod list;
