//! Command-line interface definitions for the `stratuslab` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::{Args, Parser, Subcommand};

/// Top-level CLI for the `stratuslab` binary.
#[derive(Debug, Parser)]
#[command(
    name = "stratuslab",
    about = "Inspect the locations, sizes, and images of a StratusLab configuration",
    arg_required_else_help = true
)]
pub(crate) struct Cli {
    /// Path to the StratusLab user configuration file.
    #[arg(long, global = true, value_name = "PATH", env = "STRATUSLAB_USER_CONFIG")]
    pub(crate) config: Option<String>,
    /// Section to treat as the default location.
    #[arg(
        long,
        global = true,
        value_name = "ID",
        env = "STRATUSLAB_DEFAULT_LOCATION"
    )]
    pub(crate) location: Option<String>,
    /// Print JSON instead of the tabular listing.
    #[arg(long, global = true)]
    pub(crate) json: bool,
    /// Catalog to print.
    #[command(subcommand)]
    pub(crate) command: Command,
}

/// Catalog subcommands.
#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// List the locations defined by the configuration.
    #[command(name = "locations", about = "List the configured locations")]
    Locations,
    /// List the instance types.
    #[command(name = "sizes", about = "List the available instance types")]
    Sizes,
    /// List the Marketplace images of the default location.
    #[command(name = "images", about = "List the Marketplace images")]
    Images(ImagesCommand),
}

/// Arguments for the `stratuslab images` subcommand.
#[derive(Debug, Args)]
pub(crate) struct ImagesCommand {
    /// Only print the last N images of the catalog.
    #[arg(long, value_name = "N")]
    pub(crate) last: Option<usize>,
    /// Give up on the Marketplace after this many seconds.
    #[arg(long, value_name = "SECONDS")]
    pub(crate) timeout: Option<u64>,
}
