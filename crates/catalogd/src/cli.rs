//! Top-level CLI entry point. `catalogd` has no subcommands: every field
//! of [`catalogd_core::config::AppConfig`] is a top-level flag, and
//! running the binary starts the HTTP gateway.

use clap::Parser;
use catalogd_core::config::AppConfig;

#[derive(Parser, Debug)]
#[command(
    name = env!("CARGO_PKG_NAME"),
    version,
    about = "Content-addressed container-build coordinator"
)]
pub struct Cli {
    #[command(flatten)]
    pub config: AppConfig,
}
