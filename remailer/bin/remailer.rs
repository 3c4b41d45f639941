#![deny(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(clippy::must_use_candidate)]

#[cfg(not(any(target_os = "macos", unix)))]
compile_error!("Only macos and unix are currently supported");

use clap::Parser;
use remailer::cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    remailer::commands::run(Cli::parse()).await
}
