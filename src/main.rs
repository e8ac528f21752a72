//! Procedural Cloudscapes
//!
//! Main entry point that delegates to the app module.

use clap::Parser;
use cloudscapes::app;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = app::Args::parse();
    tracing::info!("Starting Procedural Cloudscapes...");
    if let Err(e) = app::run(args) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}
