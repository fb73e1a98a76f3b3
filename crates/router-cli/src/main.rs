//! Catalog Router CLI entry point.

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use router_cli::cli::Cli;
use router_cli::commands;

fn main() {
    let cli = Cli::parse();

    // Secrets first from the config dir, then the working directory.
    let _ = dotenvy::from_path(cli.paths().env_file());
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::dotenv();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level().to_string()));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: failed to start async runtime: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = commands::execute(&cli, &runtime) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
