//! rbox CLI: scriptable customization of disk images.

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "rbox",
    version,
    about = "Scriptable image customization for systemd units, network profiles and mounted partitions"
)]
struct Cli {
    /// Enable debug logging and set `args.verbose` in scripts
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: rbox::cli::Commands,
}

/// Log to stderr. `RBOX_LOG` overrides the default filter.
fn setup_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_env("RBOX_LOG").unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("rbox=debug")
        } else {
            EnvFilter::new("rbox=info")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    setup_tracing(cli.verbose);
    if let Err(e) = rbox::cli::dispatch(cli.command, cli.verbose) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
