mod cli;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() {
    // Must run before any threads exist.
    nba_refresh::storage::init_local_offset();
    dotenvy::dotenv().ok();

    let args = cli::Cli::parse();
    let default_filter = if args.silent() {
        "nba_refresh=error"
    } else {
        "nba_refresh=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: cannot start async runtime: {e}");
            std::process::exit(1);
        }
    };

    let code = match runtime.block_on(cli::run(args)) {
        Ok(code) => code,
        Err(e) => {
            tracing::debug!(error = ?e, "command failed");
            eprintln!("Error: {e:#}");
            1
        }
    };
    drop(runtime);
    std::process::exit(code);
}
