//! dbsem CLI
//!
//! Binary name: `dbsem`

use std::process;

use dbsem::{cli, signals};
use dbsem_core::CancellationToken;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let matches = cli::build_cli().get_matches();

    let cancel = CancellationToken::new();
    if let Err(e) = signals::cancel_on_signal(cancel.clone()) {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }

    match cli::handlers::dispatch(&matches, cancel).await {
        Ok(code) => process::exit(code),
        Err(err) => {
            eprintln!("Error: {err:#}");
            let code = err
                .downcast_ref::<dbsem_core::Error>()
                .map_or(2, dbsem_core::Error::exit_code);
            process::exit(code);
        }
    }
}
