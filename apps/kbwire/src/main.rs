//! # kbwire - Knowledge Store Client
//!
//! Command-line front end over the kbwire runtime.
//!
//! ## Usage
//!
//! ```bash
//! # Element types
//! kbwire --endpoint 127.0.0.1:8090 check 12 13
//!
//! # Identifier lookup
//! kbwire resolve nrel_main_idtf lang_en
//!
//! # Follow a set as it changes
//! kbwire members --host 42 --follow
//! ```

use clap::Parser;
use kbwire::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    // KBWIRE_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("KBWIRE_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "kbwire=info".into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    let cli = cli::Cli::parse();

    if let Err(e) = cli::execute(cli).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}
