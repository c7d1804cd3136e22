//! Browse and manage image folders kept in an S3-compatible bucket.
//!
//! Buckets are flat. Folders are synthesised from key prefixes and `.keep`
//! markers ([`tree`]), and every folder stores each image twice: verbatim
//! under `original/` and resized under `thumb/` ([`keys::pair_paths`]).

pub mod cli;
pub mod config;
mod config_paths;
pub mod content;
pub mod error;
pub mod keys;
#[cfg(any(test, feature = "testkit"))]
pub mod memory;
pub mod mutation;
pub mod navigator;
pub mod refresh;
pub mod s3;
pub mod selection;
pub mod session;
pub mod state;
pub mod store;
pub mod thumbnail;
pub mod tree;
pub mod upload;

use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

pub use config_paths::{connection_config_path, CONFIG_ENV_VAR};
pub use error::{Error, Result};
pub use state::BrowserState;
pub use store::{ObjectStore, StoreError};

fn init_tracing(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let stderr_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(std::io::stderr)
        .with_filter(env_filter);

    tracing_subscriber::registry().with(stderr_layer).init();
}

pub fn run() {
    let args = cli::Args::parse();
    init_tracing(args.verbose);

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("Error: failed to start async runtime: {err}");
            std::process::exit(1);
        }
    };

    match runtime.block_on(args.execute()) {
        Ok(output) => {
            print!("{output}");
            if !output.ends_with('\n') {
                println!();
            }
        }
        Err(err) => {
            eprintln!("Error: {err}");
            std::process::exit(1);
        }
    }
}
