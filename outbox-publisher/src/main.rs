//! Outbox publisher service binary.
//!
//! Loads the configuration, sets up logging and drains the configured outbox table until the
//! process is asked to stop.

use std::process::ExitCode;

use outbox_config::shared::PublisherConfig;
use outbox_telemetry::tracing::init_tracing;
use tracing::error;

use crate::config::load_publisher_config;
use crate::core::start_publisher_with_config;
use crate::error::{PublisherError, PublisherResult};

mod config;
mod core;
mod error;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprint!("{}", err.render_report());
            ExitCode::FAILURE
        }
    }
}

fn run() -> PublisherResult<()> {
    let publisher_config = load_publisher_config()?;

    let _log_flusher = init_tracing(env!("CARGO_BIN_NAME")).map_err(PublisherError::config)?;

    // A single cycle is ever in flight, so one thread is enough.
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?
        .block_on(async_main(publisher_config))
}

async fn async_main(publisher_config: PublisherConfig) -> PublisherResult<()> {
    if let Err(err) = start_publisher_with_config(publisher_config).await {
        error!("{err}");
        return Err(err);
    }

    Ok(())
}
