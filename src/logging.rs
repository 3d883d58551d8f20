//! Purpose: Process-wide `tracing` subscriber for binaries embedding the client.
//! Exports: `init_logging`, `DEFAULT_LEVEL`.
//! Role: The library only emits events; callers opt into a sink here.
//! Invariants: Output goes to stderr so stdout stays machine-readable JSON.
//! Invariants: Installing twice is harmless; the first subscriber wins.
use tracing_subscriber::EnvFilter;

use crate::core::error::{Error, ErrorKind};

pub const DEFAULT_LEVEL: &str = "error";

/// Install the stderr subscriber.
///
/// An explicit `directives` string wins, then `RUST_LOG`, then [`DEFAULT_LEVEL`].
/// Returns `false` when another subscriber was already installed.
pub fn init_logging(directives: Option<&str>) -> Result<bool, Error> {
    let filter = match directives {
        Some(directives) => EnvFilter::try_new(directives).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message(format!("invalid log filter `{directives}`"))
                .with_hint("Use a level such as error, warn, info, debug or trace.")
                .with_source(err)
        })?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LEVEL)),
    };
    Ok(tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok())
}
