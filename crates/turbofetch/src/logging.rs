//! Logging initialization
//!
//! TurboFetch logs through `tracing`; this module installs a
//! `tracing-subscriber` formatter for applications that do not bring their
//! own. Every request runs inside a `request{id, method, url}` span, so the
//! per-attempt and per-hook events carry their request id.
//!
//! ```rust,no_run
//! use turbofetch::LoggingConfig;
//!
//! LoggingConfig::default().init()?;
//! # Ok::<(), std::io::Error>(())
//! ```

use std::io;

use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::{LogOutput, LoggingConfig};

impl LoggingConfig {
    /// Initialize logging based on this configuration
    ///
    /// `RUST_LOG` takes precedence over [`LoggingConfig::level`].
    ///
    /// # Errors
    ///
    /// Returns an error if a global subscriber is already installed.
    pub fn init(&self) -> io::Result<()> {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level));

        match self.output {
            LogOutput::None => Ok(()),
            LogOutput::Stderr => init_with_writer(self, filter, io::stderr),
            LogOutput::Stdout => init_with_writer(self, filter, io::stdout),
        }
    }
}

fn init_with_writer<W>(config: &LoggingConfig, filter: EnvFilter, writer: W) -> io::Result<()>
where
    W: for<'w> fmt::MakeWriter<'w> + Send + Sync + 'static,
{
    let subscriber = tracing_subscriber::registry().with(filter);

    if config.structured {
        subscriber
            .with(fmt::layer().json().with_writer(writer))
            .try_init()
            .map_err(|e| io::Error::other(e.to_string()))
    } else {
        subscriber
            .with(fmt::layer().with_writer(writer))
            .try_init()
            .map_err(|e| io::Error::other(e.to_string()))
    }
}
