//! Logger construction.
//!
//! The library never installs a global subscriber. Callers either install
//! their own, or hand a [`Dispatch`] to the pipeline, which enters it for the
//! duration of each request.

use tracing::Dispatch;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// Formatted output to stdout. `RUST_LOG` wins over `default_filter`.
pub fn dispatch(default_filter: &str) -> Dispatch {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .finish();
    Dispatch::new(subscriber)
}

/// Plain-text output to an arbitrary writer with a fixed filter.
pub fn dispatch_to<W>(filter: &str, make_writer: W) -> Dispatch
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_ansi(false)
        .with_writer(make_writer)
        .finish();
    Dispatch::new(subscriber)
}
