use thiserror::Error;

/// Errors surfaced by the load-runner host.
///
/// Check failures (non-200 status, slow responses) are never errors: they
/// are recorded as metrics and the run continues. Only transport-level
/// failures and host setup problems take this path.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("configuration error: {0}")]
    Config(#[from] figment::Error),

    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    /// DNS failure, refused connection, TLS handshake failure, or a broken
    /// body stream. Propagates out of the iteration uncaught; the scheduler
    /// logs it and counts the iteration as aborted.
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),
}
