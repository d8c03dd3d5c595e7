use thiserror::Error;

/// Errors surfaced by the mining/validation core.
///
/// Binaries wrap these in `anyhow::Error` at their `main`; library code always
/// returns `Result<T, Error>` so callers can match on the specific failure.
#[derive(Debug, Error)]
pub enum Error {
    #[error("bits must be between 8 and 32, got {0}")]
    InvalidBits(u32),

    #[error("loops must be at least 1, got {0}")]
    InvalidLoops(u32),

    #[error("invalid token url '{0}'")]
    InvalidTokenUrl(String),

    #[error("failed to allocate {0} byte map")]
    ByteMapAllocation(usize),

    #[error("cryptographic RNG failure while randomizing seed")]
    RngFailure,

    #[error("cannot read config file {0}")]
    ConfigFileRead(String),

    #[error("malformed config file {0}")]
    ConfigFileParse(String),
}

pub type Result<T> = std::result::Result<T, Error>;
