use std::io;
use thiserror::Error;

use chaslice_raw::MsrError;

#[derive(Error, Debug)]
pub enum ChaSliceError {
    #[error(transparent)]
    Msr(#[from] MsrError),

    /// Global monitor control failed; the measurement cannot continue.
    #[error("Fatal monitor error: {0}")]
    Fatal(String),

    #[error("Affinity operation failed: {0}")]
    AffinityError(String),

    #[error("Memory allocation failed: {0}")]
    MemoryError(String),

    #[error("Topology error: {0}")]
    TopologyError(String),

    #[error("Event catalog error: {0}")]
    CatalogError(String),

    #[error("Benchmark error: {0}")]
    BenchmarkError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("Nix error: {0}")]
    NixError(#[from] nix::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Unsupported architecture: {0}")]
    UnsupportedArchitecture(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

pub type Result<T> = std::result::Result<T, ChaSliceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_msr_error_converts() {
        fn open() -> Result<()> {
            Err(MsrError::OpenFailed {
                cpu: 7,
                source: io::Error::from(io::ErrorKind::NotFound),
            })?;
            Ok(())
        }

        let err = open().unwrap_err();
        assert!(matches!(err, ChaSliceError::Msr(_)));
        assert!(err.to_string().contains("CPU 7"));
    }
}
