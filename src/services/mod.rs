//! Application services with filesystem side effects.
pub mod static_files;

/// Convenience alias for service results.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Errors surfaced by service operations.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("failed to prepare output directory")]
    OutputSetup(#[source] std::io::Error),
    #[error("failed to read source directory")]
    ReadSource(#[source] std::io::Error),
    #[error("failed to copy asset")]
    CopyAsset(#[source] std::io::Error),
    #[error("failed to read static manifest")]
    ReadManifest(#[source] std::io::Error),
    #[error("failed to write static manifest")]
    WriteManifest(#[source] std::io::Error),
    #[error("static manifest is not valid JSON")]
    InvalidManifest(#[source] serde_json::Error),
}
