/// Errors produced by the shape layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StrataError {
    #[error("Failed to parse shape: {0}")]
    ParseShape(String),

    #[error("Invalid shape: {0}")]
    InvalidShape(String),
}
