use thiserror::Error;

#[derive(Error, Debug)]
pub enum PdfPressError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Invalid input file: {0}")]
    InvalidInput(String),

    #[error("Compression tool unavailable: {0}")]
    ToolUnavailable(String),

    #[error("Compression failed: {0}")]
    Compression(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
