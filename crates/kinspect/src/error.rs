use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("symbol not yet available: {0}")]
    SymbolPending(String),

    #[error("struct layout not yet available: {0}")]
    LayoutPending(String),

    #[error("struct {0} has no member {1}")]
    MissingMember(String, String),

    #[error("{0}")]
    ArgumentType(String),

    #[error("no cpu {cpu} in this image ({nr_cpus} cpus)")]
    NoSuchCpu { cpu: u32, nr_cpus: u32 },

    #[error("failed to read image memory at {address:#x}: {message}")]
    ImageRead { address: u64, message: String },

    #[error("unterminated or corrupt list at {head:#x}")]
    CorruptList { head: u64 },

    #[error("no task with pid {0}")]
    TaskNotFound(i32),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Check if this error is retryable: the required symbol or layout may
    /// still arrive via a symbol-table extension.
    pub fn is_pending(&self) -> bool {
        matches!(self, Error::SymbolPending(_) | Error::LayoutPending(_))
    }
}
