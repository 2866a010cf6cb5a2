use std::path::Path;

/// Exit codes for the ddclight CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    /// Operation completed successfully
    Success = 0,
    /// Runtime error occurred
    Error = 1,
    /// Invalid command-line usage (reserved for clap)
    Usage = 2,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> i32 {
        code as i32
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> std::process::ExitCode {
        std::process::ExitCode::from(code as u8)
    }
}

/// Error types for ddclight
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// No output directory, no device, or no usable brightness control
    #[error("{0}")]
    NotFound(String),

    /// A syscall failed; tagged with the operation and the path it touched
    #[error("{op} {path}: {source}")]
    Io {
        op: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A DDC response was malformed or failed validation
    #[error("{0}")]
    Protocol(String),

    /// A cancel flag was observed before or during an exchange
    #[error("{0} cancelled")]
    Cancelled(String),

    /// An on-disk consistency check failed (e.g. stale /dev device numbers)
    #[error("{0}")]
    Precondition(String),

    /// Session-bus error (daemon registration or client call)
    #[error("bus error: {0}")]
    Bus(#[from] zbus::Error),

    /// Display-server connection or dispatch error
    #[error("wayland error: {0}")]
    Wayland(String),
}

impl Error {
    pub fn io(op: &'static str, path: impl AsRef<Path>, source: std::io::Error) -> Error {
        Error::Io {
            op,
            path: path.as_ref().display().to_string(),
            source,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled(_))
    }

    /// Get the appropriate exit code for this error
    pub fn exit_code(&self) -> ExitCode {
        // All runtime errors use ExitCode::Error (1)
        // Usage errors are handled separately by clap
        ExitCode::Error
    }
}
