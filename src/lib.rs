pub mod binding;
pub mod config;
pub mod engine;
pub mod facade;
pub mod http;
pub mod registry;
pub mod runtime;
pub mod script;

pub mod check_cmd;
pub mod demo_cmd;
pub mod run_cmd;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use config::RiaConfig;
pub use engine::{MockConfig, MockEngine, RiaEngine, ScriptEngine, ScriptOutcome};
pub use facade::Ria;
pub use registry::EngineHandle;

#[derive(Debug, Error)]
pub enum RiaError {
    #[error("invalid engine handle {0}")]
    InvalidHandle(u32),
    #[error("engine {0} was already shut down")]
    AlreadyShutdown(u32),
    #[error("engine {0} state is poisoned")]
    Poisoned(u32),
    #[error("engine initialization failed: {0}")]
    InitializationFailed(String),
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
    #[error("script compilation error <{message}> at {line}:{column}: {near}...")]
    Compile {
        message: String,
        line: usize,
        column: usize,
        near: String,
    },
    #[error("no script loaded")]
    NoScriptLoaded,
    #[error("unknown script entry '{0}'")]
    UnknownEntry(String),
    #[error("entry '{entry}' expects {expected} parameters, got {given}")]
    Arity {
        entry: String,
        expected: usize,
        given: usize,
    },
    #[error("script execution error in '{entry}' at pos 0x{pos:02X}: {message}")]
    Execution {
        entry: String,
        pos: usize,
        message: String,
    },
    #[error("http error: {0}")]
    Http(String),
    #[error("operation not supported by {0} engine")]
    Unsupported(String),
    #[error("{0}")]
    Message(String),
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

pub type RiaResult<T> = Result<T, RiaError>;

impl RiaError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        RiaError::Io { context: context.into(), source }
    }

    /// Coarse classification for callers that branch on the failure class.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RiaError::InvalidHandle(_) => ErrorKind::InvalidHandle,
            RiaError::AlreadyShutdown(_) => ErrorKind::AlreadyShutdown,
            RiaError::InitializationFailed(_) => ErrorKind::InitializationFailed,
            RiaError::Compile { .. } | RiaError::NoScriptLoaded => ErrorKind::LoadFailed,
            RiaError::UnknownEntry(_) | RiaError::Arity { .. } | RiaError::Execution { .. } => {
                ErrorKind::ExecutionFailed
            }
            RiaError::Io { .. } | RiaError::Http(_) => ErrorKind::Resource,
            RiaError::Poisoned(_)
            | RiaError::Unsupported(_)
            | RiaError::Message(_)
            | RiaError::Anyhow(_) => ErrorKind::Engine,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidHandle,
    AlreadyShutdown,
    InitializationFailed,
    LoadFailed,
    ExecutionFailed,
    Resource,
    Engine,
}

/// Outcome of the most recent `execute` on a facade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(i32)]
pub enum ExecStatus {
    #[default]
    Unknown = 0,
    Ok = 1,
    Failed = 2,
}

impl ExecStatus {
    pub fn code(self) -> i32 {
        self as i32
    }
}

// Shared helpers
pub fn sha256_hex(bytes: &[u8]) -> String {
    use sha256::digest;
    digest(bytes)
}

pub fn now_string() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exec_status_codes() {
        assert_eq!(ExecStatus::Unknown.code(), 0);
        assert_eq!(ExecStatus::Ok.code(), 1);
        assert_eq!(ExecStatus::Failed.code(), 2);
        assert_eq!(ExecStatus::default(), ExecStatus::Unknown);
    }

    #[test]
    fn test_error_kind_mapping() {
        assert_eq!(RiaError::InvalidHandle(7).kind(), ErrorKind::InvalidHandle);
        assert_eq!(RiaError::AlreadyShutdown(7).kind(), ErrorKind::AlreadyShutdown);
        assert_eq!(RiaError::NoScriptLoaded.kind(), ErrorKind::LoadFailed);
        let err = RiaError::Execution { entry: "x".into(), pos: 0x1f, message: "boom".into() };
        assert_eq!(err.kind(), ErrorKind::ExecutionFailed);
        assert_eq!(err.to_string(), "script execution error in 'x' at pos 0x1F: boom");
    }

    #[test]
    fn test_sha256_hex_is_stable() {
        let digest = sha256_hex(b"abc");
        assert_eq!(digest.len(), 64);
        assert_eq!(digest, sha256_hex(b"abc"));
    }
}
