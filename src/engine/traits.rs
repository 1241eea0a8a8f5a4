//! ScriptEngine trait and execution outcome.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::registry::EngineHandle;
use crate::{RiaError, RiaResult};

/// Result of a successful execute.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptOutcome {
    /// Text returned by the entry point (empty when it returns nothing)
    pub value: String,
    /// The entry created a file parser that `parse` can now drive
    pub parser_ready: bool,
}

impl ScriptOutcome {
    pub fn new(value: impl Into<String>) -> Self {
        ScriptOutcome { value: value.into(), parser_ready: false }
    }
}

/// A script engine that manages its own instances behind handles.
///
/// Implementations must:
/// - reject never-issued handles with `RiaError::InvalidHandle`
/// - reject handles that were shut down with `RiaError::AlreadyShutdown`
/// - record the text of every failed load or execute so that
///   `last_error` can return it later
pub trait ScriptEngine: Send + Sync {
    /// Returns the engine name (e.g., "ria").
    fn name(&self) -> &'static str;

    /// Create an instance that uses `temp_dir` for scratch files.
    fn initialize(&self, temp_dir: &Path) -> RiaResult<EngineHandle>;

    /// Load a scenario script into the instance, replacing any previous one.
    fn load(&self, handle: EngineHandle, script: &Path) -> RiaResult<()>;

    /// Run entry point `entry` of the loaded script.
    fn execute(&self, handle: EngineHandle, entry: &str, params: &[String]) -> RiaResult<ScriptOutcome>;

    /// Text of the last recorded error, or an empty string.
    fn last_error(&self, handle: EngineHandle) -> RiaResult<String>;

    /// Release the instance. The handle is dead afterwards.
    fn shutdown(&self, handle: EngineHandle) -> RiaResult<()>;

    /// Apply a parsing rule of the instance's file parser at `pos`.
    fn parse(&self, handle: EngineHandle, rule: &str, pos: &mut usize) -> RiaResult<Option<String>> {
        let _ = (handle, rule, pos);
        Err(RiaError::Unsupported(self.name().to_string()))
    }
}
