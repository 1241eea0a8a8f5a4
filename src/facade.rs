//! Binding facade over a [`ScriptEngine`].
//!
//! `Ria` forwards the five engine operations and mirrors the outcome of the
//! last `execute` in its public `status` and `result` fields. Every operation
//! also returns a `RiaResult`, so a failure cannot go unnoticed by callers
//! that use the return value.

use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::engine::{RiaEngine, ScriptEngine};
use crate::registry::EngineHandle;
use crate::{ExecStatus, RiaResult, runtime};

pub struct Ria<E: ScriptEngine = RiaEngine> {
    engine: Arc<E>,
    /// Outcome of the most recent execute
    pub status: ExecStatus,
    /// Text produced by the most recent successful execute
    pub result: String,
    /// The most recent execute created a file parser
    pub parser_ready: bool,
}

impl Ria<RiaEngine> {
    /// Facade bound to the process-wide engine, bootstrapping it on first use.
    pub fn native() -> Self {
        Ria::with_engine(runtime::global().engine())
    }
}

impl<E: ScriptEngine> Ria<E> {
    pub fn with_engine(engine: Arc<E>) -> Self {
        Ria { engine, status: ExecStatus::Unknown, result: String::new(), parser_ready: false }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn initialize(&self, temp_dir: impl AsRef<Path>) -> RiaResult<EngineHandle> {
        self.engine.initialize(temp_dir.as_ref())
    }

    pub fn load_script(&self, path: impl AsRef<Path>, handle: EngineHandle) -> RiaResult<()> {
        self.engine.load(handle, path.as_ref())
    }

    /// Run `name` with optional string parameters.
    ///
    /// On success `status` is `Ok` and `result` holds the returned text. On
    /// failure `status` is `Failed` and `result` is empty.
    pub fn execute(&mut self, name: &str, params: Option<&[&str]>, handle: EngineHandle) -> RiaResult<String> {
        let params: Vec<String> = params.unwrap_or_default().iter().map(|p| p.to_string()).collect();
        match self.engine.execute(handle, name, &params) {
            Ok(outcome) => {
                debug!(%handle, name, "execute ok");
                self.status = ExecStatus::Ok;
                self.result = outcome.value;
                self.parser_ready = outcome.parser_ready;
                Ok(self.result.clone())
            }
            Err(e) => {
                self.status = ExecStatus::Failed;
                self.result.clear();
                self.parser_ready = false;
                Err(e)
            }
        }
    }

    pub fn last_error_message(&self, handle: EngineHandle) -> RiaResult<String> {
        self.engine.last_error(handle)
    }

    pub fn shutdown(&self, handle: EngineHandle) -> RiaResult<()> {
        self.engine.shutdown(handle)
    }

    /// Apply a parsing rule created by the last script that built a parser.
    pub fn parse(&self, rule: &str, pos: &mut usize, handle: EngineHandle) -> RiaResult<Option<String>> {
        self.engine.parse(handle, rule, pos)
    }
}
