//! Mock engine for testing.

use std::collections::HashMap;
use std::path::Path;

use super::traits::{ScriptEngine, ScriptOutcome};
use crate::registry::{EngineHandle, HandleTable};
use crate::{RiaError, RiaResult};

/// Configuration for mock engine responses.
#[derive(Debug, Clone, Default)]
pub struct MockConfig {
    /// Values returned per entry, in call order; the last one repeats
    pub results: HashMap<String, Vec<String>>,
    /// Entries that fail, with the message they record
    pub failures: HashMap<String, String>,
    /// Message for a failing load, if load should fail
    pub load_failure: Option<String>,
    /// Whether initialize should fail
    pub init_fails: bool,
}

impl MockConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return `value` every time `entry` runs.
    pub fn with_result(mut self, entry: &str, value: impl Into<String>) -> Self {
        self.results.insert(entry.to_ascii_lowercase(), vec![value.into()]);
        self
    }

    /// Return `values` one per run of `entry`.
    pub fn with_sequence<I, S>(mut self, entry: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.results.insert(entry.to_ascii_lowercase(), values.into_iter().map(Into::into).collect());
        self
    }

    /// Make `entry` fail with `message`.
    pub fn with_failure(mut self, entry: &str, message: impl Into<String>) -> Self {
        self.failures.insert(entry.to_ascii_lowercase(), message.into());
        self
    }

    /// Make load fail.
    pub fn load_fails(mut self, message: impl Into<String>) -> Self {
        self.load_failure = Some(message.into());
        self
    }

    /// Make initialize fail.
    pub fn init_fails(mut self) -> Self {
        self.init_fails = true;
        self
    }
}

#[derive(Debug, Default)]
struct MockInstance {
    loaded: bool,
    calls: HashMap<String, usize>,
    last_error: String,
}

impl MockInstance {
    fn fail<T>(&mut self, err: RiaError) -> RiaResult<T> {
        self.last_error = err.to_string();
        Err(err)
    }
}

/// Mock engine for unit testing.
///
/// Scripts are never read from disk; every entry answers from [`MockConfig`].
pub struct MockEngine {
    config: MockConfig,
    instances: HandleTable<MockInstance>,
}

impl MockEngine {
    pub fn new(config: MockConfig) -> Self {
        MockEngine { config, instances: HandleTable::new() }
    }

    /// How many times `entry` ran on `handle`.
    pub fn call_count(&self, handle: EngineHandle, entry: &str) -> RiaResult<usize> {
        self.instances
            .with(handle, |inst| inst.calls.get(&entry.to_ascii_lowercase()).copied().unwrap_or(0))
    }
}

impl ScriptEngine for MockEngine {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn initialize(&self, temp_dir: &Path) -> RiaResult<EngineHandle> {
        if self.config.init_fails {
            return Err(RiaError::InitializationFailed(format!(
                "mock refused temp dir {}",
                temp_dir.display()
            )));
        }
        self.instances.insert(MockInstance::default())
    }

    fn load(&self, handle: EngineHandle, script: &Path) -> RiaResult<()> {
        self.instances.with(handle, |inst| match &self.config.load_failure {
            Some(message) => inst.fail(RiaError::Message(format!("{}: {message}", script.display()))),
            None => {
                inst.loaded = true;
                Ok(())
            }
        })?
    }

    fn execute(&self, handle: EngineHandle, entry: &str, _params: &[String]) -> RiaResult<ScriptOutcome> {
        let key = entry.to_ascii_lowercase();
        self.instances.with(handle, |inst| {
            if !inst.loaded {
                return inst.fail(RiaError::NoScriptLoaded);
            }
            let call = inst.calls.entry(key.clone()).or_insert(0);
            let index = *call;
            *call += 1;
            if let Some(message) = self.config.failures.get(&key) {
                return inst.fail(RiaError::Execution { entry: key.clone(), pos: 0, message: message.clone() });
            }
            match self.config.results.get(&key) {
                Some(values) if !values.is_empty() => {
                    Ok(ScriptOutcome::new(values[index.min(values.len() - 1)].clone()))
                }
                _ => inst.fail(RiaError::UnknownEntry(entry.to_string())),
            }
        })?
    }

    fn last_error(&self, handle: EngineHandle) -> RiaResult<String> {
        self.instances.with(handle, |inst| inst.last_error.clone())
    }

    fn shutdown(&self, handle: EngineHandle) -> RiaResult<()> {
        self.instances.retire(handle, |_| ())
    }
}
