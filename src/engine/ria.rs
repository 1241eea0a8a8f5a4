//! The RIA interpreter as a [`ScriptEngine`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use super::traits::{ScriptEngine, ScriptOutcome};
use crate::config::RiaConfig;
use crate::http::{HttpSession, HttpTransport, ReqwestTransport, TransportFactory};
use crate::registry::{EngineHandle, HandleTable};
use crate::script::{self, Globals, Host, Limits, Module};
use crate::{RiaError, RiaResult, sha256_hex};

struct LoadedScript {
    path: PathBuf,
    digest: String,
    module: Module,
}

struct Instance {
    script: Option<LoadedScript>,
    globals: Globals,
    host: Host,
    last_error: String,
}

impl Instance {
    /// Keep the text of a failure for `last_error`.
    fn record<T>(&mut self, result: RiaResult<T>) -> RiaResult<T> {
        if let Err(e) = &result {
            self.last_error = e.to_string();
        }
        result
    }

    fn load(&mut self, path: &Path) -> RiaResult<()> {
        let bytes = std::fs::read(path)
            .map_err(|e| RiaError::io(format!("cannot open script file {}", path.display()), e))?;
        let source = String::from_utf8(bytes).map_err(|_| {
            RiaError::Message(format!("cannot read script file {}: not valid UTF-8", path.display()))
        })?;
        let module = script::compile(&source)?;
        self.globals = Globals::for_module(&module);
        self.script = Some(LoadedScript {
            path: path.to_path_buf(),
            digest: sha256_hex(source.as_bytes()),
            module,
        });
        Ok(())
    }

    fn execute(&mut self, entry: &str, params: &[String], limits: &Limits) -> RiaResult<ScriptOutcome> {
        let loaded = self.script.as_ref().ok_or(RiaError::NoScriptLoaded)?;
        self.host.parser_ready = false;
        let value = script::vm::run(&loaded.module, entry, params, &mut self.globals, &mut self.host, limits)?;
        Ok(ScriptOutcome { value, parser_ready: self.host.parser_ready })
    }
}

/// Engine backed by the built-in compiler and VM.
pub struct RiaEngine {
    config: RiaConfig,
    transport: TransportFactory,
    instances: HandleTable<Instance>,
}

impl RiaEngine {
    /// Create an engine whose HTTP builtins go through reqwest.
    pub fn new(config: RiaConfig) -> Self {
        let http = config.http.clone();
        let transport: TransportFactory =
            Arc::new(move || Ok(Box::new(ReqwestTransport::new(&http)?) as Box<dyn HttpTransport>));
        RiaEngine { config, transport, instances: HandleTable::new() }
    }

    /// Replace the transport used by instances created from now on.
    pub fn with_transport(mut self, factory: TransportFactory) -> Self {
        self.transport = factory;
        self
    }

    pub fn config(&self) -> &RiaConfig {
        &self.config
    }

    pub fn live_instances(&self) -> usize {
        self.instances.live_count()
    }

    fn limits(&self) -> Limits {
        Limits { max_steps: self.config.max_steps, max_result_bytes: self.config.max_result_bytes }
    }

    /// Path and SHA-256 of the script loaded into `handle`, if any.
    pub fn script_info(&self, handle: EngineHandle) -> RiaResult<Option<(PathBuf, String)>> {
        self.instances
            .with(handle, |inst| inst.script.as_ref().map(|s| (s.path.clone(), s.digest.clone())))
    }
}

impl Default for RiaEngine {
    fn default() -> Self {
        Self::new(RiaConfig::default())
    }
}

impl ScriptEngine for RiaEngine {
    fn name(&self) -> &'static str {
        "ria"
    }

    fn initialize(&self, temp_dir: &Path) -> RiaResult<EngineHandle> {
        if !temp_dir.is_dir() {
            return Err(RiaError::InitializationFailed(format!(
                "temp directory {} does not exist",
                temp_dir.display()
            )));
        }
        let instance = Instance {
            script: None,
            globals: Globals::default(),
            host: Host::new(
                temp_dir.to_path_buf(),
                HttpSession::new(Arc::clone(&self.transport)).with_max_redirects(self.config.http.max_redirects),
            ),
            last_error: String::new(),
        };
        let handle = self.instances.insert(instance)?;
        info!(%handle, temp_dir = %temp_dir.display(), "engine initialized");
        Ok(handle)
    }

    fn load(&self, handle: EngineHandle, script: &Path) -> RiaResult<()> {
        self.instances.with(handle, |inst| {
            let result = inst.load(script);
            match &result {
                Ok(()) => info!(%handle, script = %script.display(), "script loaded"),
                Err(e) => warn!(%handle, script = %script.display(), error = %e, "script load failed"),
            }
            inst.record(result)
        })?
    }

    fn execute(&self, handle: EngineHandle, entry: &str, params: &[String]) -> RiaResult<ScriptOutcome> {
        let limits = self.limits();
        self.instances.with(handle, |inst| {
            let result = inst.execute(entry, params, &limits);
            if let Err(e) = &result {
                warn!(%handle, entry, error = %e, "execute failed");
            }
            inst.record(result)
        })?
    }

    fn last_error(&self, handle: EngineHandle) -> RiaResult<String> {
        self.instances.with(handle, |inst| inst.last_error.clone())
    }

    fn shutdown(&self, handle: EngineHandle) -> RiaResult<()> {
        self.instances.retire(handle, |inst| {
            inst.script = None;
            inst.host.parser = None;
        })?;
        info!(%handle, live = self.instances.live_count(), "engine shut down");
        Ok(())
    }

    fn parse(&self, handle: EngineHandle, rule: &str, pos: &mut usize) -> RiaResult<Option<String>> {
        self.instances.with(handle, |inst| {
            let result = match inst.host.parser.as_mut() {
                Some(parser) => parser.apply(rule, pos),
                None => Err(RiaError::Message("no parser was created".into())),
            };
            inst.record(result)
        })?
    }
}
