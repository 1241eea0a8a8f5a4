//! Process-wide engine runtime.
//!
//! One [`RiaEngine`] is shared by every facade in the process. It is built
//! either explicitly at startup with [`bootstrap`] or on first use through
//! [`global`], and it lives until the process exits. Engine instances inside
//! it are still created and released per handle.

use std::sync::{Arc, OnceLock};

use tracing::{debug, info, warn};

use crate::config::RiaConfig;
use crate::engine::RiaEngine;

pub struct Runtime {
    engine: Arc<RiaEngine>,
    started_at: String,
}

static RUNTIME: OnceLock<Runtime> = OnceLock::new();

impl Runtime {
    fn new(config: RiaConfig) -> Self {
        info!(temp_dir = %config.temp_dir.display(), "ria runtime started");
        Runtime { engine: Arc::new(RiaEngine::new(config)), started_at: crate::now_string() }
    }

    pub fn engine(&self) -> Arc<RiaEngine> {
        Arc::clone(&self.engine)
    }

    pub fn config(&self) -> &RiaConfig {
        self.engine.config()
    }

    /// RFC 3339 time at which the runtime was built.
    pub fn started_at(&self) -> &str {
        &self.started_at
    }
}

/// Build the runtime with `config`. Later calls return the existing runtime
/// and ignore their config.
pub fn bootstrap(config: RiaConfig) -> &'static Runtime {
    let mut pending = Some(config);
    let runtime = RUNTIME.get_or_init(|| Runtime::new(pending.take().unwrap_or_default()));
    if pending.is_some() {
        debug!("ria runtime already running; bootstrap config ignored");
    }
    runtime
}

/// The runtime, bootstrapped from the environment on first use.
pub fn global() -> &'static Runtime {
    RUNTIME.get_or_init(|| {
        let config = RiaConfig::load(None).unwrap_or_else(|e| {
            warn!(error = %e, "ignoring invalid environment config");
            RiaConfig::default()
        });
        Runtime::new(config)
    })
}

pub fn is_initialized() -> bool {
    RUNTIME.get().is_some()
}
