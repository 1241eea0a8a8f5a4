//! Legacy integration surface.
//!
//! The native library was driven through integer handles, boolean returns
//! and two mutable fields. `RiaBinding` keeps that shape on top of [`Ria`]
//! for hosts that were written against it: nothing is raised, `0` is the
//! failed handle and the reason for any failure is read with `error_msg`.

use std::sync::Arc;

use tracing::warn;

use crate::engine::{RiaEngine, ScriptEngine};
use crate::facade::Ria;
use crate::registry::EngineHandle;

pub const RIA_EXEC_UNKNOWN: i32 = 0;
pub const RIA_EXEC_OK: i32 = 1;
pub const RIA_EXEC_FAILED: i32 = 2;

pub struct RiaBinding<E: ScriptEngine = RiaEngine> {
    facade: Ria<E>,
    pub status: i32,
    pub result: String,
}

impl RiaBinding<RiaEngine> {
    pub fn native() -> Self {
        RiaBinding::from_facade(Ria::native())
    }
}

impl<E: ScriptEngine> RiaBinding<E> {
    pub fn with_engine(engine: Arc<E>) -> Self {
        RiaBinding::from_facade(Ria::with_engine(engine))
    }

    fn from_facade(facade: Ria<E>) -> Self {
        RiaBinding { facade, status: RIA_EXEC_UNKNOWN, result: String::new() }
    }

    /// Returns the new engine handle, or 0 when the engine could not be created.
    pub fn init(&mut self, temp_dir: &str) -> i32 {
        match self.facade.initialize(temp_dir) {
            Ok(handle) => match raw_of(handle) {
                Some(raw) => raw,
                None => {
                    warn!(handle = handle.get(), "handle does not fit the legacy int range");
                    let _ = self.facade.shutdown(handle);
                    0
                }
            },
            Err(e) => {
                warn!(temp_dir, error = %e, "init failed");
                0
            }
        }
    }

    pub fn shutdown(&mut self, engine: i32) -> bool {
        self.with_handle(engine, |facade, h| facade.shutdown(h).is_ok())
    }

    /// Last error text of `engine`; empty for an unknown engine.
    pub fn error_msg(&mut self, engine: i32) -> String {
        self.with_handle(engine, |facade, h| facade.last_error_message(h).unwrap_or_default())
    }

    pub fn load(&mut self, script: &str, engine: i32) -> bool {
        self.with_handle(engine, |facade, h| match facade.load_script(script, h) {
            Ok(()) => true,
            Err(e) => {
                warn!(script, error = %e, "load failed");
                false
            }
        })
    }

    /// Run `name`; `status` and `result` are updated either way.
    pub fn execute(&mut self, name: &str, params: Option<&[&str]>, engine: i32) -> bool {
        let ok = match handle_of(engine) {
            Some(h) => self.facade.execute(name, params, h).is_ok(),
            None => {
                self.facade.status = crate::ExecStatus::Failed;
                self.facade.result.clear();
                false
            }
        };
        self.status = self.facade.status.code();
        self.result = self.facade.result.clone();
        ok
    }

    fn with_handle<R: Default>(&mut self, engine: i32, f: impl FnOnce(&mut Ria<E>, EngineHandle) -> R) -> R {
        match handle_of(engine) {
            Some(h) => f(&mut self.facade, h),
            None => R::default(),
        }
    }
}

fn raw_of(handle: EngineHandle) -> Option<i32> {
    i32::try_from(handle.get()).ok()
}

fn handle_of(engine: i32) -> Option<EngineHandle> {
    u32::try_from(engine).ok().and_then(EngineHandle::from_raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{MockConfig, MockEngine};

    #[test]
    fn test_binding_never_raises() {
        let mut ria = RiaBinding::with_engine(Arc::new(MockEngine::new(MockConfig::new().with_result("a", "1"))));
        assert!(!ria.load("x.scr", 0));
        assert!(!ria.execute("a", None, -4));
        assert_eq!(ria.status, RIA_EXEC_FAILED);
        assert_eq!(ria.error_msg(99), "");
        assert!(!ria.shutdown(99));

        let h = ria.init("/tmp");
        assert!(h > 0);
        assert!(ria.load("x.scr", h));
        assert!(ria.execute("a", None, h));
        assert_eq!((ria.status, ria.result.as_str()), (RIA_EXEC_OK, "1"));
        assert!(ria.shutdown(h));
        assert!(!ria.shutdown(h));
    }

    #[test]
    fn test_init_failure_returns_zero() {
        let mut ria = RiaBinding::with_engine(Arc::new(MockEngine::new(MockConfig::new().init_fails())));
        assert_eq!(ria.init("/tmp"), 0);
    }

    #[test]
    fn test_handles_past_int_range_are_not_wrapped() {
        let top = EngineHandle::from_raw(i32::MAX as u32).unwrap();
        assert_eq!(raw_of(top), Some(i32::MAX));
        assert_eq!(handle_of(i32::MAX), Some(top));

        let past = EngineHandle::from_raw(i32::MAX as u32 + 1).unwrap();
        assert_eq!(raw_of(past), None);
        assert_eq!(raw_of(EngineHandle::from_raw(u32::MAX).unwrap()), None);
    }
}
