//! Script engines behind the facade.
//!
//! # Architecture
//!
//! - **ScriptEngine**: the capability the facade talks to. Every operation
//!   after `initialize` names its instance with an [`EngineHandle`](crate::EngineHandle).
//! - **RiaEngine**: the real interpreter (compiler, VM, HTTP builtins).
//! - **MockEngine**: answers from a [`MockConfig`] without touching disk,
//!   for facade and integration tests.
//!
//! Both engines keep their instances in a [`HandleTable`](crate::registry::HandleTable),
//! so handle validation and per-handle locking behave the same way.

pub mod mock;
pub mod ria;
pub mod traits;

pub use mock::{MockConfig, MockEngine};
pub use ria::RiaEngine;
pub use traits::{ScriptEngine, ScriptOutcome};
