//! Handle table for engine instances.
//!
//! Handles come from a counter starting at 1 and are never reused. Only live
//! instances are stored; an id below the counter with no slot was retired, so
//! late calls can be told apart from calls with a handle that was never issued.

use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::{RiaError, RiaResult};

/// Opaque identifier of one engine instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EngineHandle(NonZeroU32);

impl EngineHandle {
    pub fn get(self) -> u32 {
        self.0.get()
    }

    /// Rebuild a handle from its raw value. Zero is never a valid handle.
    pub fn from_raw(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(EngineHandle)
    }
}

impl fmt::Display for EngineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub struct HandleTable<T> {
    next: AtomicU32,
    slots: Mutex<HashMap<u32, Arc<Mutex<T>>>>,
}

impl<T> Default for HandleTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> HandleTable<T> {
    pub fn new() -> Self {
        HandleTable { next: AtomicU32::new(1), slots: Mutex::new(HashMap::new()) }
    }

    pub fn insert(&self, value: T) -> RiaResult<EngineHandle> {
        let mut slots = self.lock_slots()?;
        let raw = self.next.fetch_add(1, Ordering::Relaxed);
        let handle = EngineHandle::from_raw(raw)
            .ok_or_else(|| RiaError::InitializationFailed("engine handle space exhausted".into()))?;
        slots.insert(raw, Arc::new(Mutex::new(value)));
        Ok(handle)
    }

    /// Run `f` with exclusive access to the instance behind `handle`.
    ///
    /// Concurrent callers on the same handle wait for each other; callers on
    /// different handles do not.
    pub fn with<R>(&self, handle: EngineHandle, f: impl FnOnce(&mut T) -> R) -> RiaResult<R> {
        let cell = self.lookup(handle)?;
        let mut guard = cell.lock().map_err(|_| RiaError::Poisoned(handle.get()))?;
        Ok(f(&mut guard))
    }

    /// Retire `handle`, running `f` on the instance one last time.
    pub fn retire<R>(&self, handle: EngineHandle, f: impl FnOnce(&mut T) -> R) -> RiaResult<R> {
        let cell = {
            let mut slots = self.lock_slots()?;
            slots.remove(&handle.get()).ok_or_else(|| self.missing(handle))?
        };
        let mut guard = cell.lock().map_err(|_| RiaError::Poisoned(handle.get()))?;
        Ok(f(&mut guard))
    }

    pub fn live_count(&self) -> usize {
        self.slots.lock().map(|slots| slots.len()).unwrap_or(0)
    }

    fn lookup(&self, handle: EngineHandle) -> RiaResult<Arc<Mutex<T>>> {
        let slots = self.lock_slots()?;
        slots.get(&handle.get()).map(Arc::clone).ok_or_else(|| self.missing(handle))
    }

    /// Error for a handle with no live slot. Every id below the counter was
    /// issued once, so its absence means it was retired.
    fn missing(&self, handle: EngineHandle) -> RiaError {
        if handle.get() < self.next.load(Ordering::Relaxed) {
            RiaError::AlreadyShutdown(handle.get())
        } else {
            RiaError::InvalidHandle(handle.get())
        }
    }

    fn lock_slots(&self) -> RiaResult<std::sync::MutexGuard<'_, HashMap<u32, Arc<Mutex<T>>>>> {
        self.slots
            .lock()
            .map_err(|_| RiaError::Message("engine registry lock poisoned".into()))
    }
}
