//! Handle registry: maps integer handles to engines for the C surface.
//!
//! Handles are monotonically increasing `isize` values starting from 1 and
//! are never reused. Handle 0 is reserved as the null/error sentinel.
//!
//! Engines are stored as `Arc<Mutex<ScoreEngine>>`. A caller scoring an
//! image clones the `Arc` and releases the registry lock first, so removing
//! a handle while a computation is running only drops the registry's
//! reference; the native release happens when the computation returns.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::engine::ScoreEngine;

static REGISTRY: Mutex<Option<HandleRegistry>> = Mutex::new(None);

type SharedEngine = Arc<Mutex<ScoreEngine>>;

struct HandleRegistry {
    engines: HashMap<isize, SharedEngine>,
    next_id: isize,
}

impl HandleRegistry {
    fn new() -> Self {
        Self {
            engines: HashMap::new(),
            next_id: 1,
        }
    }
}

/// What [`remove`] found under a handle.
#[derive(Debug)]
pub enum Removed {
    Engine(SharedEngine),
    /// Issued earlier and already removed.
    AlreadyRemoved,
}

fn lock() -> Result<MutexGuard<'static, Option<HandleRegistry>>, String> {
    REGISTRY.lock().map_err(|e| format!("Registry lock: {e}"))
}

// ==================== Public API ====================

/// Insert an engine and return its handle.
pub fn insert(engine: ScoreEngine) -> Result<isize, String> {
    let mut guard = lock()?;
    let reg = guard.get_or_insert_with(HandleRegistry::new);
    let id = reg.next_id;
    reg.next_id = reg
        .next_id
        .checked_add(1)
        .ok_or("Handle counter overflow")?;
    reg.engines.insert(id, Arc::new(Mutex::new(engine)));
    Ok(id)
}

/// Clone the shared engine for a handle (the handle remains valid).
pub fn get(handle: isize) -> Result<SharedEngine, String> {
    let guard = lock()?;
    guard
        .as_ref()
        .and_then(|reg| reg.engines.get(&handle))
        .cloned()
        .ok_or_else(|| format!("Invalid handle: {handle}"))
}

/// Remove a handle. Removing an already-removed handle is not an error;
/// a handle that was never issued is.
pub fn remove(handle: isize) -> Result<Removed, String> {
    let mut guard = lock()?;
    let reg = guard.get_or_insert_with(HandleRegistry::new);
    if let Some(engine) = reg.engines.remove(&handle) {
        return Ok(Removed::Engine(engine));
    }
    if handle > 0 && handle < reg.next_id {
        Ok(Removed::AlreadyRemoved)
    } else {
        Err(format!("Invalid handle: {handle}"))
    }
}

/// Return the number of live handles (for diagnostics).
pub fn len() -> Result<usize, String> {
    let guard = lock()?;
    Ok(guard.as_ref().map_or(0, |reg| reg.engines.len()))
}
