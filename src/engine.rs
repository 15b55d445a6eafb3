//! The public scoring context.
//!
//! A [`ScoreEngine`] owns exactly one native handle. The handle slot is a
//! tri-state guard, so `release` can only ever be issued for a `Live`
//! handle, and only once:
//!
//! ```text
//! Unset --create ok--> Live --dispose/drop--> Released
//!   \--create null--> (engine discarded, nothing to release)
//! ```
//!
//! `dispose` takes `&mut self` and `compute_score` takes `&self`, so the
//! borrow checker rules out disposing while a computation on the same
//! engine is in flight.

use std::ffi::CString;
use std::mem;
use std::path::Path;
use std::sync::Arc;

use crate::binding::{NativeBinding, NativeHandle};
use crate::convert::path_to_cstring;
use crate::error::{Result, ScoreError};
use crate::provision::{self, Provisioner};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandleSlot {
    Unset,
    Live(NativeHandle),
    Released,
}

pub struct ScoreEngine {
    binding: Arc<dyn NativeBinding>,
    slot: HandleSlot,
}

// SAFETY: the native context is a heap object with no thread affinity;
// this type grants exclusive ownership of it and no shared access.
unsafe impl Send for ScoreEngine {}

impl ScoreEngine {
    /// Create an engine from a model file and a range file, provisioning
    /// the native library through the process-wide provisioner.
    ///
    /// The model path is validated before the range path, so when both are
    /// bad the model error wins. No native code runs if either is invalid.
    pub fn new(model_path: impl AsRef<Path>, range_path: impl AsRef<Path>) -> Result<Self> {
        Self::with_provisioner(provision::global(), model_path, range_path)
    }

    /// Like [`ScoreEngine::new`], with an explicit provisioner.
    pub fn with_provisioner(
        provisioner: &Provisioner,
        model_path: impl AsRef<Path>,
        range_path: impl AsRef<Path>,
    ) -> Result<Self> {
        let model = require_file(model_path.as_ref(), ScoreError::ModelFileNotFound)?;
        let range = require_file(range_path.as_ref(), ScoreError::RangeFileNotFound)?;

        let binding = provisioner.ensure_loaded()?;
        let mut engine = Self {
            binding,
            slot: HandleSlot::Unset,
        };

        let handle = engine.binding.create(&model, &range);
        if handle.is_null() {
            // Dropped in the Unset state: no release is issued.
            return Err(ScoreError::AlgorithmCreationFailure);
        }
        log::trace!("created native scoring context {handle:?}");
        engine.slot = HandleSlot::Live(handle);
        Ok(engine)
    }

    /// Score one image.
    ///
    /// The native result is returned verbatim, including its failure
    /// sentinel ([`crate::NATIVE_FAILURE_SENTINEL`]).
    pub fn compute_score(&self, image_path: impl AsRef<Path>) -> Result<f64> {
        let HandleSlot::Live(handle) = self.slot else {
            return Err(ScoreError::ObjectDisposed);
        };
        let image = require_file(image_path.as_ref(), ScoreError::ImageFileNotFound)?;
        // SAFETY: `handle` is Live, came from this binding's `create`, and
        // cannot be released while `&self` is borrowed.
        Ok(unsafe { self.binding.compute(handle, &image) })
    }

    /// Release the native context. Any number of calls is fine; only the
    /// first one reaches native code.
    pub fn dispose(&mut self) {
        if let HandleSlot::Live(handle) = mem::replace(&mut self.slot, HandleSlot::Released) {
            log::trace!("releasing native scoring context {handle:?}");
            // SAFETY: the slot held this handle as Live and is now Released,
            // so this is the one and only release for it.
            unsafe { self.binding.release(handle) };
        }
    }

    pub fn is_disposed(&self) -> bool {
        !matches!(self.slot, HandleSlot::Live(_))
    }

    /// The live native handle, or [`NativeHandle::NULL`] once disposed.
    pub fn handle(&self) -> NativeHandle {
        match self.slot {
            HandleSlot::Live(handle) => handle,
            HandleSlot::Unset | HandleSlot::Released => NativeHandle::NULL,
        }
    }
}

impl Drop for ScoreEngine {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for ScoreEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScoreEngine").field("slot", &self.slot).finish()
    }
}

/// Validate that `path` names an existing regular file and marshal it.
fn require_file(path: &Path, not_found: fn(String) -> ScoreError) -> Result<CString> {
    let shown = || path.display().to_string();
    if path.as_os_str().to_string_lossy().trim().is_empty() || !path.is_file() {
        return Err(not_found(shown()));
    }
    path_to_cstring(path).ok_or_else(|| not_found(shown()))
}
