//! The three-function native contract and its `libloading` implementation.
//!
//! The native library exports:
//!
//! ```c
//! void*  score_create(const char* model_path, const char* range_path); // NULL on failure
//! double score_compute(void* handle, const char* image_path);          // -1 on failure
//! void   score_release(void* handle);                                  // at most once per handle
//! ```
//!
//! Symbol names are configurable through [`SymbolNames`].

use std::ffi::{c_void, CStr};
use std::fmt;
use std::os::raw::c_char;
use std::path::Path;
use std::sync::Arc;

use libloading::Library;

use crate::config::SymbolNames;
use crate::error::{Result, ScoreError};

/// Value `score_compute` is observed to return on internal failure.
///
/// Scores are passed through verbatim; callers that care can compare
/// against this.
pub const NATIVE_FAILURE_SENTINEL: f64 = -1.0;

/// Opaque pointer-sized reference to a native scoring context.
///
/// Null is the "no live object" sentinel. The value carries no ownership;
/// see `ScoreEngine` for that.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct NativeHandle(*mut c_void);

impl NativeHandle {
    pub const NULL: NativeHandle = NativeHandle(std::ptr::null_mut());

    pub fn from_raw(ptr: *mut c_void) -> Self {
        Self(ptr)
    }

    pub fn as_raw(self) -> *mut c_void {
        self.0
    }

    pub fn is_null(self) -> bool {
        self.0.is_null()
    }
}

impl fmt::Debug for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeHandle({:p})", self.0)
    }
}

/// The create / compute / release contract.
pub trait NativeBinding: Send + Sync {
    /// Create a scoring context. Returns [`NativeHandle::NULL`] on failure.
    fn create(&self, model_path: &CStr, range_path: &CStr) -> NativeHandle;

    /// Score one image.
    ///
    /// # Safety
    /// `handle` must come from [`NativeBinding::create`] on this binding and
    /// must not have been released.
    unsafe fn compute(&self, handle: NativeHandle, image_path: &CStr) -> f64;

    /// Free everything owned by `handle`.
    ///
    /// # Safety
    /// `handle` must be live and must never be used again afterwards.
    unsafe fn release(&self, handle: NativeHandle);
}

/// Turns an extracted library file into a usable binding.
pub trait LibraryLoader: Send + Sync {
    fn load(&self, path: &Path, symbols: &SymbolNames) -> Result<Arc<dyn NativeBinding>>;
}

type CreateFn = unsafe extern "C" fn(*const c_char, *const c_char) -> *mut c_void;
type ComputeFn = unsafe extern "C" fn(*mut c_void, *const c_char) -> f64;
type ReleaseFn = unsafe extern "C" fn(*mut c_void);

/// A loaded native library with its three entry points resolved.
///
/// The function pointers are only valid while `_lib` is alive; the struct
/// keeps both together and never unloads on its own.
pub struct LibraryBinding {
    create: CreateFn,
    compute: ComputeFn,
    release: ReleaseFn,
    _lib: Library,
}

impl LibraryBinding {
    /// Load `path` and resolve the configured symbols.
    ///
    /// # Safety
    /// The library at `path` runs initialisers on load and must export the
    /// three symbols with exactly the signatures documented above.
    pub unsafe fn open(path: &Path, symbols: &SymbolNames) -> Result<Self> {
        let load_err = |e: libloading::Error| ScoreError::NativeLoadFailure {
            path: path.display().to_string(),
            reason: e.to_string(),
        };
        let lib = unsafe { Library::new(path) }.map_err(load_err)?;
        let create = unsafe { *lib.get::<CreateFn>(symbols.create.as_bytes()).map_err(load_err)? };
        let compute = unsafe { *lib.get::<ComputeFn>(symbols.compute.as_bytes()).map_err(load_err)? };
        let release = unsafe { *lib.get::<ReleaseFn>(symbols.release.as_bytes()).map_err(load_err)? };
        Ok(Self {
            create,
            compute,
            release,
            _lib: lib,
        })
    }
}

impl NativeBinding for LibraryBinding {
    fn create(&self, model_path: &CStr, range_path: &CStr) -> NativeHandle {
        NativeHandle(unsafe { (self.create)(model_path.as_ptr(), range_path.as_ptr()) })
    }

    unsafe fn compute(&self, handle: NativeHandle, image_path: &CStr) -> f64 {
        unsafe { (self.compute)(handle.0, image_path.as_ptr()) }
    }

    unsafe fn release(&self, handle: NativeHandle) {
        unsafe { (self.release)(handle.0) }
    }
}

/// Production loader: `dlopen` / `LoadLibrary` via `libloading`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DynamicLoader;

impl LibraryLoader for DynamicLoader {
    fn load(&self, path: &Path, symbols: &SymbolNames) -> Result<Arc<dyn NativeBinding>> {
        // SAFETY: the payload was extracted from this crate's own embedded
        // table for the resolved architecture.
        let binding = unsafe { LibraryBinding::open(path, symbols)? };
        Ok(Arc::new(binding))
    }
}
