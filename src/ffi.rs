//! C ABI exports.
//!
//! Every `sl_*` function follows this contract:
//!
//! 1. Clears the last error
//! 2. Performs the operation
//! 3. On error: stores message via `set_last_error`, returns sentinel
//! 4. On success: returns the result
//!
//! **Sentinel values:**
//! - Handle functions (`-> isize`): `0` means error
//! - Status functions (`-> i32`):   `-1` means error, `0` means success
//! - String functions (`-> cstr`):  `""` means error (check `sl_last_error`)
//!
//! **Memory:**
//! - Returned `cstr` pointers use a TLS buffer, valid until the next
//!   `sl_*` call on the same thread.
//! - Engine handles (`isize`) own a native scoring context and MUST be
//!   released with `sl_engine_dispose`. Disposing twice is harmless.

use std::os::raw::c_char;

use crate::arch;
use crate::config::ProvisionConfig;
use crate::convert;
use crate::engine::ScoreEngine;
use crate::error::{clear_last_error, set_last_error};
use crate::provision::{self, Provisioner};
use crate::registry::{self, Removed};

// ==================== Internal Helpers ====================

/// Run closure, return handle (0 on error).
fn run_handle(f: impl FnOnce() -> Result<isize, String>) -> isize {
    clear_last_error();
    match f() {
        Ok(h) => h,
        Err(e) => {
            set_last_error(e);
            0
        }
    }
}

/// Run closure, return status (0=ok, -1=error).
fn run_status(f: impl FnOnce() -> Result<(), String>) -> i32 {
    clear_last_error();
    match f() {
        Ok(()) => 0,
        Err(e) => {
            set_last_error(e);
            -1
        }
    }
}

/// Run closure, return string via TLS buffer ("" on error).
fn run_str(f: impl FnOnce() -> Result<String, String>) -> *const c_char {
    clear_last_error();
    match f() {
        Ok(s) => convert::set_return_str(&s),
        Err(e) => {
            set_last_error(e);
            convert::set_return_str("")
        }
    }
}

/// # Safety
/// Both pointers must be null or valid, null-terminated strings.
unsafe fn engine_new(
    provisioner: &Provisioner,
    model_path: *const c_char,
    range_path: *const c_char,
) -> isize {
    let model = unsafe { convert::arg_path(model_path) };
    let range = unsafe { convert::arg_path(range_path) };
    run_handle(|| {
        let engine =
            ScoreEngine::with_provisioner(provisioner, &model, &range).map_err(|e| e.to_string())?;
        registry::insert(engine)
    })
}

// ==================== Configuration ====================

/// Configure provisioning from a JSON document before first use.
///
/// Fails once the native library has been (or is being) provisioned.
/// Returns `0` on success, `-1` on error.
#[no_mangle]
pub unsafe extern "C" fn sl_configure(json: *const c_char) -> i32 {
    let json = unsafe { convert::cstr_to_str(json) };
    run_status(|| {
        let config = ProvisionConfig::from_json(json?).map_err(|e| e.to_string())?;
        provision::configure_global(config).map_err(|e| e.to_string())?;
        Ok(())
    })
}

/// Extract and load the native library now instead of on first engine.
///
/// Returns `0` on success, `-1` on error.
#[no_mangle]
pub extern "C" fn sl_provision() -> i32 {
    run_status(|| {
        provision::global()
            .ensure_loaded()
            .map(drop)
            .map_err(|e| e.to_string())
    })
}

/// Provisioning phase: 0 not started, 1 in progress, 2 done, 3 failed.
#[no_mangle]
pub extern "C" fn sl_provisioning_state() -> i32 {
    provision::global_state() as i32
}

/// Platform tag of the running process (`x86`, `x64` or `arm64`).
///
/// Returns `""` on unsupported architectures.
#[no_mangle]
pub extern "C" fn sl_platform_tag() -> *const c_char {
    run_str(|| {
        arch::resolve()
            .map(|tag| tag.as_str().to_string())
            .map_err(|e| e.to_string())
    })
}

// ==================== Engines ====================

/// Create a scoring engine from a model file and a range file.
///
/// Returns `0` on error.
#[no_mangle]
pub unsafe extern "C" fn sl_engine_new(
    model_path: *const c_char,
    range_path: *const c_char,
) -> isize {
    unsafe { engine_new(provision::global(), model_path, range_path) }
}

/// Score an image, writing the native result to `*out`.
///
/// The score is passed through unchanged, including the native failure
/// sentinel `-1`. Returns `0` on success, `-1` on error.
#[no_mangle]
pub unsafe extern "C" fn sl_engine_score(
    engine: isize,
    image_path: *const c_char,
    out: *mut f64,
) -> i32 {
    let image = unsafe { convert::arg_path(image_path) };
    run_status(|| {
        if out.is_null() {
            return Err("Null output pointer".into());
        }
        let shared = registry::get(engine)?;
        let guard = shared.lock().map_err(|e| format!("Engine lock: {e}"))?;
        let score = guard.compute_score(&image).map_err(|e| e.to_string())?;
        unsafe { *out = score };
        Ok(())
    })
}

/// Release an engine's native context.
///
/// Disposing an already-disposed handle succeeds; a handle that was never
/// issued is an error. Returns `0` on success, `-1` on error.
#[no_mangle]
pub extern "C" fn sl_engine_dispose(engine: isize) -> i32 {
    run_status(|| match registry::remove(engine)? {
        // Dropping the last reference disposes the engine.
        Removed::Engine(shared) => {
            drop(shared);
            Ok(())
        }
        Removed::AlreadyRemoved => Ok(()),
    })
}

/// Number of live engine handles, or `-1` on error.
#[no_mangle]
pub extern "C" fn sl_engine_count() -> isize {
    clear_last_error();
    match registry::len() {
        Ok(n) => n as isize,
        Err(e) => {
            set_last_error(e);
            -1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::sl_last_error;
    use crate::testing::{fake_provisioner, Fixture};
    use std::ffi::{CStr, CString};
    use std::path::Path;

    fn c(path: &Path) -> CString {
        convert::path_to_cstring(path).unwrap()
    }

    fn last_error() -> String {
        let ptr = sl_last_error();
        assert!(!ptr.is_null(), "expected an error");
        unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
    }

    #[test]
    fn null_model_reports_model_not_found() {
        let fx = Fixture::new();
        let range = c(&fx.range);
        let h = unsafe { sl_engine_new(std::ptr::null(), range.as_ptr()) };
        assert_eq!(h, 0);
        assert!(last_error().contains("Model file not found"));
    }

    #[test]
    fn full_lifecycle_through_handles() {
        let fx = Fixture::new();
        let p = fake_provisioner(&fx);
        let (model, range, image) = (c(&fx.model), c(&fx.range), c(&fx.image));

        let h = unsafe { engine_new(&p, model.as_ptr(), range.as_ptr()) };
        assert!(h > 0);
        assert!(sl_last_error().is_null());

        let mut first = 0.0;
        let mut second = 0.0;
        assert_eq!(unsafe { sl_engine_score(h, image.as_ptr(), &mut first) }, 0);
        assert_eq!(unsafe { sl_engine_score(h, image.as_ptr(), &mut second) }, 0);
        assert_eq!(first, second);

        assert_eq!(sl_engine_dispose(h), 0);
        assert_eq!(sl_engine_dispose(h), 0);
        assert_eq!(fx.binding.releases(), 1);

        assert_eq!(unsafe { sl_engine_score(h, image.as_ptr(), &mut first) }, -1);
        assert!(last_error().contains("Invalid handle"));
    }

    #[test]
    fn missing_image_leaves_output_untouched() {
        let fx = Fixture::new();
        let p = fake_provisioner(&fx);
        let (model, range) = (c(&fx.model), c(&fx.range));
        let missing = fx.dir().join("missing.jpg");
        let image = c(&missing);

        let h = unsafe { engine_new(&p, model.as_ptr(), range.as_ptr()) };
        let mut out = 42.0;
        assert_eq!(unsafe { sl_engine_score(h, image.as_ptr(), &mut out) }, -1);
        assert_eq!(out, 42.0);
        let msg = last_error();
        assert!(msg.contains("Image file not found"));
        assert!(msg.contains(&missing.display().to_string()));

        assert_eq!(
            unsafe { sl_engine_score(h, image.as_ptr(), std::ptr::null_mut()) },
            -1
        );
        assert_eq!(sl_engine_dispose(h), 0);
    }

    #[test]
    fn never_issued_handle_cannot_be_disposed() {
        assert_eq!(sl_engine_dispose(0), -1);
        assert!(last_error().contains("Invalid handle"));
    }

    #[test]
    fn platform_tag_matches_resolver() {
        let ptr = sl_platform_tag();
        let tag = unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned();
        match arch::resolve() {
            Ok(expected) => assert_eq!(tag, expected.as_str()),
            Err(_) => assert!(tag.is_empty()),
        }
    }

    #[test]
    fn bad_configuration_is_rejected() {
        let json = CString::new(r#"{"library_name": ""}"#).unwrap();
        assert_eq!(unsafe { sl_configure(json.as_ptr()) }, -1);
        assert!(last_error().contains("Invalid provisioning configuration"));
    }

    #[test]
    fn engine_count_clears_stale_error() {
        set_last_error("stale");
        assert!(sl_engine_count() >= 0);
        assert!(sl_last_error().is_null());
    }
}
